use crate::cli::{ConnectArgs, ReplyOptions, SendArgs};
use crate::exit_codes;
use crate::output;
use crate::settings;
use std::time::Duration;
use strobe_link::{Command, Session, StopReason};

pub async fn execute(args: SendArgs) -> i32 {
    let commands: Vec<Command> = args.text.into_iter().map(Command::Raw).collect();
    deliver(&args.connect, &commands, &args.reply).await
}

/// Connect, send each command in order, show what comes back for `wait_ms`,
/// then disconnect.
pub async fn deliver(connect: &ConnectArgs, commands: &[Command], reply: &ReplyOptions) -> i32 {
    let config = match settings::resolve_connect(connect) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut session = match Session::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    let json = reply.json;
    session.set_event_callback(move |event| output::print_event(&event, json));

    if let Err(e) = session.connect().await {
        eprintln!("Error: {}", e);
        return exit_codes::CONNECTION_ERROR;
    }

    for command in commands {
        if let Err(e) = session.send_command(command).await {
            eprintln!("Error: {}", e);
            session.close();
            return exit_codes::CONNECTION_ERROR;
        }
    }

    let reason = session.listen(Duration::from_millis(reply.wait_ms)).await;
    if reason == StopReason::Disconnected {
        log::info!("Controller closed the connection");
    }
    session.close();

    exit_codes::SUCCESS
}
