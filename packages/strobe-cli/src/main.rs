use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod output;
mod settings;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match cli.command {
        cli::Command::Run(args) => commands::run::execute(args).await,
        cli::Command::Send(args) => commands::send::execute(args).await,
        cli::Command::Status(args) => commands::control::status(args).await,
        cli::Command::LampOff(args) => commands::control::lamp_off(args).await,
        cli::Command::Intensity(args) => commands::control::intensity(args).await,
        cli::Command::Scan(args) => commands::scan::execute(args),
        cli::Command::Config(args) => commands::config::execute(args),
    };

    std::process::exit(exit_code);
}
