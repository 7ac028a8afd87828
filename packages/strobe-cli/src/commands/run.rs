use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use crate::settings;
use std::time::Duration;
use strobe_link::{LinkError, Session, StopReason, TransportError};

pub async fn execute(args: RunArgs) -> i32 {
    let duration = match stop_after(args.duration_secs) {
        Ok(d) => d,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let config = match settings::resolve_run(&args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    eprintln!(
        "Correlating exposures from {}:{} with images in {} (tolerance {}s)",
        config.host,
        config.port,
        config.image_dir.display(),
        config.tolerance_secs
    );

    let mut session = match Session::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };
    let json = args.json;
    session.set_event_callback(move |event| output::print_event(&event, json));

    let stop = async move {
        match duration {
            Some(d) => {
                tokio::select! {
                    _ = tokio::time::sleep(d) => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    log::error!("Unable to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    };

    match session.run(stop).await {
        Ok(StopReason::Requested) => exit_codes::SUCCESS,
        Ok(StopReason::Disconnected) => {
            eprintln!("Connection to the controller was lost");
            exit_codes::CONNECTION_ERROR
        }
        Err(LinkError::Transport(e @ TransportError::Connection { .. })) => {
            eprintln!("Error: {}", e);
            exit_codes::CONNECTION_ERROR
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}

fn stop_after(duration_secs: Option<f64>) -> Result<Option<Duration>, String> {
    match duration_secs {
        None => Ok(None),
        Some(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
        Some(secs) => Err(format!("--duration-secs must be positive, got {}", secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_after() {
        assert_eq!(stop_after(None).unwrap(), None);
        assert_eq!(
            stop_after(Some(1.5)).unwrap(),
            Some(Duration::from_millis(1500))
        );
        assert!(stop_after(Some(0.0)).is_err());
        assert!(stop_after(Some(-2.0)).is_err());
    }
}
