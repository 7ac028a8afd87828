use crate::cli::ConfigArgs;
use crate::exit_codes;
use crate::output;
use crate::settings;

pub fn execute(args: ConfigArgs) -> i32 {
    let config = match settings::load() {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if args.json || args.output.is_some() {
        return match output::to_json(&config, false) {
            Ok(json) => match output::write_output(&json, args.output.as_deref()) {
                Ok(()) => {
                    if let Some(ref path) = args.output {
                        eprintln!("Configuration written to {}", path);
                    }
                    exit_codes::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    exit_codes::EXECUTION_ERROR
                }
            },
            Err(e) => {
                eprintln!("Error: {}", e);
                exit_codes::EXECUTION_ERROR
            }
        };
    }

    let rows = [
        ("host", config.host.clone()),
        ("port", config.port.to_string()),
        ("image_dir", config.image_dir.display().to_string()),
        ("log_dir", config.log_dir.display().to_string()),
        ("tolerance_secs", config.tolerance_secs.to_string()),
        ("poll_interval_ms", config.poll_interval_ms.to_string()),
        ("scan_interval_ms", config.scan_interval_ms.to_string()),
        ("connect_timeout_ms", config.connect_timeout_ms.to_string()),
        ("exposure_prefix", config.exposure_prefix.clone()),
        ("exposure_command", config.exposure_command.clone()),
        ("start_command", config.start_command.clone()),
        ("stop_command", config.stop_command.clone()),
        ("image_pattern", config.image_pattern.clone()),
    ];
    for (key, value) in rows {
        println!("{:<20} {}", format!("{}:", key), value);
    }

    exit_codes::SUCCESS
}
