use crate::cli::{ConnectArgs, RunArgs};
use std::path::PathBuf;
use strobe_link::LinkConfig;

/// Environment (and `.env`) configuration, before any flags are applied.
pub fn load() -> Result<LinkConfig, String> {
    LinkConfig::from_env().map_err(|e| e.to_string())
}

fn apply_connect(config: &mut LinkConfig, args: &ConnectArgs) {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(timeout) = args.connect_timeout_ms {
        config.connect_timeout_ms = timeout;
    }
}

/// Configuration for one-shot commands: environment plus connection flags.
pub fn resolve_connect(args: &ConnectArgs) -> Result<LinkConfig, String> {
    let mut config = load()?;
    apply_connect(&mut config, args);
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Configuration for a correlation session.
pub fn resolve_run(args: &RunArgs) -> Result<LinkConfig, String> {
    let mut config = load()?;
    apply_run(&mut config, args);
    config.validate().map_err(|e| e.to_string())?;

    if !config.image_dir.is_dir() {
        return Err(format!(
            "Image directory not found: {}",
            config.image_dir.display()
        ));
    }
    Ok(config)
}

fn apply_run(config: &mut LinkConfig, args: &RunArgs) {
    apply_connect(config, &args.connect);
    if let Some(dir) = &args.image_dir {
        config.image_dir = PathBuf::from(dir);
    }
    if let Some(dir) = &args.log_dir {
        config.log_dir = PathBuf::from(dir);
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance_secs = tolerance;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args() -> RunArgs {
        RunArgs {
            connect: ConnectArgs::default(),
            image_dir: None,
            log_dir: None,
            tolerance: None,
            duration_secs: None,
            json: false,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = LinkConfig::default();
        let mut args = run_args();
        args.connect.host = Some("10.1.1.1".to_string());
        args.connect.port = Some(9100);
        args.image_dir = Some("/captures".to_string());
        args.tolerance = Some(0.5);

        apply_run(&mut config, &args);
        assert_eq!(config.host, "10.1.1.1");
        assert_eq!(config.port, 9100);
        assert_eq!(config.image_dir, PathBuf::from("/captures"));
        assert_eq!(config.tolerance_secs, 0.5);
        assert_eq!(config.log_dir, PathBuf::from("."));
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let mut config = LinkConfig::default();
        apply_run(&mut config, &run_args());
        assert_eq!(config, LinkConfig::default());
    }
}
