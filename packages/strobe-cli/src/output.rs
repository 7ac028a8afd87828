use std::io::Write;
use std::path::Path;
use strobe_link::record_log::TIME_FORMAT;
use strobe_link::SessionEvent;

/// Write JSON string to stdout or a file.
pub fn write_output(json: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => std::fs::write(Path::new(path), json)
            .map_err(|e| format!("Failed to write output file '{}': {}", path, e)),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Human-readable rendering of a session event, in the style of the
/// controller's log pane.
pub fn format_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Connected { peer } => format!("[Connected to {}]", peer),
        SessionEvent::Sent { text } => format!(">> {}", text.trim_end_matches('\n')),
        SessionEvent::Line(line) => format!("<< {}", line),
        SessionEvent::Rs485(payload) => format!("[RS485] {}", payload),
        SessionEvent::Exposure(exposure) => format!(
            "[Exposure #{} at {}]",
            exposure.count,
            exposure.timestamp.format(TIME_FORMAT)
        ),
        SessionEvent::Matched(record) => format!(
            "[Match] exposure #{} <-> {} ({:+} ms)",
            record.exposure_count, record.image_filename, record.delta_ms
        ),
        SessionEvent::RunStarted { log_path } => match log_path {
            Some(path) => format!("[Run started, logging to {}]", path.display()),
            None => "[Run started]".to_string(),
        },
        SessionEvent::RunStopped {
            matched,
            pending_exposures,
            pending_images,
        } => format!(
            "[Run stopped: {} matched, {} exposures and {} images unmatched]",
            matched, pending_exposures, pending_images
        ),
        SessionEvent::Disconnected { reason: None } => "[Disconnected]".to_string(),
        SessionEvent::Disconnected {
            reason: Some(reason),
        } => format!("[Disconnected: {}]", reason),
        SessionEvent::Error(message) => format!("Error: {}", message),
    }
}

/// Print one session event: JSON lines with `json`, otherwise text.
/// Errors go to stderr.
pub fn print_event(event: &SessionEvent, json: bool) {
    if json {
        match to_json(event, true) {
            Ok(line) => {
                if let Err(e) = write_output(&line, None) {
                    eprintln!("Error: {}", e);
                }
            }
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }

    let text = format_event(event);
    if matches!(event, SessionEvent::Error(_)) {
        eprintln!("{}", text);
    } else {
        println!("{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lines() {
        assert_eq!(format_event(&SessionEvent::Line("OK".to_string())), "<< OK");
        assert_eq!(
            format_event(&SessionEvent::Sent {
                text: "LAMP OFF\n".to_string()
            }),
            ">> LAMP OFF"
        );
        assert_eq!(
            format_event(&SessionEvent::Disconnected { reason: None }),
            "[Disconnected]"
        );
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let path_str = path.to_str().unwrap();

        write_output(r#"{"port":9000}"#, Some(path_str)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), r#"{"port":9000}"#);
    }

    #[test]
    fn test_write_output_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.json");
        let err = write_output("{}", path.to_str()).unwrap_err();
        assert!(err.contains("Failed to write output file"));
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = to_json(&SessionEvent::Rs485("01 02".to_string()), true).unwrap();
        assert_eq!(json, r#"{"type":"Rs485","data":"01 02"}"#);
    }
}
