//! Wire-level helpers for the controller's newline-delimited text protocol.
//!
//! Outbound commands are sent byte-for-byte; the device is sensitive to casing
//! and spacing in some command forms, so nothing here normalizes text.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Default prefix of the exposure-count report line.
pub const DEFAULT_EXPOSURE_PREFIX: &str = "EXPOSURE_COUNT";

/// Default command asking the device for its exposure count.
pub const DEFAULT_EXPOSURE_COMMAND: &str = "GET_EXPOSURE_COUNT";

const RS485_PREFIXES: [&str; 2] = ["RS485: ", "[RS485<-] "];

/// Commands understood by the strobe/lamp controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Strobe intensity in percent (0..=100)
    StrobeIntensity(u8),
    /// Lamp intensity in percent (0..=100)
    LampIntensity(u8),
    LampOff,
    Status,
    /// Exposure-count query; the token is configurable per device firmware.
    GetExposureCount(String),
    /// Exact text typed by the operator.
    Raw(String),
}

impl Command {
    pub fn strobe_intensity(percent: u32) -> Result<Self, ProtocolError> {
        Ok(Self::StrobeIntensity(check_percent("strobe", percent)?))
    }

    pub fn lamp_intensity(percent: u32) -> Result<Self, ProtocolError> {
        Ok(Self::LampIntensity(check_percent("lamp", percent)?))
    }

    /// The text placed on the wire, without the line terminator.
    pub fn to_wire(&self) -> String {
        match self {
            Command::StrobeIntensity(p) => format!("STROBE_INTENSITY {}", p),
            Command::LampIntensity(p) => format!("LAMP_INTENSITY {}", p),
            Command::LampOff => "LAMP OFF".to_string(),
            Command::Status => "STATUS".to_string(),
            Command::GetExposureCount(token) => token.clone(),
            Command::Raw(text) => text.clone(),
        }
    }
}

fn check_percent(what: &str, percent: u32) -> Result<u8, ProtocolError> {
    if percent > 100 {
        return Err(ProtocolError::InvalidParameter(format!(
            "{} intensity {} is out of range [0, 100]",
            what, percent
        )));
    }
    Ok(percent as u8)
}

/// Bytes written for `text`: exactly one trailing `\n` unless already present.
pub fn encode_line(text: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(text.len() + 1);
    data.extend_from_slice(text.as_bytes());
    if !text.ends_with('\n') {
        data.push(b'\n');
    }
    data
}

/// Reassembles newline-terminated lines from arbitrarily split reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and return every line completed by them, in wire order.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; trailing whitespace
    /// (including a `\r` before the newline) is trimmed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let text = String::from_utf8_lossy(&self.pending[start..end]);
            lines.push(text.trim_end().to_string());
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Bytes received after the last newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// RS-485 bus payload carried by a tagged line, if any.
pub fn rs485_payload(line: &str) -> Option<&str> {
    RS485_PREFIXES
        .iter()
        .find_map(|prefix| line.strip_prefix(prefix))
        .filter(|payload| !payload.is_empty())
}

/// Parse an exposure-count report such as `EXPOSURE_COUNT 42` or
/// `EXPOSURE_COUNT: 42`. Other lines are opaque and yield `None`.
pub fn parse_exposure_count(line: &str, prefix: &str) -> Option<u64> {
    let rest = line.strip_prefix(prefix)?;
    let rest = rest.trim_start();
    let rest = rest
        .strip_prefix(':')
        .or_else(|| rest.strip_prefix('='))
        .unwrap_or(rest);
    let digits = rest.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_line_appends_newline() {
        assert_eq!(encode_line("STATUS"), b"STATUS\n".to_vec());
        assert_eq!(encode_line("STATUS\n"), b"STATUS\n".to_vec());
        assert_eq!(encode_line(""), b"\n".to_vec());
    }

    #[test]
    fn test_encode_line_preserves_exact_text() {
        let raw = "~device set lamp:046|SUBC24991  ";
        assert_eq!(encode_line(raw), format!("{}\n", raw).into_bytes());
    }

    #[test]
    fn test_line_buffer_reassembles_split_reads() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"ST").is_empty());
        assert_eq!(buf.pending_len(), 2);
        assert_eq!(buf.push(b"ATUS\n"), vec!["STATUS".to_string()]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_line_buffer_multiple_lines_in_order() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"one\r\ntwo  \nthr");
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(buf.push(b"ee\n"), vec!["three".to_string()]);
    }

    #[test]
    fn test_line_buffer_lossy_decoding() {
        let mut buf = LineBuffer::new();
        let lines = buf.push(b"OK \xff\xfe\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("OK "));
    }

    #[test]
    fn test_line_buffer_keeps_leading_whitespace() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"  indented\n"), vec!["  indented".to_string()]);
    }

    #[test]
    fn test_rs485_payload() {
        assert_eq!(rs485_payload("RS485: 01 02"), Some("01 02"));
        assert_eq!(rs485_payload("[RS485<-] ACK"), Some("ACK"));
        assert_eq!(rs485_payload("RS485: "), None);
        assert_eq!(rs485_payload("STATUS OK"), None);
    }

    #[test]
    fn test_parse_exposure_count() {
        let p = DEFAULT_EXPOSURE_PREFIX;
        assert_eq!(parse_exposure_count("EXPOSURE_COUNT 42", p), Some(42));
        assert_eq!(parse_exposure_count("EXPOSURE_COUNT: 7", p), Some(7));
        assert_eq!(parse_exposure_count("EXPOSURE_COUNT=0", p), Some(0));
        assert_eq!(parse_exposure_count("EXPOSURE_COUNT", p), None);
        assert_eq!(parse_exposure_count("EXPOSURE_COUNT -3", p), None);
        assert_eq!(parse_exposure_count("EXPOSURE_COUNT 4x", p), None);
        assert_eq!(parse_exposure_count("STATUS 42", p), None);
    }

    #[test]
    fn test_command_wire_format() {
        assert_eq!(Command::strobe_intensity(55).unwrap().to_wire(), "STROBE_INTENSITY 55");
        assert_eq!(Command::lamp_intensity(0).unwrap().to_wire(), "LAMP_INTENSITY 0");
        assert_eq!(Command::LampOff.to_wire(), "LAMP OFF");
        assert_eq!(Command::Status.to_wire(), "STATUS");
        assert_eq!(Command::Raw("lamp on".to_string()).to_wire(), "lamp on");
        assert!(Command::strobe_intensity(101).is_err());
    }
}
