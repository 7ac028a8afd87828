//! Discovery of images written by the capture software.
//!
//! Directories are re-listed on a timer; there is no filesystem watch. Only
//! the file name and modification time are looked at, never the contents.

use crate::error::DiscoveryError;
use chrono::{DateTime, Local};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::path::Path;

/// Conventional camera naming: `IMG_0001.JPG`, `img_12.tiff`, ...
pub const DEFAULT_IMAGE_PATTERN: &str = r"^IMG_\d+\.(jpe?g|png|tiff?|dng|cr2|nef|arw)$";

/// An image file observed in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEvent {
    /// File modification time
    pub timestamp: DateTime<Local>,
    pub filename: String,
}

/// Case-insensitive file-name filter.
#[derive(Debug, Clone)]
pub struct ImagePattern {
    regex: Regex,
}

impl ImagePattern {
    pub fn new(pattern: &str) -> Result<Self, DiscoveryError> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| DiscoveryError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { regex })
    }

    pub fn matches(&self, filename: &str) -> bool {
        self.regex.is_match(filename)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl Default for ImagePattern {
    fn default() -> Self {
        Self {
            regex: RegexBuilder::new(DEFAULT_IMAGE_PATTERN)
                .case_insensitive(true)
                .build()
                .expect("default image pattern is valid"),
        }
    }
}

/// List the qualifying images in `dir`, oldest first.
///
/// Entries that vanish or cannot be inspected between listing and `stat`
/// are skipped; the next poll will see them again if they reappear.
pub fn scan_directory(dir: &Path, pattern: &ImagePattern) -> Result<Vec<ImageEvent>, DiscoveryError> {
    if !dir.is_dir() {
        return Err(DiscoveryError::DirectoryNotFound(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|source| DiscoveryError::Listing {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut images = Vec::new();
    for entry in entries.flatten() {
        let Some(filename) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !pattern.matches(&filename) {
            continue;
        }

        let modified = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta.modified(),
            Ok(_) => continue,
            Err(e) => {
                log::debug!("Skipping {}: {}", filename, e);
                continue;
            }
        };

        match modified {
            Ok(mtime) => images.push(ImageEvent {
                timestamp: DateTime::<Local>::from(mtime),
                filename,
            }),
            Err(e) => log::debug!("No modification time for {}: {}", filename, e),
        }
    }

    images.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pattern_is_case_insensitive() {
        let pattern = ImagePattern::default();
        assert!(pattern.matches("IMG_0001.JPG"));
        assert!(pattern.matches("img_42.jpeg"));
        assert!(pattern.matches("Img_7.TIFF"));
        assert!(!pattern.matches("IMG_.jpg"));
        assert!(!pattern.matches("IMG_0001.txt"));
        assert!(!pattern.matches("DSC_0001.jpg"));
        assert!(!pattern.matches("IMG_0001.jpg.part"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            ImagePattern::new("IMG_(\\d+"),
            Err(DiscoveryError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("IMG_0002.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join("IMG_0001.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("IMG_0003.jpg")).unwrap();

        let images = scan_directory(dir.path(), &ImagePattern::default()).unwrap();
        let names: Vec<&str> = images.iter().map(|i| i.filename.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"IMG_0001.jpg"));
        assert!(names.contains(&"IMG_0002.jpg"));
        assert!(images[0].timestamp <= images[1].timestamp);
    }

    #[test]
    fn test_scan_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            scan_directory(&missing, &ImagePattern::default()),
            Err(DiscoveryError::DirectoryNotFound(_))
        ));
    }
}
