use crate::cli::ScanArgs;
use crate::exit_codes;
use crate::output;
use crate::settings;
use serde::Serialize;
use std::path::PathBuf;
use strobe_link::record_log::TIME_FORMAT;
use strobe_link::{scan_directory, DiscoveryError, ImageEvent, ImagePattern};

#[derive(Serialize)]
struct ScanOutput {
    directory: String,
    pattern: String,
    images: Vec<ImageEvent>,
}

pub fn execute(args: ScanArgs) -> i32 {
    let config = match settings::load() {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let dir = args.dir.map(PathBuf::from).unwrap_or(config.image_dir);
    let pattern_text = args.pattern.unwrap_or(config.image_pattern);
    let pattern = match ImagePattern::new(&pattern_text) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let images = match scan_directory(&dir, &pattern) {
        Ok(images) => images,
        Err(e @ DiscoveryError::DirectoryNotFound(_)) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if args.json || args.output.is_some() {
        let result = ScanOutput {
            directory: dir.display().to_string(),
            pattern: pattern.as_str().to_string(),
            images,
        };
        match output::to_json(&result, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, args.output.as_deref()) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
                if let Some(ref path) = args.output {
                    eprintln!("Image listing written to {}", path);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else {
        println!("{} image(s) in {}", images.len(), dir.display());
        if !images.is_empty() {
            println!();
            println!("{:<24} Filename", "Modified");
            println!("{}", "-".repeat(48));
            for image in &images {
                println!(
                    "{:<24} {}",
                    image.timestamp.format(TIME_FORMAT).to_string(),
                    image.filename
                );
            }
        }
    }

    exit_codes::SUCCESS
}
