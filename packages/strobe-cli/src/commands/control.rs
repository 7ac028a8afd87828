use crate::cli::{IntensityArgs, ReplyArgs};
use crate::commands::send::deliver;
use crate::exit_codes;
use strobe_link::protocol::Command;

pub async fn status(args: ReplyArgs) -> i32 {
    deliver(&args.connect, &[Command::Status], &args.reply).await
}

pub async fn lamp_off(args: ReplyArgs) -> i32 {
    deliver(&args.connect, &[Command::LampOff], &args.reply).await
}

pub async fn intensity(args: IntensityArgs) -> i32 {
    let commands = match intensity_commands(args.strobe, args.lamp) {
        Ok(commands) => commands,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };
    deliver(&args.connect, &commands, &args.reply).await
}

/// Commands for the requested intensities, strobe first.
fn intensity_commands(strobe: Option<u32>, lamp: Option<u32>) -> Result<Vec<Command>, String> {
    if strobe.is_none() && lamp.is_none() {
        return Err("Specify --strobe and/or --lamp".to_string());
    }

    let mut commands = Vec::new();
    if let Some(percent) = strobe {
        commands.push(Command::strobe_intensity(percent).map_err(|e| e.to_string())?);
    }
    if let Some(percent) = lamp {
        commands.push(Command::lamp_intensity(percent).map_err(|e| e.to_string())?);
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity_commands() {
        let wire: Vec<String> = intensity_commands(Some(40), Some(100))
            .unwrap()
            .iter()
            .map(Command::to_wire)
            .collect();
        assert_eq!(wire, vec!["STROBE_INTENSITY 40", "LAMP_INTENSITY 100"]);
        assert_eq!(
            intensity_commands(None, Some(0)).unwrap(),
            vec![Command::LampIntensity(0)]
        );
    }

    #[test]
    fn test_intensity_requires_a_value() {
        assert!(intensity_commands(None, None).is_err());
    }

    #[test]
    fn test_intensity_out_of_range() {
        assert!(intensity_commands(Some(101), None).is_err());
        assert!(intensity_commands(Some(50), Some(250)).is_err());
    }
}
