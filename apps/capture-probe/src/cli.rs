//! Command line parsing
//!
//! Usage:
//!   capture-probe backends --window <id>               Show backend selection
//!   capture-probe grab --window <id> --rect <geom>     Single grab
//!   capture-probe run --window <id> --rect <geom>      Run the capture loop
//!
//! Options:
//!   --window <id>      Native handle of the overlay window (decimal or 0x hex)
//!   --rect <geom>      Overlay rectangle as WxH+X+Y
//!   --config <path>    JSON coordinator config
//!   --seconds <n>      How long `run` keeps ticking (default 3)
//!   --out <path>       Write the grabbed frame as a binary PPM

use capture::{CaptureRegion, WindowHandle};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Backends,
    Grab,
    Run,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub window: WindowHandle,
    pub rect: CaptureRegion,
    pub config: Option<PathBuf>,
    pub seconds: f64,
    pub out: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            window: WindowHandle(0),
            rect: CaptureRegion::new(0, 0, 640, 480),
            config: None,
            seconds: 3.0,
            out: None,
        }
    }
}

pub fn parse_args(args: &[String]) -> Result<(Command, Options), String> {
    let mut options = Options::default();
    let mut command = None;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "backends" => command = Some(Command::Backends),
            "grab" => command = Some(Command::Grab),
            "run" => command = Some(Command::Run),
            "--window" | "--rect" | "--config" | "--seconds" | "--out" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| format!("{} requires a value", arg))?;
                match arg {
                    "--window" => options.window = parse_window(value)?,
                    "--rect" => options.rect = parse_rect(value)?,
                    "--config" => options.config = Some(PathBuf::from(value)),
                    "--seconds" => {
                        options.seconds = value
                            .parse::<f64>()
                            .ok()
                            .filter(|s| s.is_finite() && *s > 0.0)
                            .ok_or_else(|| format!("Invalid --seconds '{}'", value))?;
                    }
                    _ => options.out = Some(PathBuf::from(value)),
                }
            }
            _ => return Err(format!("Unknown argument: {}", arg)),
        }
        i += 1;
    }

    let command =
        command.ok_or_else(|| "No command specified. Use: backends, grab, or run".to_string())?;
    Ok((command, options))
}

fn parse_window(s: &str) -> Result<WindowHandle, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed
        .map(WindowHandle)
        .map_err(|_| format!("Invalid window id '{}'", s))
}

/// Parse `WxH+X+Y`; offsets may be negative (`+-10`) on multi-monitor setups
fn parse_rect(s: &str) -> Result<CaptureRegion, String> {
    let invalid = || format!("Invalid rect '{}', expected WxH+X+Y", s);

    let (size, offsets) = s.split_once('+').ok_or_else(invalid)?;
    let (width, height) = size.split_once('x').ok_or_else(invalid)?;
    let (x, y) = offsets.split_once('+').ok_or_else(invalid)?;

    let num = |v: &str| v.trim().parse::<i32>().map_err(|_| invalid());
    Ok(CaptureRegion::new(num(x)?, num(y)?, num(width)?, num(height)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_run() {
        let (cmd, opts) =
            parse_args(&args("run --window 0x3a00007 --rect 800x600+100+50 --seconds 1.5"))
                .unwrap();

        assert_eq!(cmd, Command::Run);
        assert_eq!(opts.window, WindowHandle(0x3a00007));
        assert_eq!(opts.rect, CaptureRegion::new(100, 50, 800, 600));
        assert_eq!(opts.seconds, 1.5);
    }

    #[test]
    fn test_parse_grab_with_output() {
        let (cmd, opts) =
            parse_args(&args("grab --window 42 --out /tmp/frame.ppm --config probe.json")).unwrap();

        assert_eq!(cmd, Command::Grab);
        assert_eq!(opts.window, WindowHandle(42));
        assert_eq!(opts.out, Some(PathBuf::from("/tmp/frame.ppm")));
        assert_eq!(opts.config, Some(PathBuf::from("probe.json")));
    }

    #[test]
    fn test_negative_rect_offsets() {
        assert_eq!(
            parse_rect("1920x1080+-1920+0").unwrap(),
            CaptureRegion::new(-1920, 0, 1920, 1080)
        );
    }

    #[test]
    fn test_errors() {
        assert!(parse_args(&args("--window 1")).is_err());
        assert!(parse_args(&args("run --window")).is_err());
        assert!(parse_args(&args("run --rect 800x600")).is_err());
        assert!(parse_args(&args("run --seconds 0")).is_err());
        assert!(parse_args(&args("run --window zz")).is_err());
        assert!(parse_args(&args("explode")).is_err());
    }
}
