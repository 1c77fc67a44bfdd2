use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use voltmeter::{MalformedPolicy, SourceKind, Voltmeter, VoltmeterConfig};

#[derive(Debug, Default, PartialEq)]
struct Args {
    port: Option<String>,
    baud: Option<u32>,
    title: Option<String>,
    font: Option<PathBuf>,
    timeout_ms: Option<u64>,
    source: SourceKind,
    skip_malformed: bool,
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" => parsed.port = Some(value(&arg, args.next())?),
            "--baud" => {
                let baud = value(&arg, args.next())?;
                parsed.baud = Some(baud.parse().with_context(|| format!("invalid baud rate {:?}", baud))?);
            }
            "--title" => parsed.title = Some(value(&arg, args.next())?),
            "--font" => parsed.font = Some(PathBuf::from(value(&arg, args.next())?)),
            "--timeout-ms" => {
                let ms = value(&arg, args.next())?;
                parsed.timeout_ms = Some(ms.parse().with_context(|| format!("invalid timeout {:?}", ms))?);
            }
            "--stdin" => parsed.source = SourceKind::Stdin,
            "--simulate" => parsed.source = SourceKind::Simulated,
            "--skip-malformed" => parsed.skip_malformed = true,
            other => log::warn!("Ignoring unknown argument {:?}", other),
        }
    }
    Ok(parsed)
}

fn value(flag: &str, next: Option<String>) -> Result<String> {
    next.ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn build_config(args: Args) -> VoltmeterConfig {
    let policy = if args.skip_malformed {
        MalformedPolicy::Skip
    } else {
        MalformedPolicy::Stop
    };
    VoltmeterConfig::builder()
        .source(args.source)
        .maybe_port_name(args.port)
        .maybe_baud_rate(args.baud)
        .maybe_title(args.title)
        .maybe_font_path(args.font)
        .maybe_read_timeout(args.timeout_ms.map(Duration::from_millis))
        .malformed_policy(policy)
        .build()
}

fn main() -> Result<()> {
    env_logger::init();

    let config = build_config(parse_args(env::args())?);
    log::info!("Starting with {:?} source, malformed lines: {:?}", config.source, config.malformed_policy);

    let meter = Voltmeter::new(config).context("loading font")?;
    meter.run().map_err(|e| anyhow!("{}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(std::iter::once("voltmeter").chain(list.iter().copied()).map(String::from))
    }

    #[test]
    fn no_arguments_means_serial_defaults() {
        let config = build_config(args(&[]).unwrap());
        assert_eq!(config.source, SourceKind::Serial);
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.malformed_policy, MalformedPolicy::Stop);
    }

    #[test]
    fn flags_override_the_defaults() {
        let parsed = args(&["--port", "/dev/ttyUSB0", "--baud", "9600", "--skip-malformed", "--timeout-ms", "250"]).unwrap();
        let config = build_config(parsed);
        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.malformed_policy, MalformedPolicy::Skip);
    }

    #[test]
    fn source_flags_select_the_source() {
        assert_eq!(args(&["--simulate"]).unwrap().source, SourceKind::Simulated);
        assert_eq!(args(&["--stdin"]).unwrap().source, SourceKind::Stdin);
    }

    #[test]
    fn missing_or_bad_values_are_errors() {
        assert!(args(&["--port"]).is_err());
        assert!(args(&["--baud", "fast"]).is_err());
    }

    #[test]
    fn unknown_flags_are_ignored() {
        assert_eq!(args(&["--verbose"]).unwrap(), Args::default());
    }
}
