// Command-line interface of the `picomotor` binary
use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{parse_usb_id, timeout_from_secs, ControllerConfig};
use crate::console;
use crate::discovery::{self, NusbBackend};
use crate::error::Result;
use crate::jog::{self, DEFAULT_JOG_STEP};
use crate::motor::driver::Controller;

#[derive(Debug, Parser)]
#[command(
    name = "picomotor",
    version,
    about = "Newport 8742 picomotor controller CLI"
)]
pub struct Cli {
    /// Vendor ID, hex (0x104D) or decimal [default: 0x104D]
    #[arg(long, global = true, value_parser = parse_usb_id)]
    pub vendor_id: Option<u16>,

    /// Product ID, hex or decimal [default: auto-discover]
    #[arg(long, global = true, value_parser = parse_usb_id)]
    pub product_id: Option<u16>,

    /// JSON config file; command-line options override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Velocity applied to every channel (steps/s)
    #[arg(long, global = true)]
    pub velocity: Option<u32>,

    /// Acceleration applied to every channel (steps/s^2)
    #[arg(long, global = true)]
    pub acceleration: Option<u32>,

    /// Motion wait timeout in seconds
    #[arg(long, global = true, value_parser = parse_timeout)]
    pub timeout: Option<f64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand, PartialEq)]
pub enum Command {
    /// List attached controllers
    List {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive command console (default)
    Console,
    /// Jog motors from the keyboard
    Jog {
        /// Initial step size
        #[arg(long, default_value_t = DEFAULT_JOG_STEP)]
        step: u32,
    },
}

fn parse_timeout(value: &str) -> std::result::Result<f64, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|e| format!("invalid timeout {value:?}: {e}"))?;
    timeout_from_secs(seconds)?;
    Ok(seconds)
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied
    pub fn resolve_config(&self) -> Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::load(path)?,
            None => ControllerConfig::default(),
        };

        if let Some(vendor_id) = self.vendor_id {
            config.vendor_id = vendor_id;
        }
        if let Some(product_id) = self.product_id {
            config.product_id = Some(product_id);
        }
        if let Some(velocity) = self.velocity {
            config.velocity = velocity;
        }
        if let Some(acceleration) = self.acceleration {
            config.acceleration = acceleration;
        }
        if let Some(timeout) = self.timeout {
            config.wait_timeout = timeout;
        }
        Ok(config)
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = cli.resolve_config()?;

    match cli.command.unwrap_or(Command::Console) {
        Command::List { json } => {
            let devices =
                discovery::enumerate(&NusbBackend, config.vendor_id, &config.product_ids())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else {
                print!("{}", discovery::format_device_list(&devices, config.vendor_id));
            }
            Ok(())
        }
        Command::Console => {
            let mut controller = Controller::connect(&config)?;
            let stdin = io::stdin();
            console::run(&mut controller, &config, stdin.lock(), &mut io::stdout())
        }
        Command::Jog { step } => {
            let mut controller = Controller::connect(&config)?;
            info!("Jogging with step {}", step);
            jog::run(&mut controller, &config, step)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::time::Duration;

    #[test]
    fn test_defaults_to_console() {
        let cli = Cli::try_parse_from(["picomotor"]).unwrap();
        assert_eq!(cli.command, None);

        let config = cli.resolve_config().unwrap();
        assert_eq!(config.vendor_id, 0x104D);
        assert_eq!(config.product_id, None);
    }

    #[test]
    fn test_parses_ids_and_subcommands() {
        let cli = Cli::try_parse_from([
            "picomotor",
            "list",
            "--json",
            "--vendor-id",
            "4173",
            "--product-id",
            "0x4000",
        ])
        .unwrap();

        assert_eq!(cli.command, Some(Command::List { json: true }));
        assert_eq!(cli.vendor_id, Some(0x104D));
        assert_eq!(cli.product_id, Some(0x4000));

        let cli = Cli::try_parse_from(["picomotor", "jog"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Jog {
                step: DEFAULT_JOG_STEP
            })
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Cli::try_parse_from(["picomotor", "--vendor-id", "0xZZ"]).is_err());
        assert!(Cli::try_parse_from(["picomotor", "--timeout", "0"]).is_err());
        assert!(Cli::try_parse_from(["picomotor", "--timeout", "-3"]).is_err());
        assert!(Cli::try_parse_from(["picomotor", "--timeout", "inf"]).is_err());
    }

    #[test]
    fn test_rejects_timeout_too_large_for_duration() {
        let err = Cli::try_parse_from(["picomotor", "--timeout", "1e20"]).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let cli = Cli::try_parse_from(["picomotor", "--timeout", "1e6"]).unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.wait_timeout(), Duration::from_secs(1_000_000));
    }

    #[test]
    fn test_command_line_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"product_id": "0x4000", "velocity": 500, "acceleration": 800}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::try_parse_from([
            "picomotor",
            "-c",
            path,
            "--velocity",
            "1500",
            "--timeout",
            "2.5",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.product_id, Some(0x4000));
        assert_eq!(config.velocity, 1500);
        assert_eq!(config.acceleration, 800);
        assert_eq!(config.wait_timeout, 2.5);
    }
}
