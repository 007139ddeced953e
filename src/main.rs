//! atsms - send a text message through an AT modem
//!
//! ```text
//! atsms 123456789 Will you call me?
//! atsms --device /dev/ttyACM0 +48123456789 Hello
//! ```

use atsms_core::cli::{
    compose_message, normalize_phone_number, CliResult, Console, ExitCodes, OutputFormat,
    RunReport,
};
use atsms_core::{AppConfig, AtEngine, Handshake, ModemDevice, Sms, VirtualModem};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Send an SMS through an AT-compatible GSM modem
#[derive(Parser, Debug)]
#[command(
    name = "atsms",
    version,
    about = "Send a text message through an AT-compatible GSM modem",
    long_about = None
)]
struct Cli {
    /// Receiver, e.g. 123456789 or +48123456789
    #[arg(required_unless_present = "list_devices")]
    phone_number: Option<String>,

    /// Message text; words are joined with single spaces and may start with `-`
    #[arg(
        required_unless_present = "list_devices",
        num_args = 1..,
        allow_hyphen_values = true,
        trailing_var_arg = true
    )]
    message: Vec<String>,

    /// Serial device the modem is attached to
    #[arg(short, long, env = "ATSMS_DEVICE")]
    device: Option<String>,

    /// Config file (default: platform config dir/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for each modem answer
    #[arg(long)]
    timeout: Option<u64>,

    /// Plain output without colors or progress notes
    #[arg(long)]
    no_color: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Talk to a built-in virtual modem instead of a device
    #[arg(long)]
    simulate: bool,

    /// List serial ports known to the system and exit
    #[arg(long)]
    list_devices: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::debug!("Starting atsms v{}", atsms_core::VERSION);
    run(cli).await.to_exit_code()
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> CliResult {
    if cli.list_devices {
        return match list_devices(cli.format) {
            Ok(()) => CliResult::success(),
            Err(e) => {
                let result = CliResult::error(ExitCodes::ERROR, format!("{e:#}"));
                report(&cli, Console::new(false), result)
            }
        };
    }

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let result = CliResult::error(ExitCodes::ERROR, e.to_string());
            return report(&cli, Console::new(false), result);
        }
    };
    if let Some(device) = &cli.device {
        config.device = device.clone();
    }
    if let Some(timeout) = cli.timeout {
        config.timing.command_timeout_secs = timeout;
    }

    let console = match cli.format {
        OutputFormat::Text => Console::detect(config.color && !cli.no_color),
        OutputFormat::Json => Console::new(false),
    };

    let recipient = match normalize_phone_number(cli.phone_number.as_deref().unwrap_or_default()) {
        Ok(recipient) => recipient,
        Err(e) => return report(&cli, console, CliResult::invalid_input(e.to_string())),
    };
    let message = match compose_message(cli.message.as_slice()) {
        Ok(message) => message,
        Err(e) => return report(&cli, console, CliResult::invalid_input(e.to_string())),
    };

    let device = match open_device(&cli, &config) {
        Ok(device) => device,
        Err(result) => return report(&cli, console, result),
    };
    tracing::debug!(device = %device.describe(), "using modem");

    let mut engine = AtEngine::with_config(device, config.timing.engine_config());
    if cli.format == OutputFormat::Text {
        engine.set_event_hook(console.engine_hook());
        console.header(&recipient, &message);
    }

    let sms = Sms::new(&recipient, &message);
    let handshake = Handshake::new(engine);
    let outcome = match cli.format {
        OutputFormat::Text => {
            let mut observer = console;
            handshake.send_sms(&sms, &mut observer).await
        }
        OutputFormat::Json => handshake.send_sms(&sms, &mut ()).await,
    };

    match outcome {
        Ok(delivery) => {
            match cli.format {
                OutputFormat::Text => console.sent(),
                OutputFormat::Json => print_json(&RunReport::delivered(&recipient, &delivery)),
            }
            CliResult::success()
        }
        Err(aborted) => {
            match cli.format {
                OutputFormat::Text => {
                    console.fatal(&aborted.to_string());
                    console.transcript(&aborted.transcript);
                }
                OutputFormat::Json => print_json(&RunReport::aborted(&recipient, &aborted)),
            }
            CliResult::from(&aborted)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, atsms_core::ConfigError> {
    match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
}

fn open_device(cli: &Cli, config: &AppConfig) -> Result<Arc<dyn ModemDevice>, CliResult> {
    if cli.simulate {
        return Ok(Arc::new(VirtualModem::healthy()));
    }

    serial_device(config)
}

#[cfg(unix)]
fn serial_device(config: &AppConfig) -> Result<Arc<dyn ModemDevice>, CliResult> {
    let device = atsms_core::SerialDevice::new(&config.device)
        .read_timeout_ds(config.timing.read_timeout_ds);
    Ok(Arc::new(device))
}

#[cfg(not(unix))]
fn serial_device(config: &AppConfig) -> Result<Arc<dyn ModemDevice>, CliResult> {
    Err(CliResult::error(
        ExitCodes::ERROR,
        format!("Serial devices are not supported on this platform: {}", config.device),
    ))
}

/// Print a failure that happened before the handshake started
fn report(cli: &Cli, console: Console, result: CliResult) -> CliResult {
    if let Some(message) = result.message() {
        match cli.format {
            OutputFormat::Text => console.fatal(message),
            OutputFormat::Json => print_json(&serde_json::json!({
                "sent": false,
                "error": message,
            })),
        }
    }
    result
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!("Cannot render report: {}", e),
    }
}

fn list_devices(format: OutputFormat) -> anyhow::Result<()> {
    let ports = serialport::available_ports()?;

    match format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if ports.is_empty() {
                println!("No serial ports found.");
            }
            for port in &ports {
                println!("{} [{:?}]", port.port_name, port.port_type);
            }
        }
    }

    Ok(())
}
