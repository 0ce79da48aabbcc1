//! webusb-fake
//!
//! Command-line front end for the fake WebUSB device harness. Loads fixture
//! descriptors from a TOML config, attaches them to a fresh harness, then
//! lists them, runs a JSON operation script or answers framed requests on
//! stdin/stdout.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use std::path::{Path, PathBuf};
use tracing::info;
use webusb_harness::config::{self, HarnessConfig};
use webusb_harness::{UsbTest, bootstrap, parse_script, run_script, serve};

#[derive(Parser, Debug)]
#[command(name = "webusb-fake")]
#[command(
    author,
    version,
    about = "Fake WebUSB devices for exercising WebUSB bindings without hardware"
)]
#[command(long_about = "
Simulates WebUSB devices from configuration descriptors and applies
open/configure/claim/transfer operations to them deterministically.

EXAMPLES:
    # List the fixture devices from the default config
    webusb-fake --list-devices

    # Run a JSON script and print one outcome per line
    webusb-fake --config fixtures.toml --script steps.json

    # Answer length-prefixed requests on stdin/stdout
    webusb-fake --serve --log-level debug

CONFIGURATION:
    The harness looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/webusb-harness/harness.toml
    3. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List attached fake devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Run a JSON script of operations
    #[arg(long, value_name = "PATH", conflicts_with = "serve")]
    script: Option<PathBuf>,

    /// Answer framed requests on stdin/stdout until EOF
    #[arg(long)]
    serve: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = HarnessConfig::default();
        let path = HarnessConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = match args.config.as_deref() {
        Some(path) => config::load_config(path).context("Failed to load configuration")?,
        None => HarnessConfig::load_or_default(),
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.harness.log_level);
    setup_logging(log_level, config.harness.log_format).context("Failed to setup logging")?;

    info!("webusb-fake v{}", env!("CARGO_PKG_VERSION"));

    let mut harness = bootstrap(config.devices.clone())
        .await
        .context("Failed to attach fixture devices")?;
    info!("Attached {} fake device(s)", harness.len());

    if args.list_devices {
        list_devices_mode(&harness);
        return Ok(());
    }

    if let Some(path) = args.script.as_deref() {
        return run_script_mode(&mut harness, path, config.harness.stop_on_error).await;
    }

    if args.serve {
        let mut stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let handled = serve(&mut harness, &mut stdin, &mut stdout)
            .await
            .context("Framed request stream failed")?;
        info!("Served {} request(s)", handled);
        return Ok(());
    }

    list_devices_mode(&harness);
    Ok(())
}

fn list_devices_mode(harness: &UsbTest) {
    let devices = harness.get_devices();
    if devices.is_empty() {
        println!("No fake devices attached.");
        return;
    }

    println!("Attached {} fake device(s):\n", devices.len());
    for device in devices {
        println!(
            "  [{}] {:04x}:{:04x} - {}",
            device.id.0,
            device.vendor_id,
            device.product_id,
            device.product_name.as_deref().unwrap_or("Unnamed device")
        );
        println!(
            "      Configurations: {}  Active: {}  Opened: {}",
            device.configuration_count, device.configuration_value, device.opened
        );
        println!();
    }
}

async fn run_script_mode(harness: &mut UsbTest, path: &Path, stop_on_error: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    let steps = parse_script(&content)
        .with_context(|| format!("Failed to parse script: {}", path.display()))?;

    info!("Running {} script step(s)", steps.len());
    let outcomes = run_script(harness, steps, stop_on_error).await;

    let failures = outcomes.iter().filter(|o| o.is_error()).count();
    for outcome in &outcomes {
        let line = serde_json::to_string(outcome).context("Failed to render outcome")?;
        println!("{}", line);
    }

    if failures > 0 {
        info!("{} step(s) failed", failures);
    }
    Ok(())
}
