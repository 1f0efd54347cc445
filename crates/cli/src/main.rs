use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use itach::config::{self, Config};
use itach::device::DeviceRegistry;
use itach::gateway::GatewayClient;
use itach::remote::Remote;

#[derive(Parser)]
#[command(name = "itach")]
#[command(about = "Send infrared commands through an iTach IP2IR gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Gateway endpoint overrides shared by the network subcommands.
#[derive(clap::Args)]
struct GatewayArgs {
    /// Config file path (default: ITACH_CONFIG_PATH or ~/.itach/config.json)
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Gateway host, overriding ITACH_HOST and config
    #[arg(long)]
    host: Option<String>,

    /// Gateway port (default from config or 4998)
    #[arg(long, short)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a starter config file if none exists.
    Init {
        /// Config file path (default: ITACH_CONFIG_PATH or ~/.itach/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Load the config and report which devices and commands are usable. Does not contact the gateway.
    Check {
        /// Config file path (default: ITACH_CONFIG_PATH or ~/.itach/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the sendir line for a device command without sending it.
    Show {
        /// Config file path (default: ITACH_CONFIG_PATH or ~/.itach/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        device: String,
        command: String,

        /// Repeat count (values below 1 are sent as 1)
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        count: i64,
    },

    /// Connect to the gateway and report whether it is reachable.
    Ping {
        #[command(flatten)]
        gateway: GatewayArgs,
    },

    /// Send one or more commands to a device, in order, stopping at the first failure.
    Send {
        #[command(flatten)]
        gateway: GatewayArgs,

        device: String,

        #[arg(required = true)]
        commands: Vec<String>,

        /// Multiplies the device's configured irCount
        #[arg(long, short, default_value_t = 1)]
        repeats: i64,
    },

    /// Send the device's ON command.
    On {
        #[command(flatten)]
        gateway: GatewayArgs,
        device: String,
    },

    /// Send the device's OFF command.
    Off {
        #[command(flatten)]
        gateway: GatewayArgs,
        device: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("itach {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Check { config }) => run_check(config),
        Some(Commands::Show {
            config,
            device,
            command,
            count,
        }) => run_show(config, device, command, count),
        Some(Commands::Ping { gateway }) => run_ping(gateway).await,
        Some(Commands::Send {
            gateway,
            device,
            commands,
            repeats,
        }) => run_send(gateway, device, commands, repeats).await,
        Some(Commands::On { gateway, device }) => run_power(gateway, device, true).await,
        Some(Commands::Off { gateway, device }) => run_power(gateway, device, false).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

/// Install env_logger once: RUST_LOG wins, then the config's logLevel, then "warn".
fn init_logging(level: Option<&str>) {
    let default = level.unwrap_or("warn");
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .try_init();
}

fn load(config_path: Option<PathBuf>) -> anyhow::Result<(Config, PathBuf)> {
    let (config, path) = config::load_config(config_path)?;
    init_logging(config.log_level.as_deref());
    log::debug!("loaded config from {}", path.display());
    Ok((config, path))
}

/// Load config, apply endpoint overrides, and register the configured devices.
fn connect_client(args: GatewayArgs) -> anyhow::Result<(Config, GatewayClient)> {
    let (mut config, path) = load(args.config)?;
    if args.host.is_none() {
        itach::init::require_initialized(&path)?;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    let (client, _reports) = match args.host {
        Some(host) => {
            config.gateway.host = Some(host.clone());
            GatewayClient::from_config_at(&config, host)
        }
        None => {
            config.gateway.host = config::resolve_gateway_host(&config);
            GatewayClient::from_config(&config)?
        }
    };
    Ok((config, client))
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    init_logging(None);
    let path = config_path.unwrap_or_else(config::default_config_path);
    if itach::init::init_config_file(&path)? {
        println!("wrote starter configuration to {}", path.display());
    } else {
        println!("configuration already exists at {}", path.display());
    }
    Ok(())
}

fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = load(config_path)?;
    itach::init::require_initialized(&path)?;
    if config::resolve_gateway_host(&config).is_none() {
        println!("warning: no gateway host configured");
    }
    let (_registry, reports) = DeviceRegistry::from_devices(&config.devices);
    let mut failed = 0;
    for report in &reports {
        println!(
            "{}: {} command(s) loaded, {} failed",
            report.device,
            report.loaded,
            report.failed()
        );
        for failure in &report.failures {
            println!("  {}: {}", failure.command, failure.error);
        }
        failed += report.failed();
    }
    if reports.len() < config.devices.len() {
        anyhow::bail!("duplicate device names in {}", path.display());
    }
    if failed > 0 {
        anyhow::bail!("{} command(s) could not be loaded", failed);
    }
    Ok(())
}

fn run_show(
    config_path: Option<PathBuf>,
    device: String,
    command: String,
    count: i64,
) -> anyhow::Result<()> {
    let (config, _path) = load(config_path)?;
    let (registry, _reports) = DeviceRegistry::from_devices(&config.devices);
    let line = registry.get_command(&device, &command, count)?;
    println!("{}", line.replace('\r', "\\r"));
    Ok(())
}

async fn run_ping(args: GatewayArgs) -> anyhow::Result<()> {
    let (config, client) = connect_client(args)?;
    if !client.ready().await {
        anyhow::bail!(
            "gateway {}:{} is not reachable",
            config.gateway.host.as_deref().unwrap_or_default(),
            config.gateway.port
        );
    }
    println!("gateway is ready");
    client.close().await;
    Ok(())
}

fn ir_count_for(config: &Config, device: &str) -> i64 {
    config
        .devices
        .iter()
        .find(|d| d.display_name() == device)
        .map(|d| i64::from(d.ir_count.get()))
        .unwrap_or(1)
}

async fn run_send(
    args: GatewayArgs,
    device: String,
    commands: Vec<String>,
    repeats: i64,
) -> anyhow::Result<()> {
    let (config, client) = connect_client(args)?;
    let client = Arc::new(client);
    let remote = Remote::new(client.clone(), device.as_str(), ir_count_for(&config, &device));
    let result = remote.send_commands(commands.as_slice(), repeats).await;
    client.close().await;
    let acks = result?;
    println!("sent {} command(s) to {}", acks.len(), remote.name());
    Ok(())
}

async fn run_power(args: GatewayArgs, device: String, on: bool) -> anyhow::Result<()> {
    let (config, client) = connect_client(args)?;
    let client = Arc::new(client);
    let remote = Remote::new(client.clone(), device.as_str(), ir_count_for(&config, &device));
    let result = if on {
        remote.turn_on().await
    } else {
        remote.turn_off().await
    };
    client.close().await;
    result?;
    println!("{} is {}", remote.name(), if remote.is_on() { "on" } else { "off" });
    Ok(())
}
