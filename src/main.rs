use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gridcache::config::Config;
use gridcache::preload::{get_all_preset_names, get_preset, resolve_preset, PreloadingStrategy};
use gridcache::resource::{VariantKey, INITIAL_VARIANT_NUM};
use gridcache::store::RestNetworkStoreClient;
use gridcache::topology::BusPartition;
use gridcache::{NetworkStoreSession, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Cache, preload and inspect a remote network store
#[derive(Parser, Debug)]
#[command(name = "gridcache", version = VERSION, about, long_about = None)]
struct Args {
    /// Network store base URL
    #[arg(long, global = true)]
    store_url: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the preloading presets
    Presets,

    /// Preload a network variant and report what was loaded
    Preload {
        #[command(flatten)]
        target: Target,

        #[command(flatten)]
        strategy: StrategyArgs,
    },

    /// Print the calculated buses of a voltage level
    Buses {
        #[command(flatten)]
        target: Target,

        /// Voltage level id
        #[arg(long)]
        voltage_level: String,

        #[command(flatten)]
        strategy: StrategyArgs,
    },
}

#[derive(clap::Args, Debug)]
struct Target {
    /// Network id (defaults to the last network used)
    #[arg(short, long)]
    network: Option<Uuid>,

    /// Variant number
    #[arg(long, default_value_t = INITIAL_VARIANT_NUM)]
    variant: i32,
}

#[derive(clap::Args, Debug)]
struct StrategyArgs {
    /// Preloading preset name
    #[arg(short, long, conflicts_with = "preloading_file")]
    preloading: Option<String>,

    /// Custom preloading strategy (YAML or JSON)
    #[arg(long)]
    preloading_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gridcache {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gridcache").join("gridcache.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gridcache").join("gridcache.log");
    }
    PathBuf::from("gridcache.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let mut config = Config::load();

    match &args.command {
        Command::Presets => {
            print_presets();
            Ok(())
        }
        Command::Preload { target, strategy } => {
            let key = resolve_target(&mut config, target)?;
            let session = open_session(&args, &config, strategy)?;
            let report = session.preload(key).await?;

            println!("Preloaded {} in {:?}", key, report.elapsed);
            for (resource_type, count) in &report.resources {
                println!("  {:<28} {}", resource_type, count);
            }
            println!("  {:<28} {}", "extensions", report.extensions);
            println!("  {:<28} {}", "limits groups", report.limits_groups);
            Ok(())
        }
        Command::Buses {
            target,
            voltage_level,
            strategy,
        } => {
            let key = resolve_target(&mut config, target)?;
            let session = open_session(&args, &config, strategy)?;
            let partition = session.calculate_buses(key, voltage_level).await?;
            print_partition(&partition);
            Ok(())
        }
    }
}

fn print_presets() {
    for name in get_all_preset_names() {
        let description = get_preset(name)
            .map(|p| p.description.as_str())
            .unwrap_or_default();
        println!("{:<24} {}", name, description);
    }
}

fn resolve_target(config: &mut Config, target: &Target) -> Result<VariantKey> {
    let network_id = config
        .effective_network(target.network)
        .context("No network given. Use --network <uuid>")?;
    if let Err(e) = config.set_last_network(network_id) {
        tracing::warn!("Failed to save config: {}", e);
    }
    Ok(VariantKey::new(network_id, target.variant))
}

fn resolve_strategy(config: &Config, args: &StrategyArgs) -> Result<PreloadingStrategy> {
    let strategy = match &args.preloading_file {
        Some(path) => PreloadingStrategy::from_file(path)?,
        None => resolve_preset(&config.effective_preloading(args.preloading.as_deref()))?,
    };
    strategy.validate()?;
    Ok(strategy)
}

fn open_session(args: &Args, config: &Config, strategy: &StrategyArgs) -> Result<NetworkStoreSession> {
    let store_url = config.effective_store_url(args.store_url.as_deref());
    let strategy = resolve_strategy(config, strategy)?;
    tracing::info!("Using store {} with strategy {:?}", store_url, strategy);

    let client = RestNetworkStoreClient::new(&store_url)?;
    Ok(NetworkStoreSession::new(Arc::new(client), strategy))
}

fn print_partition(partition: &BusPartition) {
    println!(
        "Voltage level {} ({:?}): {} buses",
        partition.voltage_level_id,
        partition.topology_kind,
        partition.len()
    );
    for bus in partition.buses() {
        println!("  {}", bus.id);
        if !bus.nodes.is_empty() {
            println!("    nodes: {:?}", bus.nodes);
        }
        if !bus.configured_buses.is_empty() {
            println!("    configured buses: {}", bus.configured_buses.join(", "));
        }
        for vertex in &bus.vertices {
            match vertex.side {
                Some(side) => println!("    {} {} (side {})", vertex.resource_type, vertex.id, side.index()),
                None => println!("    {} {}", vertex.resource_type, vertex.id),
            }
        }
    }
}
