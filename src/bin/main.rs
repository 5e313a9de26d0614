use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

use ringstore::{
    admin::{self, AdminState},
    cache::CachePolicy,
    config::{ConfigError, LogFormat, RingstoreConfig},
    server::KvServer,
};

#[derive(Parser)]
#[command(name = "ringstore-server")]
#[command(about = "A storage node for a hash-partitioned distributed KV store")]
#[command(version)]
pub struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Client protocol port (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Client protocol bind address (overrides config file)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Directory holding kvstorage.txt (overrides config file)
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Log file (overrides config file)
    #[arg(short, long)]
    pub log_file: Option<PathBuf>,

    /// Log level (overrides config file)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Cache capacity in pairs (overrides config file)
    #[arg(short, long)]
    pub cache_size: Option<usize>,

    /// Cache strategy: none, fifo, lru, lfu (overrides config file)
    #[arg(short, long)]
    pub strategy: Option<CachePolicy>,

    /// Admin HTTP API bind address (overrides config file)
    #[arg(long)]
    pub admin_addr: Option<String>,

    /// Generate default configuration file and exit
    #[arg(long)]
    pub generate_config: Option<PathBuf>,

    /// Validate configuration file and exit
    #[arg(long)]
    pub validate_config: bool,

    /// List default configuration file locations
    #[arg(long)]
    pub list_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Handle utility commands first
    if let Some(config_path) = args.generate_config {
        return generate_default_config(config_path);
    }

    if args.list_config_paths {
        list_config_paths();
        return Ok(());
    }

    let config = load_configuration(&args).context("Configuration error")?;

    if args.validate_config {
        println!("✅ Configuration is valid");
        println!("🔌 Client Address: {}", config.node.listen_addr);
        println!("🌐 Admin Address: {}", config.node.admin_addr);
        println!("💾 Data Directory: {}", config.node.data_dir.display());
        println!(
            "🗃️  Cache: {} x {}",
            config.cache.policy, config.cache.capacity
        );
        println!("📊 Log Level: {}", config.logging.level);
        return Ok(());
    }

    setup_logging(&config)?;

    tracing::info!(
        "🚀 Starting ringstore node {}",
        config.node.name.as_deref().unwrap_or("(unnamed)")
    );
    tracing::info!(
        "📁 Configuration loaded from: {}",
        args.config
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string())
    );
    tracing::info!("💾 Data directory: {}", config.node.data_dir.display());
    tracing::info!(
        "🗃️  Cache: {} with capacity {}",
        config.cache.policy,
        config.cache.capacity
    );

    let mut server = KvServer::from_config(&config).context("Failed to initialize node")?;
    let client_addr = server.start().await.context("Failed to start KV server")?;
    tracing::info!("🔌 Client protocol: {}", client_addr);

    let admin_state = AdminState::new(server.engine(), server.cluster())
        .with_name(config.node.name.clone());
    let admin_server = admin::serve(config.node.admin_addr, admin_state)
        .with_context(|| format!("Failed to bind admin API on {}", config.node.admin_addr))?;
    let admin_handle = admin_server.handle();
    tracing::info!("🌐 Admin API: http://{}", config.node.admin_addr);

    // Workers run on their own threads; the server future itself is Send
    let admin_task = tokio::spawn(admin_server);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("🛑 Shutdown signal received");
        }
        result = admin_task => {
            tracing::error!("❌ Admin API stopped: {:?}", result);
        }
    }

    admin_handle.stop(true).await;
    server.stop().await.context("Failed to stop KV server")?;
    tracing::info!("👋 Node stopped");

    Ok(())
}

/// Load configuration with CLI overrides
fn load_configuration(args: &Args) -> Result<RingstoreConfig, ConfigError> {
    // Load base configuration
    let mut config = match &args.config {
        Some(path) => RingstoreConfig::from_file(path)?,
        None => RingstoreConfig::load_default()?,
    };

    // Apply CLI overrides
    if let Some(ref address) = args.address {
        let ip = address
            .parse()
            .map_err(|e| ConfigError::Validation(format!("Invalid address: {}", e)))?;
        config.node.listen_addr.set_ip(ip);
    }

    if let Some(port) = args.port {
        config.node.listen_addr.set_port(port);
    }

    if let Some(ref admin_addr) = args.admin_addr {
        config.node.admin_addr = admin_addr
            .parse()
            .map_err(|e| ConfigError::Validation(format!("Invalid admin address: {}", e)))?;
    }

    if let Some(ref data_dir) = args.data_dir {
        config.node.data_dir = data_dir.clone();
    }

    if let Some(ref log_file) = args.log_file {
        config.logging.file_path = Some(log_file.clone());
    }

    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.to_lowercase();
    }

    if let Some(capacity) = args.cache_size {
        config.cache.capacity = capacity;
    }

    if let Some(policy) = args.strategy {
        config.cache.policy = policy;
    }

    // Validate final configuration
    config.validate()?;
    Ok(config)
}

/// Setup logging based on configuration
fn setup_logging(config: &RingstoreConfig) -> anyhow::Result<()> {
    use tracing_subscriber::fmt::time::ChronoUtc;

    let level = config
        .logging
        .level
        .parse::<tracing::Level>()
        .context("Invalid log level")?;

    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("ringstore={}", level).parse()?)
        .add_directive(format!("ringstore_server={}", level).parse()?)
        .add_directive("actix_server=warn".parse()?);

    let (writer, ansi) = match &config.logging.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
        None => (
            BoxMakeWriter::new(std::io::stdout),
            config.logging.enable_colors,
        ),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(ChronoUtc::rfc_3339())
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(writer)
        .with_ansi(ansi);

    match config.logging.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }

    Ok(())
}

/// Generate a default configuration file
fn generate_default_config(path: PathBuf) -> anyhow::Result<()> {
    RingstoreConfig::default()
        .to_file(&path)
        .context("Failed to write config")?;

    println!(
        "✅ Generated default configuration file: {}",
        path.display()
    );
    println!("📝 Edit the file to customize your ringstore node settings");
    println!("🚀 Start with: ringstore-server --config {}", path.display());

    Ok(())
}

/// List default configuration file locations
fn list_config_paths() {
    println!("📍 Default configuration file locations (in order of precedence):");
    println!();

    for (i, path) in RingstoreConfig::default_config_paths().iter().enumerate() {
        let exists = if path.exists() { "✅" } else { "❌" };
        println!("  {}. {} {}", i + 1, exists, path.display());
    }

    println!();
    println!("💡 Tips:");
    println!("   • Create a config file in any of these locations");
    println!("   • Use --config <path> to specify a custom location");
    println!("   • Use --generate-config <path> to create a default config");
}
