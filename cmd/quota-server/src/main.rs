use clap::Parser;
use pkg_api::server::{ServerConfig, start_server};
use pkg_constants::quota::{
    ADMISSION_TIMEOUT_SECS, DEFAULT_MAX_UPDATE_RETRIES, DEFAULT_WORKERS, LIVE_LOOKUP_TTL_SECS,
};
use pkg_constants::server::{DEFAULT_CONFIG_PATH, DEFAULT_DATA_DIR, DEFAULT_PORT};
use pkg_quota::{AccessorConfig, CoordinatorConfig};
use pkg_types::config::{ServerConfigFile, load_config_file};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quota-server", about = "Resource quota admission server")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Number of namespace batch workers
    #[arg(long)]
    workers: Option<usize>,

    /// Seconds a live quota lookup is reused for an unsynced namespace
    #[arg(long)]
    live_lookup_ttl_secs: Option<u64>,

    /// Seconds an admission request may wait for its verdict
    #[arg(long)]
    admission_timeout_secs: Option<u64>,

    /// Commit retries after a quota version conflict
    #[arg(long)]
    max_update_retries: Option<u32>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    // Load config file (returns defaults if file not found)
    let file_cfg: ServerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let port = cli.port.or(file_cfg.port).unwrap_or(DEFAULT_PORT);
    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    let workers = cli.workers.or(file_cfg.workers).unwrap_or(DEFAULT_WORKERS);
    let live_lookup_ttl = cli
        .live_lookup_ttl_secs
        .or(file_cfg.live_lookup_ttl_secs)
        .unwrap_or(LIVE_LOOKUP_TTL_SECS);
    let admission_timeout = cli
        .admission_timeout_secs
        .or(file_cfg.admission_timeout_secs)
        .unwrap_or(ADMISSION_TIMEOUT_SECS);
    let max_update_retries = cli
        .max_update_retries
        .or(file_cfg.max_update_retries)
        .unwrap_or(DEFAULT_MAX_UPDATE_RETRIES);

    info!("Starting quota-server");
    info!("  Port:               {}", port);
    info!("  Data dir:           {}", data_dir);
    info!("  Workers:            {}", workers);
    info!("  Live lookup TTL:    {}s", live_lookup_ttl);
    info!("  Admission timeout:  {}s", admission_timeout);
    info!("  Update retries:     {}", max_update_retries);
    info!("  Limited resources:  {}", file_cfg.limited_resources.len());

    let config = ServerConfig {
        addr: SocketAddr::from(([0, 0, 0, 0], port)),
        data_dir,
        coordinator: CoordinatorConfig {
            workers,
            max_update_retries,
            limited_resources: file_cfg.limited_resources,
        },
        accessor: AccessorConfig {
            live_lookup_ttl: Duration::from_secs(live_lookup_ttl),
            ..AccessorConfig::default()
        },
        admission_timeout: Duration::from_secs(admission_timeout),
        counted_kinds: file_cfg.counted_kinds,
    };

    start_server(config).await?;

    Ok(())
}
