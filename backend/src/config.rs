use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageKind {
    Memory,
    File,
    Postgres,
}

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "demo-ingest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ingests demo recordings and serves match statistics", long_about = None)]
pub struct Config {
    /// Address the HTTP server binds to
    #[arg(long, env = "DEMO_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: String,

    /// Where finished matches are kept
    #[arg(long, env = "DEMO_STORAGE", value_enum, default_value = "memory")]
    pub storage: StorageKind,

    /// Folder used by the `file` storage
    #[arg(long, env = "DEMO_DATA_DIR", default_value = "matches/")]
    pub data_dir: std::path::PathBuf,

    /// Required for the `postgres` storage
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Enables the result cache
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Base url of the rank service, ranks are not requested without it
    #[arg(long, env = "RANK_SERVICE_URL")]
    pub rank_service_url: Option<String>,

    #[arg(long, env = "RANK_TIMEOUT_MS", default_value_t = 5000)]
    pub rank_timeout_ms: u64,

    /// Concurrent analysis jobs, defaults to the available parallelism
    #[arg(long, env = "DEMO_WORKERS")]
    pub workers: Option<usize>,

    #[arg(long, env = "DEMO_JOB_TIMEOUT_SECS", default_value_t = 120)]
    pub job_timeout_secs: u64,

    #[arg(long, env = "DEMO_MAX_UPLOAD_MB", default_value_t = 500)]
    pub max_upload_mb: u64,

    /// How long finished matches are retained
    #[arg(long, env = "DEMO_RETENTION_DAYS", default_value_t = 30)]
    pub retention_days: u64,

    #[arg(long, env = "DEMO_GC_INTERVAL_SECS", default_value_t = 3600)]
    pub gc_interval_secs: u64,

    /// Folder for spooled uploads, the system temp dir if unset
    #[arg(long, env = "DEMO_SPOOL_DIR")]
    pub spool_dir: Option<std::path::PathBuf>,

    /// Cell size of the generated heatmaps in world units
    #[arg(long, env = "DEMO_HEATMAP_CELL", default_value_t = 32.0)]
    pub heatmap_cell_size: f32,
}

impl Config {
    pub fn workers(&self) -> usize {
        self.workers
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
            .max(1)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn rank_timeout(&self) -> Duration {
        Duration::from_millis(self.rank_timeout_ms)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 24 * 60 * 60)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs.max(1))
    }
}
