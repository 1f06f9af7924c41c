use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub local_store: LocalStoreConfig,
    pub mirror: MirrorConfig,
    pub content: ContentConfig,
    pub bank: BankConfig,
    pub sync: SyncConfig,
    pub crisis: CrisisConfig,
    pub selector: SelectorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalStoreConfig {
    pub path: String,
    /// Read-only connections opened next to the single writer.
    pub reader_connections: usize,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            path: "data/mentor.db".to_string(),
            reader_connections: 4,
        }
    }
}

/// Remote mirror settings. No URI means mirroring is off.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub mongo_uri: Option<String>,
    pub database: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            mongo_uri: None,
            database: "mentor".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub api_url: String,
    pub timeout_ms: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl ContentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    pub seed_file: Option<String>,
    pub max_size: Option<u32>,
    pub refill_low_watermark: u32,
    pub refill_min_interval_secs: u64,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            seed_file: None,
            max_size: None,
            refill_low_watermark: 20,
            refill_min_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub pull_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pull_timeout_ms: 3000,
        }
    }
}

impl SyncConfig {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrisisConfig {
    pub probability: f64,
    pub sweep_interval_secs: u64,
}

impl Default for CrisisConfig {
    fn default() -> Self {
        Self {
            probability: 0.10,
            sweep_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub fresh_bias: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self { fresh_bias: 0.4 }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // config/*.toml first, APP__SECTION__KEY variables on top
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = settings.try_deserialize()?;

        if config.mirror.mongo_uri.is_none() {
            config.mirror.mongo_uri = env::var("MONGO_URI").ok().filter(|uri| !uri.is_empty());
        }

        config.crisis.probability = config.crisis.probability.clamp(0.0, 1.0);
        config.selector.fresh_bias = config.selector.fresh_bias.clamp(0.0, 1.0);

        Ok(config)
    }
}
