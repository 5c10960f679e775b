use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, FileFormat};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;

use super::error::{Error, Result};

lazy_static! {
    static ref BUILDER: RwLock<ConfigBuilder<DefaultState>> = RwLock::new(Config::builder());
}

/// 环境变量前缀，例如 DATASYNC_SYNC__CONCURRENCY=4
const ENV_PREFIX: &str = "DATASYNC";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    /// 日志目录，未设置时使用可执行文件旁的 logs/
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// 列举源端时使用的路径前缀
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 中转临时文件目录
    #[serde(default)]
    pub scratch_dir: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            concurrency: default_concurrency(),
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
            scratch_dir: None,
            dry_run: false,
        }
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Backend parameters for one side of a sync job.
///
/// `type` selects the backend from the storage registry; the remaining
/// fields are backend specific and validated by the backend constructor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub r#type: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
}

impl ProviderConfig {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            r#type: "local".to_string(),
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn s3(bucket: impl Into<String>, prefix: Option<String>) -> Self {
        Self {
            r#type: "aws_s3".to_string(),
            bucket: Some(bucket.into()),
            prefix,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub log: LogConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub source: Option<ProviderConfig>,
    #[serde(default)]
    pub destination: Option<ProviderConfig>,
}

impl AppConfig {
    /// Initialize AppConfig.
    pub fn init(default_config: Option<&str>) -> Result<()> {
        let mut builder = Config::builder();

        // Embed file into executable
        // This macro will embed the configuration file into the
        // executable. Check include_str! for more info.
        if let Some(config_contents) = default_config {
            builder = builder.add_source(config::File::from_str(config_contents, FileFormat::Toml));
        }

        // Merge settings with env variables
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut w = BUILDER.write().map_err(|_| Error::new("Configuration lock poisoned"))?;
        *w = builder;

        Ok(())
    }

    /// 合并作业配置文件（toml/yaml/json，按扩展名识别）
    pub fn merge_config(config_file: Option<&Path>) -> Result<()> {
        if let Some(config_file_path) = config_file {
            if !config_file_path.exists() {
                return Err(Error::new(format!(
                    "Configuration file not found: {}",
                    config_file_path.display()
                )));
            }

            let mut w = BUILDER.write().map_err(|_| Error::new("Configuration lock poisoned"))?;
            *w = w.clone().add_source(config::File::from(config_file_path));
        }
        Ok(())
    }

    /// Set CONFIG
    pub fn set(key: &str, value: &str) -> Result<()> {
        let mut w = BUILDER.write().map_err(|_| Error::new("Configuration lock poisoned"))?;
        *w = w.clone().set_override(key, value)?;

        Ok(())
    }

    /// Get a single value
    pub fn get<'de, T>(key: &'de str) -> Result<T>
    where
        T: serde::Deserialize<'de>,
    {
        let r = BUILDER.read().map_err(|_| Error::new("Configuration lock poisoned"))?;
        Ok(r.clone().build()?.get::<T>(key)?)
    }

    /// Get CONFIG
    /// This clones Config (from RwLock<Config>) into a new AppConfig object.
    /// This means you have to fetch this again if you changed the configuration.
    pub fn fetch() -> Result<AppConfig> {
        let r = BUILDER.read().map_err(|_| Error::new("Configuration lock poisoned"))?;
        let config_clone = r.clone().build()?;

        let app_config: AppConfig = config_clone.try_deserialize()?;
        Ok(app_config)
    }
}
