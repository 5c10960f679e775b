use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, StorageError};
use crate::file::LocalStorage;
use crate::s3::S3Storage;
use crate::StorageProvider;
use utils::app_config::ProviderConfig;

pub type StorageCreator = fn(config: &ProviderConfig) -> Result<Arc<dyn StorageProvider>>;

static STORAGE_REGISTRY: Lazy<DashMap<String, StorageCreator>> = Lazy::new(|| {
    let registry = DashMap::new();
    // 自动注册内置存储类型
    register_builtin_types(&registry);
    registry
});

pub struct StorageFactory;

impl StorageFactory {
    /// Register a new storage type
    pub fn register_storage_type(storage_type: &str, creator: StorageCreator) {
        STORAGE_REGISTRY.insert(storage_type.to_string(), creator);
    }

    /// Whether a storage type is known to the registry
    pub fn is_registered(storage_type: &str) -> bool {
        STORAGE_REGISTRY.contains_key(storage_type)
    }

    /// Create a storage instance based on configuration
    pub fn create_storage(config: &ProviderConfig) -> Result<Arc<dyn StorageProvider>> {
        let storage_type = config.r#type.trim();
        if storage_type.is_empty() {
            return Err(StorageError::ConfigError(
                "storage 'type' is required".to_string(),
            ));
        }

        // 复制出构造函数，避免持有DashMap的读锁调用外部代码
        let creator = STORAGE_REGISTRY
            .get(storage_type)
            .map(|entry| *entry.value())
            .ok_or_else(|| StorageError::UnsupportedType(storage_type.to_string()))?;

        creator(config)
    }
}

/// Convenience function to create a storage from configuration
pub fn create_storage(config: &ProviderConfig) -> Result<Arc<dyn StorageProvider>> {
    StorageFactory::create_storage(config)
}

/// 根据路径前缀解析存储配置
///
/// - `s3://bucket/prefix` -> aws_s3
/// - `file:///abs/path` 或普通路径 -> local
pub fn parse_storage_uri(uri: &str) -> Result<ProviderConfig> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(StorageError::ConfigError("empty storage location".to_string()));
    }

    if let Some(rest) = uri.strip_prefix("s3://") {
        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, Some(prefix)),
            None => (rest, None),
        };
        if bucket.is_empty() {
            return Err(StorageError::ConfigError(format!(
                "missing bucket in '{}'",
                uri
            )));
        }
        let prefix = prefix.filter(|p| !p.is_empty()).map(str::to_string);
        return Ok(ProviderConfig::s3(bucket, prefix));
    }

    let path = uri.strip_prefix("file://").unwrap_or(uri);
    Ok(ProviderConfig::local(path))
}

/// 解析本地路径，支持相对路径和绝对路径
fn resolve_local_path(path: &str) -> Result<String> {
    let path_obj = Path::new(path);

    if path_obj.is_absolute() {
        Ok(path.to_string())
    } else {
        std::env::current_dir()
            .map_err(|e| StorageError::ConfigError(format!("Failed to get current directory: {}", e)))
            .map(|dir| dir.join(path).to_string_lossy().into_owned())
    }
}

fn create_local_storage(config: &ProviderConfig) -> Result<Arc<dyn StorageProvider>> {
    let path = config
        .path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| StorageError::ConfigError("local storage requires 'path'".to_string()))?;

    let root = resolve_local_path(path)?;
    Ok(Arc::new(LocalStorage::new(root)) as Arc<dyn StorageProvider>)
}

fn create_s3_storage(config: &ProviderConfig) -> Result<Arc<dyn StorageProvider>> {
    let bucket = config
        .bucket
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .ok_or_else(|| StorageError::ConfigError("aws_s3 storage requires 'bucket'".to_string()))?;

    if config.access_key.is_some() != config.secret_key.is_some() {
        return Err(StorageError::ConfigError(
            "aws_s3 'access_key' and 'secret_key' must be set together".to_string(),
        ));
    }

    let storage = S3Storage::new(bucket, config.prefix.as_deref())
        .with_region(config.region.clone())
        .with_credentials(config.access_key.clone(), config.secret_key.clone())
        .with_endpoint(config.endpoint.clone());

    Ok(Arc::new(storage) as Arc<dyn StorageProvider>)
}

// 内置类型注册函数
fn register_builtin_types(registry: &DashMap<String, StorageCreator>) {
    registry.insert("local".to_string(), create_local_storage as StorageCreator);
    registry.insert("aws_s3".to_string(), create_s3_storage as StorageCreator);
    registry.insert("s3".to_string(), create_s3_storage as StorageCreator);
}
