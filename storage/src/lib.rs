pub mod common;
pub mod error;
pub mod factory;
pub mod file;
pub mod s3;

pub use common::*;
pub use error::{Result, StorageError};
pub use factory::{create_storage, parse_storage_uri, StorageCreator, StorageFactory};
pub use file::LocalStorage;
pub use s3::S3Storage;
pub use utils::app_config::ProviderConfig;

use std::pin::Pin;
use tokio::io::AsyncRead;

/// 读写使用的字节流
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// 存储后端统一能力接口
///
/// Every operation other than `connect` may only be called between a
/// successful `connect` and the matching `disconnect`. Implementations must
/// tolerate concurrent calls from several transfer workers sharing one session.
#[async_trait::async_trait]
pub trait StorageProvider: Send + Sync {
    /// 后端类型名称，例如 local / aws_s3
    fn kind(&self) -> &'static str;

    /// 用于日志和进度显示的位置描述
    fn location(&self) -> String {
        self.kind().to_string()
    }

    /// 建立会话；认证或网络失败返回 ConnectionError
    async fn connect(&self) -> Result<()>;

    /// 释放会话；幂等，不会失败
    async fn disconnect(&self);

    /// 列出前缀下的所有文件；前缀不存在时返回空列表
    async fn list(&self, prefix: &str) -> Result<Vec<FileRecord>>;

    /// 获取单个文件的大小和修改时间；不存在时返回哨兵记录而不是错误
    async fn stat(&self, path: &str) -> Result<FileRecord>;

    /// 打开文件读取流；不存在时返回 NotFoundError
    async fn read(&self, path: &str) -> Result<ByteReader>;

    /// 写入文件，自动创建父级结构，已存在时覆盖；返回写入的字节数
    async fn write(&self, path: &str, data: ByteReader) -> Result<u64>;

    /// 删除文件；幂等
    async fn delete(&self, path: &str) -> Result<()>;
}
