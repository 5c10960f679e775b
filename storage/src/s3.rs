//! S3 storage backend built on aws-sdk-s3

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use std::io;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

use crate::common::{normalize_key, normalize_prefix, FileRecord};
use crate::error::{Result, StorageError};
use crate::{ByteReader, StorageProvider};

/// 访问被拒绝类的S3错误码
const PERMISSION_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
];

const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NotFound"];

/// 上传分片大小，不小于S3要求的5 MiB；每个上传最多缓存一个分片
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// S3存储结构
pub struct S3Storage {
    bucket: String,
    region: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    endpoint: Option<String>,
    /// 作为存储根的key前缀，为空或以 / 结尾
    prefix: String,
    client: RwLock<Option<S3Client>>,
}

impl S3Storage {
    pub fn new(bucket: impl Into<String>, prefix: Option<&str>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            access_key: None,
            secret_key: None,
            endpoint: None,
            prefix: normalize_prefix(prefix.unwrap_or_default()),
            client: RwLock::new(None),
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// 显式指定访问密钥；未指定时使用默认凭证链
    pub fn with_credentials(mut self, access_key: Option<String>, secret_key: Option<String>) -> Self {
        self.access_key = access_key;
        self.secret_key = secret_key;
        self
    }

    /// S3兼容服务（MinIO、R2等）的访问地址
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Get the key prefix used as storage root
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 相对路径转换为完整的对象key
    pub fn object_key(&self, path: &str) -> String {
        format!("{}{}", self.prefix, normalize_key(path))
    }

    /// 对象key转换为相对路径，不在根前缀下或是目录占位符时返回None
    pub fn record_path(&self, key: &str) -> Option<String> {
        let relative = key.strip_prefix(self.prefix.as_str())?;
        if relative.is_empty() || relative.ends_with('/') {
            return None;
        }
        Some(relative.to_string())
    }

    async fn client(&self) -> Result<S3Client> {
        self.client.read().await.clone().ok_or_else(|| {
            StorageError::ConnectionError(format!("s3://{} is not connected", self.bucket))
        })
    }

    async fn build_client(&self) -> S3Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let (Some(access_key), Some(secret_key)) = (&self.access_key, &self.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "datasync-config",
            ));
        }
        if let Some(endpoint) = &self.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if self.endpoint.is_some() {
            builder = builder.force_path_style(true);
        }

        S3Client::from_conf(builder.build())
    }

    /// 大文件分片上传，失败时中止上传以释放已上传的分片
    async fn upload_multipart(
        &self, client: &S3Client, key: &str, first: Vec<u8>, data: &mut ByteReader,
    ) -> Result<u64> {
        let upload = client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(&format!("start upload {}", key), e))?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| StorageError::TransferError(format!("no upload id for {}", key)))?
            .to_string();

        match self.upload_parts(client, key, &upload_id, first, data).await {
            Ok(size) => Ok(size),
            Err(e) => {
                if let Err(abort) = client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    log::warn!(
                        "Failed to abort upload of {}: {}",
                        key,
                        DisplayErrorContext(&abort)
                    );
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self, client: &S3Client, key: &str, upload_id: &str, first: Vec<u8>,
        data: &mut ByteReader,
    ) -> Result<u64> {
        let mut completed = Vec::new();
        let mut size = 0u64;
        let mut part = first;
        let mut number = 1;

        while !part.is_empty() {
            size += part.len() as u64;
            let output = client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(|e| classify(&format!("upload part {} of {}", number, key), e))?;

            completed.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(number)
                    .build(),
            );
            number += 1;
            part = read_part(data, PART_SIZE)
                .await
                .map_err(|e| StorageError::from_io(format!("read {}", key), e))?;
        }

        client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| classify(&format!("complete upload {}", key), e))?;

        log::debug!(
            "Uploaded {} bytes in {} parts to s3://{}/{}",
            size,
            number - 1,
            self.bucket,
            key
        );
        Ok(size)
    }
}

/// 读取至多 `limit` 字节，返回空表示数据已读完
async fn read_part(data: &mut ByteReader, limit: usize) -> io::Result<Vec<u8>> {
    let mut part = Vec::with_capacity(limit.min(64 * 1024));
    (&mut *data).take(limit as u64).read_to_end(&mut part).await?;
    Ok(part)
}

/// 将SDK错误归类为存储错误
fn classify<E, R>(context: &str, err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{}: {}", context, DisplayErrorContext(&err));

    if matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
    ) {
        return StorageError::ConnectionError(message);
    }

    match err.code() {
        Some(code) if PERMISSION_CODES.contains(&code) => StorageError::PermissionError(message),
        Some(code) if NOT_FOUND_CODES.contains(&code) => StorageError::NotFoundError(message),
        _ => StorageError::TransferError(message),
    }
}

#[async_trait::async_trait]
impl StorageProvider for S3Storage {
    fn kind(&self) -> &'static str {
        "aws_s3"
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }

    async fn connect(&self) -> Result<()> {
        let client = self.build_client().await;

        client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                StorageError::ConnectionError(format!(
                    "cannot open bucket {}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        *self.client.write().await = Some(client);
        log::info!("Connected to s3://{}/{}", self.bucket, self.prefix);
        Ok(())
    }

    async fn disconnect(&self) {
        if self.client.write().await.take().is_some() {
            log::debug!("Disconnected from s3://{}", self.bucket);
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<FileRecord>> {
        let client = self.client().await?;
        let key_prefix = self.object_key(prefix);

        let mut pages = client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&key_prefix)
            .into_paginator()
            .send();

        let mut records = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| classify(&format!("list s3://{}/{}", self.bucket, key_prefix), e))?;

            for object in page.contents() {
                let Some(path) = object.key().and_then(|key| self.record_path(key)) else {
                    continue;
                };
                let size = object.size().unwrap_or(0).max(0) as u64;
                let modified = object.last_modified().map(|dt| dt.secs()).unwrap_or(0);
                records.push(FileRecord::new(path, size, modified));
            }
        }

        Ok(records)
    }

    async fn stat(&self, path: &str) -> Result<FileRecord> {
        let client = self.client().await?;
        let key = self.object_key(path);
        let record_path = normalize_key(path);

        match client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => {
                let size = output.content_length().unwrap_or(0).max(0) as u64;
                let modified = output.last_modified().map(|dt| dt.secs()).unwrap_or(0);
                Ok(FileRecord::new(record_path, size, modified))
            }
            Err(e) => match classify(&format!("stat {}", key), e) {
                StorageError::NotFoundError(_) => Ok(FileRecord::absent(record_path)),
                other => Err(other),
            },
        }
    }

    async fn read(&self, path: &str) -> Result<ByteReader> {
        let client = self.client().await?;
        let key = self.object_key(path);

        let output = client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| classify(&format!("read {}", key), e))?;

        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn write(&self, path: &str, mut data: ByteReader) -> Result<u64> {
        let client = self.client().await?;
        let key = self.object_key(path);

        let first = read_part(&mut data, PART_SIZE)
            .await
            .map_err(|e| StorageError::from_io(format!("read {}", key), e))?;
        if first.len() < PART_SIZE {
            let size = first.len() as u64;
            client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(ByteStream::from(first))
                .send()
                .await
                .map_err(|e| classify(&format!("write {}", key), e))?;

            log::debug!("Uploaded {} bytes to s3://{}/{}", size, self.bucket, key);
            return Ok(size);
        }

        self.upload_multipart(&client, &key, first, &mut data).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let client = self.client().await?;
        let key = self.object_key(path);

        client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| classify(&format!("delete {}", key), e))?;

        Ok(())
    }
}
