#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use storage::ByteReader;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

/// 创建测试用的临时目录结构
pub fn create_test_structure() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    // 创建目录结构
    fs::create_dir_all(root.join("dir1/subdir1")).unwrap();
    fs::create_dir_all(root.join("dir2")).unwrap();
    fs::create_dir_all(root.join("empty_dir")).unwrap();

    // 创建文件
    fs::write(root.join("file1.txt"), b"content1").unwrap();
    fs::write(root.join("file2.txt"), b"content2").unwrap();
    fs::write(root.join("dir1/file3.txt"), b"content3").unwrap();
    fs::write(root.join("dir1/subdir1/file4.txt"), b"content4").unwrap();
    fs::write(root.join("dir2/file5.txt"), b"content5").unwrap();

    // 创建空文件和二进制文件
    fs::write(root.join("empty_file.txt"), b"").unwrap();
    fs::write(root.join("binary.dat"), vec![0u8; 1024]).unwrap();

    temp_dir
}

/// 设置文件修改时间（秒级时间戳）
pub fn set_mtime(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

pub fn reader(bytes: &[u8]) -> ByteReader {
    Box::pin(std::io::Cursor::new(bytes.to_vec()))
}

pub async fn read_all(mut stream: ByteReader) -> Vec<u8> {
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer).await.unwrap();
    buffer
}
