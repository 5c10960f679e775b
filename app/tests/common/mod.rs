#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncReadExt;

use storage::{ByteReader, FileRecord, StorageError, StorageProvider};

pub type ReadHook = Box<dyn Fn(&str) + Send + Sync>;

/// 列举时的故障注入方式
pub enum ListFault {
    Error(StorageError),
    Panic,
}

/// 内存存储，用于测试执行器和编排器
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, (Vec<u8>, i64)>>,
    connect_error: Option<StorageError>,
    list_fault: Option<ListFault>,
    read_faults: Mutex<HashMap<String, VecDeque<StorageError>>>,
    write_faults: Mutex<HashMap<String, VecDeque<StorageError>>>,
    read_hook: Option<ReadHook>,
    write_time: Option<i64>,

    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub lists: AtomicUsize,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, content: &[u8], modified: i64) -> Self {
        self.insert(path, content, modified);
        self
    }

    pub fn failing_connect(mut self, err: StorageError) -> Self {
        self.connect_error = Some(err);
        self
    }

    pub fn failing_list(mut self, fault: ListFault) -> Self {
        self.list_fault = Some(fault);
        self
    }

    /// 前 `times` 次读取该路径时返回错误
    pub fn failing_read(self, path: &str, err: StorageError, times: usize) -> Self {
        push_faults(&self.read_faults, path, err, times);
        self
    }

    pub fn failing_write(self, path: &str, err: StorageError, times: usize) -> Self {
        push_faults(&self.write_faults, path, err, times);
        self
    }

    pub fn on_read(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.read_hook = Some(Box::new(hook));
        self
    }

    /// 写入后记录的修改时间，默认为当前时间
    pub fn with_write_time(mut self, secs: i64) -> Self {
        self.write_time = Some(secs);
        self
    }

    pub fn insert(&self, path: &str, content: &[u8], modified: i64) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), (content.to_vec(), modified));
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).map(|(c, _)| c.clone())
    }

    pub fn modified(&self, path: &str) -> Option<i64> {
        self.files.lock().unwrap().get(path).map(|(_, m)| *m)
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn push_faults(
    faults: &Mutex<HashMap<String, VecDeque<StorageError>>>, path: &str, err: StorageError,
    times: usize,
) {
    let mut faults = faults.lock().unwrap();
    let queue = faults.entry(path.to_string()).or_default();
    for _ in 0..times {
        queue.push_back(err.clone());
    }
}

fn take_fault(
    faults: &Mutex<HashMap<String, VecDeque<StorageError>>>, path: &str,
) -> Option<StorageError> {
    faults
        .lock()
        .unwrap()
        .get_mut(path)
        .and_then(|queue| queue.pop_front())
}

#[async_trait::async_trait]
impl StorageProvider for MemoryStorage {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> storage::Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.connect_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn list(&self, prefix: &str) -> storage::Result<Vec<FileRecord>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        match &self.list_fault {
            Some(ListFault::Error(err)) => return Err(err.clone()),
            Some(ListFault::Panic) => panic!("listing blew up"),
            None => {}
        }

        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, (content, modified))| {
                FileRecord::new(path.clone(), content.len() as u64, *modified)
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> storage::Result<FileRecord> {
        Ok(match self.files.lock().unwrap().get(path) {
            Some((content, modified)) => FileRecord::new(path, content.len() as u64, *modified),
            None => FileRecord::absent(path),
        })
    }

    async fn read(&self, path: &str) -> storage::Result<ByteReader> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.read_hook {
            hook(path);
        }
        if let Some(err) = take_fault(&self.read_faults, path) {
            return Err(err);
        }

        let content = self
            .content(path)
            .ok_or_else(|| StorageError::NotFoundError(path.to_string()))?;
        Ok(Box::pin(std::io::Cursor::new(content)))
    }

    async fn write(&self, path: &str, mut data: ByteReader) -> storage::Result<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = take_fault(&self.write_faults, path) {
            return Err(err);
        }

        let mut buffer = Vec::new();
        data.read_to_end(&mut buffer)
            .await
            .map_err(|e| StorageError::TransferError(e.to_string()))?;
        let size = buffer.len() as u64;
        self.insert(path, &buffer, self.write_time.unwrap_or_else(now_secs));
        Ok(size)
    }

    async fn delete(&self, path: &str) -> storage::Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

pub fn provider(storage: &Arc<MemoryStorage>) -> Arc<dyn StorageProvider> {
    storage.clone() as Arc<dyn StorageProvider>
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn set_mtime(path: &Path, secs: i64) {
    let time = UNIX_EPOCH + Duration::from_secs(secs as u64);
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
