//! 活动写锁表 - 基础设施层
//!
//! 每个活动 ID 对应一把互斥锁：同一活动的写入者串行，不同活动互不影响。
//! 进程内先拿异步互斥锁，再拿活动目录下的写锁文件，其他进程的写入者也会被挡住。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::debug;

use crate::error::StorageError;
use crate::infrastructure::owner_file::OwnerFile;

const WRITE_LOCK_FILE: &str = ".write.lock";
const FILE_POLL_INTERVAL: Duration = Duration::from_millis(20);

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// 持有期间独占某个活动的写权限，drop 时释放
#[derive(Debug)]
pub struct WriteGuard {
    campaign_id: String,
    locks: LockMap,
    local: Option<OwnedMutexGuard<()>>,
    file: Option<OwnerFile>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.file.take();
        self.local.take();

        // 没有其他人持有或等待时移除表项
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.campaign_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.campaign_id);
        }
    }
}

#[derive(Debug)]
pub struct LockTable {
    root: PathBuf,
    locks: LockMap,
    wait: Duration,
}

impl LockTable {
    /// `wait` 为等待锁的最长时间，超过后返回 `Busy`
    pub fn new(root: impl Into<PathBuf>, wait: Duration) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
            wait,
        }
    }

    pub async fn acquire(&self, campaign_id: &str) -> Result<WriteGuard, StorageError> {
        let deadline = Instant::now() + self.wait;
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(campaign_id.to_string()).or_default().clone()
        };

        let mut guard = WriteGuard {
            campaign_id: campaign_id.to_string(),
            locks: self.locks.clone(),
            local: None,
            file: None,
        };

        match timeout_at(deadline, lock.lock_owned()).await {
            Ok(local) => guard.local = Some(local),
            Err(_) => {
                debug!("活动 {} 写锁等待超时 ({:?})", campaign_id, self.wait);
                return Err(busy(campaign_id));
            }
        }

        let path = self.root.join(campaign_id).join(WRITE_LOCK_FILE);
        loop {
            if let Some(file) = OwnerFile::try_acquire(&path, "write")? {
                guard.file = Some(file);
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                debug!("活动 {} 的写锁文件被其他进程持有 ({:?})", campaign_id, self.wait);
                return Err(busy(campaign_id));
            }
            sleep(FILE_POLL_INTERVAL).await;
        }
    }
}

fn busy(campaign_id: &str) -> StorageError {
    StorageError::Busy {
        campaign_id: campaign_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table(dir: &TempDir) -> LockTable {
        LockTable::new(dir.path(), Duration::from_millis(60))
    }

    #[tokio::test]
    async fn test_same_campaign_second_writer_gets_busy() {
        let dir = TempDir::new().unwrap();
        let table = table(&dir);
        let _held = table.acquire("c1").await.unwrap();

        let second = table.acquire("c1").await;
        assert!(matches!(second, Err(StorageError::Busy { .. })));
    }

    #[tokio::test]
    async fn test_different_campaigns_do_not_contend() {
        let dir = TempDir::new().unwrap();
        let table = table(&dir);
        let _a = table.acquire("a").await.unwrap();
        assert!(table.acquire("b").await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_is_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let table = table(&dir);
        {
            let _held = table.acquire("c1").await.unwrap();
        }
        assert!(table.acquire("c1").await.is_ok());
        assert!(!dir.path().join("c1").join(WRITE_LOCK_FILE).exists());
    }

    #[tokio::test]
    async fn test_tables_sharing_a_directory_exclude_each_other() {
        let dir = TempDir::new().unwrap();
        let first = table(&dir);
        let second = table(&dir);

        let held = first.acquire("c1").await.unwrap();
        assert!(matches!(second.acquire("c1").await, Err(StorageError::Busy { .. })));

        drop(held);
        assert!(second.acquire("c1").await.is_ok());
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let dir = TempDir::new().unwrap();
        let table = table(&dir);
        for id in ["a", "b", "c"] {
            let _guard = table.acquire(id).await.unwrap();
        }
        assert!(table.locks.lock().unwrap().is_empty());

        let _held = table.acquire("a").await.unwrap();
        assert_eq!(table.locks.lock().unwrap().len(), 1);
    }
}
