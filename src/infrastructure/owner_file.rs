//! 跨进程占用文件 - 基础设施层
//!
//! 同一数据目录可能同时被多个 `leadflow` 进程使用，进程内的互斥锁管不到彼此。
//! 占用文件用 `create_new` 原子创建，内容记录持有者进程号；
//! 持有者进程已经退出的占用文件视为失效，下一个占用者会清理它。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::StorageError;

/// 刚创建还没写入内容的占用文件，超过这个时间仍读不出内容就视为失效
const UNREADABLE_GRACE: Duration = Duration::from_secs(10);

/// 占用文件内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub process_id: u32,
    pub purpose: String,
    pub acquired_at: DateTime<Utc>,
}

/// 持有期间独占，drop 时删除占用文件
#[derive(Debug)]
pub struct OwnerFile {
    path: PathBuf,
}

impl OwnerFile {
    /// 尝试占用，已被存活的进程占用时返回 `None`
    pub fn try_acquire(path: &Path, purpose: &str) -> Result<Option<Self>, StorageError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        }

        // 第二轮只在清理掉失效文件之后发生
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let owner = Self {
                        path: path.to_path_buf(),
                    };
                    let info = OwnerInfo {
                        process_id: std::process::id(),
                        purpose: purpose.to_string(),
                        acquired_at: Utc::now(),
                    };
                    let json = serde_json::to_string(&info).map_err(|e| StorageError::io(path, e.into()))?;
                    file.write_all(json.as_bytes()).map_err(|e| StorageError::io(path, e))?;
                    return Ok(Some(owner));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if holder_alive(path) != Some(false) {
                        return Ok(None);
                    }
                    warn!("♻️ 清理失效的占用文件 {}", path.display());
                    match fs::remove_file(path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(StorageError::io(path, e)),
                    }
                }
                Err(e) => return Err(StorageError::io(path, e)),
            }
        }
        Ok(None)
    }

    /// 是否被某个存活的进程占用
    pub fn is_held(path: &Path) -> bool {
        holder_alive(path) == Some(true)
    }

    /// 读取占用者信息
    pub fn holder(path: &Path) -> Option<OwnerInfo> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl Drop for OwnerFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("⚠️ 释放占用文件 {} 失败: {}", self.path.display(), e);
        }
    }
}

/// 文件不存在时为 `None`
fn holder_alive(path: &Path) -> Option<bool> {
    let modified = match fs::metadata(path) {
        Ok(meta) => meta.modified().ok(),
        Err(_) => return None,
    };

    match OwnerFile::holder(path) {
        Some(info) => Some(is_process_running(info.process_id)),
        None => {
            let age = modified.and_then(|m| m.elapsed().ok()).unwrap_or_default();
            debug!("占用文件 {} 暂时读不出内容 (已存在 {:?})", path.display(), age);
            Some(age < UNREADABLE_GRACE)
        }
    }
}

fn is_process_running(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }

    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        // 信号 0 只检查进程是否存在
        match signal::kill(Pid::from_raw(pid as i32), None::<Signal>) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(_) => true,
        }
    }

    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_owner_is_refused_until_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c1").join(".owner.lock");

        let first = OwnerFile::try_acquire(&path, "scraping").unwrap().unwrap();
        assert!(OwnerFile::is_held(&path));
        assert!(OwnerFile::try_acquire(&path, "sending").unwrap().is_none());
        assert_eq!(OwnerFile::holder(&path).unwrap().purpose, "scraping");

        drop(first);
        assert!(!path.exists());
        assert!(OwnerFile::try_acquire(&path, "sending").unwrap().is_some());
    }

    #[test]
    fn test_owner_file_of_exited_process_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".owner.lock");
        let stale = OwnerInfo {
            process_id: i32::MAX as u32,
            purpose: "sending".into(),
            acquired_at: Utc::now(),
        };
        fs::write(&path, serde_json::to_string(&stale).unwrap()).unwrap();

        assert!(!OwnerFile::is_held(&path));
        let owner = OwnerFile::try_acquire(&path, "scraping").unwrap();
        assert!(owner.is_some());
        assert_eq!(OwnerFile::holder(&path).unwrap().process_id, std::process::id());
    }

    #[test]
    fn test_freshly_created_empty_file_counts_as_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".owner.lock");
        fs::write(&path, "").unwrap();

        assert!(OwnerFile::is_held(&path));
        assert!(OwnerFile::try_acquire(&path, "scraping").unwrap().is_none());
    }
}
