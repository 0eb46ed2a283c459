//! 活动数据集存储 - 基础设施层
//!
//! 每个活动一个目录：
//!
//! ```text
//! <data_dir>/<campaign_id>/
//!     leads.csv       主数据集
//!     leads.csv.bak   备份（0 或 1 个）
//!     campaign.toml   活动元数据
//!     .owner.lock     抓取/发送/恢复进行中时存在
//!     .write.lock     单次写入进行中时存在
//! ```
//!
//! 所有写操作都先写临时文件再原子替换，读者永远看不到写了一半的文件。
//! 同一活动的写入者通过 [`LockTable`] 串行，跨进程也一样。

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{AppResult, StorageError};
use crate::infrastructure::lock_table::LockTable;
use crate::infrastructure::owner_file::OwnerFile;
use crate::models::campaign::{validate_campaign_id, Campaign};
use crate::models::lead::{normalize_email, Dataset, LeadRecord, Rejection, SendStatus, StatusUpdate};
use crate::services::normalizer::{self, is_valid_email};

const DATASET_FILE: &str = "leads.csv";
const BACKUP_FILE: &str = "leads.csv.bak";
const META_FILE: &str = "campaign.toml";
const OWNER_FILE: &str = ".owner.lock";

/// CSV 表头，与 `LeadRecord` 的字段顺序一致
const HEADER: [&str; 6] = ["name", "email", "source_id", "status", "last_error", "attempts"];
const REQUIRED_COLUMNS: [&str; 2] = ["name", "email"];

/// 追加结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AppendResult {
    pub added: usize,
    pub duplicates_skipped: usize,
}

/// 导入外部 CSV 的结果
#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub rows: usize,
    pub added: usize,
    pub duplicates_skipped: usize,
    /// (行号, 原因)，行号从 1 开始，不含表头
    pub rejected: Vec<(usize, Rejection)>,
}

/// 从备份恢复的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestoreResult {
    pub total: usize,
    pub kept_sent: usize,
}

impl RestoreResult {
    /// 恢复后还有没发出去的记录
    pub fn has_unsent(&self) -> bool {
        self.kept_sent < self.total
    }
}

/// 数据集校验报告
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub campaign_id: String,
    pub total_rows: usize,
    pub valid_emails: usize,
    pub status_counts: BTreeMap<String, usize>,
    pub columns: Vec<String>,
    pub sample: Vec<LeadRecord>,
    pub has_backup: bool,
}

/// 活动数据集存储
///
/// 进程启动时创建一次，以引用（`Arc`）传给两个编排器。
#[derive(Debug)]
pub struct DatasetStore {
    root: PathBuf,
    locks: LockTable,
}

impl DatasetStore {
    pub fn new(root: impl Into<PathBuf>, lock_wait: Duration) -> Self {
        let root = root.into();
        Self {
            locks: LockTable::new(root.clone(), lock_wait),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn campaign_dir(&self, campaign_id: &str) -> PathBuf {
        self.root.join(campaign_id)
    }

    fn dataset_path(&self, campaign_id: &str) -> PathBuf {
        self.campaign_dir(campaign_id).join(DATASET_FILE)
    }

    fn backup_path(&self, campaign_id: &str) -> PathBuf {
        self.campaign_dir(campaign_id).join(BACKUP_FILE)
    }

    fn meta_path(&self, campaign_id: &str) -> PathBuf {
        self.campaign_dir(campaign_id).join(META_FILE)
    }

    fn owner_path(&self, campaign_id: &str) -> PathBuf {
        self.campaign_dir(campaign_id).join(OWNER_FILE)
    }

    /// 占用活动（跨进程），已被其他操作占用时返回 `None`
    pub fn claim_owner(&self, campaign_id: &str, purpose: &str) -> AppResult<Option<OwnerFile>> {
        validate_campaign_id(campaign_id)?;
        Ok(OwnerFile::try_acquire(&self.owner_path(campaign_id), purpose)?)
    }

    /// 活动是否正被某个存活的进程占用
    pub fn owner_held(&self, campaign_id: &str) -> bool {
        OwnerFile::is_held(&self.owner_path(campaign_id))
    }

    /// 创建活动目录（已存在则直接返回）
    pub fn create_campaign_folder(&self, campaign_id: &str) -> AppResult<PathBuf> {
        validate_campaign_id(campaign_id)?;
        let dir = self.campaign_dir(campaign_id);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        Ok(dir)
    }

    /// 列出所有活动目录（按名称排序）
    pub fn list_campaigns(&self) -> AppResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        let mut campaigns = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.root, e))?;
            if entry.path().is_dir() {
                campaigns.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        campaigns.sort();
        Ok(campaigns)
    }

    /// 追加记录，按归一化邮箱去重（先到先得）
    pub async fn append(&self, campaign_id: &str, records: Vec<LeadRecord>) -> AppResult<AppendResult> {
        self.append_limited(campaign_id, records, None).await
    }

    /// 同 [`append`](Self::append)，但最多新增 `limit` 条，超出部分直接丢弃
    pub async fn append_limited(
        &self,
        campaign_id: &str,
        records: Vec<LeadRecord>,
        limit: Option<usize>,
    ) -> AppResult<AppendResult> {
        validate_campaign_id(campaign_id)?;
        let _guard = self.locks.acquire(campaign_id).await?;

        let path = self.dataset_path(campaign_id);
        let mut dataset = if path.exists() {
            read_dataset(&path)?.1
        } else {
            Vec::new()
        };

        let mut seen: HashSet<String> = dataset.iter().map(LeadRecord::dedup_key).collect();
        let mut result = AppendResult::default();

        for record in records {
            if limit.is_some_and(|max| result.added >= max) {
                break;
            }
            if seen.insert(record.dedup_key()) {
                dataset.push(record);
                result.added += 1;
            } else {
                result.duplicates_skipped += 1;
            }
        }

        if result.added > 0 {
            self.create_campaign_folder(campaign_id)?;
            write_dataset_atomic(&path, &dataset)?;
        }

        debug!(
            "活动 {} 追加完成: 新增 {}, 重复 {}, 总计 {}",
            campaign_id,
            result.added,
            result.duplicates_skipped,
            dataset.len()
        );

        Ok(result)
    }

    /// 是否已有数据文件
    pub fn has_dataset(&self, campaign_id: &str) -> bool {
        self.dataset_path(campaign_id).exists()
    }

    /// 读取活动的数据集
    pub async fn load(&self, campaign_id: &str) -> AppResult<Dataset> {
        validate_campaign_id(campaign_id)?;
        let path = self.dataset_path(campaign_id);
        if !path.exists() {
            return Err(StorageError::NotFound {
                campaign_id: campaign_id.to_string(),
            }
            .into());
        }
        Ok(read_dataset(&path)?.1)
    }

    /// 数据集记录数，没有数据文件时为 0
    pub async fn count(&self, campaign_id: &str) -> AppResult<usize> {
        match self.load(campaign_id).await {
            Ok(dataset) => Ok(dataset.len()),
            Err(crate::error::AppError::Storage(StorageError::NotFound { .. })) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// 更新单条记录的发送状态（幂等）
    pub async fn update_status(&self, campaign_id: &str, email: &str, update: StatusUpdate) -> AppResult<()> {
        validate_campaign_id(campaign_id)?;
        let _guard = self.locks.acquire(campaign_id).await?;

        let path = self.dataset_path(campaign_id);
        if !path.exists() {
            return Err(StorageError::NotFound {
                campaign_id: campaign_id.to_string(),
            }
            .into());
        }

        let mut dataset = read_dataset(&path)?.1;
        let key = normalize_email(email);
        let record = dataset
            .iter_mut()
            .find(|r| r.dedup_key() == key)
            .ok_or_else(|| StorageError::RecordNotFound {
                campaign_id: campaign_id.to_string(),
                email: email.to_string(),
            })?;

        if record.status == update.status && record.last_error == update.error && record.attempts == update.attempts {
            return Ok(());
        }

        record.status = update.status;
        record.last_error = update.error;
        record.attempts = update.attempts;

        write_dataset_atomic(&path, &dataset)?;
        Ok(())
    }

    /// 在破坏性重写之前给主数据集做快照
    pub async fn backup(&self, campaign_id: &str) -> AppResult<()> {
        validate_campaign_id(campaign_id)?;
        let _guard = self.locks.acquire(campaign_id).await?;

        let primary = self.dataset_path(campaign_id);
        if !primary.exists() {
            return Err(StorageError::NotFound {
                campaign_id: campaign_id.to_string(),
            }
            .into());
        }

        copy_atomic(&primary, &self.backup_path(campaign_id))?;
        info!("💾 活动 {} 数据集已备份", campaign_id);
        Ok(())
    }

    /// 用备份替换主数据集
    ///
    /// 备份是发送前的快照。主数据集里已经标记为 `sent` 的记录在恢复后仍然是 `sent`，
    /// 邮件已经发出去了，不能因为恢复再发一遍。返回恢复后的记录数和其中已发送的条数。
    pub async fn restore_backup(&self, campaign_id: &str) -> AppResult<RestoreResult> {
        validate_campaign_id(campaign_id)?;
        let _guard = self.locks.acquire(campaign_id).await?;

        let backup = self.backup_path(campaign_id);
        if !backup.exists() {
            return Err(StorageError::BackupMissing {
                campaign_id: campaign_id.to_string(),
            }
            .into());
        }

        // 备份本身必须可读
        let mut dataset = read_dataset(&backup)?.1;

        let primary = self.dataset_path(campaign_id);
        let delivered: HashMap<String, LeadRecord> = match primary.exists().then(|| read_dataset(&primary)) {
            Some(Ok((_, current))) => current
                .into_iter()
                .filter(|r| r.status == SendStatus::Sent)
                .map(|r| (r.dedup_key(), r))
                .collect(),
            Some(Err(e)) => {
                warn!("⚠️ 活动 {} 主数据集不可读, 直接使用备份: {}", campaign_id, e);
                HashMap::new()
            }
            None => HashMap::new(),
        };

        let mut result = RestoreResult {
            total: dataset.len(),
            kept_sent: 0,
        };
        for record in dataset.iter_mut() {
            if let Some(sent) = delivered.get(&record.dedup_key()) {
                record.status = SendStatus::Sent;
                record.last_error = None;
                record.attempts = sent.attempts;
            }
            if record.status == SendStatus::Sent {
                result.kept_sent += 1;
            }
        }

        write_dataset_atomic(&primary, &dataset)?;
        info!(
            "♻️ 活动 {} 已从备份恢复: {} 条, 其中已发送 {} 条",
            campaign_id, result.total, result.kept_sent
        );
        Ok(result)
    }

    /// 校验数据集并返回统计信息
    pub async fn validate(&self, campaign_id: &str) -> AppResult<DatasetReport> {
        validate_campaign_id(campaign_id)?;
        let path = self.dataset_path(campaign_id);
        if !path.exists() {
            return Err(StorageError::NotFound {
                campaign_id: campaign_id.to_string(),
            }
            .into());
        }

        let (columns, dataset) = read_dataset(&path)?;
        let mut status_counts = BTreeMap::new();
        for record in &dataset {
            *status_counts.entry(record.status.to_string()).or_insert(0) += 1;
        }

        Ok(DatasetReport {
            campaign_id: campaign_id.to_string(),
            total_rows: dataset.len(),
            valid_emails: dataset.iter().filter(|r| is_valid_email(&r.email)).count(),
            status_counts,
            columns,
            sample: dataset.iter().take(3).cloned().collect(),
            has_backup: self.backup_path(campaign_id).exists(),
        })
    }

    /// 导入数据源导出的 CSV（列名 `name` + `email_1` 或 `email`）
    pub async fn import_csv(&self, campaign_id: &str, csv_path: &Path) -> AppResult<ImportResult> {
        validate_campaign_id(campaign_id)?;

        let mut reader = csv::Reader::from_path(csv_path).map_err(|e| StorageError::csv(csv_path, e))?;
        let headers = reader.headers().map_err(|e| StorageError::csv(csv_path, e))?.clone();

        let has_name = headers.iter().any(|h| h.trim().eq_ignore_ascii_case("name"));
        let has_email = headers
            .iter()
            .any(|h| matches!(h.trim().to_ascii_lowercase().as_str(), "email" | "email_1"));
        if !has_name || !has_email {
            let mut columns = Vec::new();
            if !has_name {
                columns.push("name".to_string());
            }
            if !has_email {
                columns.push("email".to_string());
            }
            return Err(StorageError::MissingColumns {
                path: csv_path.to_path_buf(),
                columns,
            }
            .into());
        }

        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| StorageError::csv(csv_path, e))?;
            let map: Map<String, JsonValue> = headers
                .iter()
                .zip(row.iter())
                .map(|(h, v)| (h.to_string(), JsonValue::String(v.to_string())))
                .collect();
            rows.push(JsonValue::Object(map));
        }

        let batch = normalizer::normalize_batch(&rows);
        let appended = self.append(campaign_id, batch.leads).await?;

        info!(
            "📥 活动 {} 导入 {} 行: 新增 {}, 重复 {}, 拒绝 {}",
            campaign_id,
            rows.len(),
            appended.added,
            appended.duplicates_skipped,
            batch.rejections.len()
        );

        Ok(ImportResult {
            rows: rows.len(),
            added: appended.added,
            duplicates_skipped: appended.duplicates_skipped,
            rejected: batch.rejections.iter().map(|&(i, r)| (i + 1, r)).collect(),
        })
    }

    /// 保存活动元数据
    pub fn save_campaign(&self, campaign: &Campaign) -> AppResult<()> {
        self.create_campaign_folder(&campaign.id)?;
        let path = self.meta_path(&campaign.id);
        let content = toml::to_string(campaign).map_err(|e| StorageError::Meta {
            path: path.clone(),
            message: e.to_string(),
        })?;
        write_bytes_atomic(&path, content.as_bytes())?;
        Ok(())
    }

    /// 读取活动元数据，不存在时返回 `None`
    pub fn load_campaign(&self, campaign_id: &str) -> AppResult<Option<Campaign>> {
        validate_campaign_id(campaign_id)?;
        let path = self.meta_path(campaign_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(|e| StorageError::io(&path, e))?;
        let campaign = toml::from_str(&content).map_err(|e| StorageError::Meta {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(Some(campaign))
    }
}

// ========== 文件读写辅助函数 ==========

/// 读取 CSV 数据集，返回 (表头, 记录)
fn read_dataset(path: &Path) -> Result<(Vec<String>, Dataset), StorageError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| StorageError::csv(path, e))?;
    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| StorageError::csv(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !columns.iter().any(|c| c == *required))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(StorageError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing,
        });
    }

    let mut dataset = Vec::new();
    for record in reader.deserialize::<LeadRecord>() {
        dataset.push(record.map_err(|e| StorageError::csv(path, e))?);
    }
    Ok((columns, dataset))
}

/// 写临时文件后原子替换目标文件
fn write_dataset_atomic(path: &Path, dataset: &[LeadRecord]) -> Result<(), StorageError> {
    let dir = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;

    {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(&mut tmp);
        writer.write_record(HEADER).map_err(|e| StorageError::csv(path, e))?;
        for record in dataset {
            writer.serialize(record).map_err(|e| StorageError::csv(path, e))?;
        }
        writer.flush().map_err(|e| StorageError::io(path, e))?;
    }

    persist(tmp, path)
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| StorageError::io(path, e))?;
    persist(tmp, path)
}

fn copy_atomic(from: &Path, to: &Path) -> Result<(), StorageError> {
    let bytes = fs::read(from).map_err(|e| StorageError::io(from, e))?;
    write_bytes_atomic(to, &bytes)
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<(), StorageError> {
    tmp.as_file().sync_all().map_err(|e| StorageError::io(path, e))?;
    tmp.persist(path).map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}
