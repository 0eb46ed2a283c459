//! 活动状态机 - 编排层
//!
//! 记录每个活动所处的阶段，并保证同一活动同一时间只有一个抓取或发送在进行。
//!
//! ```text
//! NEW ──scrape──▶ SCRAPING ──▶ READY ──send──▶ SENDING ──▶ SENT
//!                     │          ▲                 │
//!                     ▼          │scrape           ▼
//!                   EMPTY ───────┘              PARTIAL ──send──▶ SENDING
//! ```
//!
//! `begin_*` 原子地检查并切换阶段，返回 [`OperationGuard`]。
//! 守卫在任何退出路径上都会释放活动：正常结束调用 `finish`，
//! 提前 drop（错误、panic、任务被取消）时回落到兜底阶段。
//!
//! 互斥不只在进程内：守卫同时持有活动目录下的占用文件，
//! 另一个进程（另一次命令行调用）对同一活动的抓取、发送或恢复会得到 `ConflictingOperation`。
//! 磁盘上的 `SCRAPING`/`SENDING` 只有在没有存活进程占用时才按中断处理。

use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::error::{AppResult, CampaignError, ValidationError};
use crate::infrastructure::{DatasetStore, ImportResult, OwnerFile};
use crate::models::campaign::{validate_campaign_id, Campaign, CampaignStage};
use crate::models::job::{ScrapeJob, SendJob};
use crate::models::template::EmailTemplate;
use crate::orchestrator::scrape_orchestrator::{ScrapeOrchestrator, ScrapeRequest};
use crate::orchestrator::send_orchestrator::SendOrchestrator;
use crate::utils::CancelFlag;

struct CampaignEntry {
    campaign: Campaign,
    /// 正在进行的操作的取消标记
    cancel: Option<CancelFlag>,
}

/// 活动状态机
pub struct CampaignStateMachine {
    store: Arc<DatasetStore>,
    entries: Mutex<HashMap<String, CampaignEntry>>,
}

impl CampaignStateMachine {
    pub fn new(store: Arc<DatasetStore>) -> Self {
        Self {
            store,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CampaignEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 创建活动（已存在则返回现有活动）
    pub fn create(&self, campaign_id: &str) -> AppResult<Campaign> {
        validate_campaign_id(campaign_id)?;
        let mut entries = self.entries();
        if let Some(entry) = entries.get(campaign_id).filter(|entry| entry.cancel.is_some()) {
            return Ok(entry.campaign.clone());
        }

        let campaign = match self.load_recovered(campaign_id, false)? {
            Some(existing) => existing,
            None => {
                let campaign = Campaign::new(campaign_id);
                self.store.save_campaign(&campaign)?;
                info!("📁 已创建活动 {}", campaign_id);
                campaign
            }
        };

        entries.insert(
            campaign_id.to_string(),
            CampaignEntry {
                campaign: campaign.clone(),
                cancel: None,
            },
        );
        Ok(campaign)
    }

    /// 查询活动
    ///
    /// 本进程没有在操作这个活动时以磁盘为准，其他进程可能刚改过阶段。
    pub fn get(&self, campaign_id: &str) -> AppResult<Campaign> {
        validate_campaign_id(campaign_id)?;
        let mut entries = self.entries();
        self.refresh(&mut entries, campaign_id)?;
        entries
            .get(campaign_id)
            .map(|entry| entry.campaign.clone())
            .ok_or_else(|| not_found(campaign_id))
    }

    /// 列出所有活动
    pub fn list(&self) -> AppResult<Vec<Campaign>> {
        let ids = self.store.list_campaigns()?;
        let mut campaigns = Vec::with_capacity(ids.len());
        for id in ids {
            if validate_campaign_id(&id).is_err() {
                debug!("忽略非活动目录: {}", id);
                continue;
            }
            match self.get(&id) {
                Ok(campaign) => campaigns.push(campaign),
                Err(e) => warn!("⚠️ 读取活动 {} 失败: {}", id, e),
            }
        }
        Ok(campaigns)
    }

    /// 开始抓取：`NEW`/`READY`/`EMPTY` → `SCRAPING`
    pub fn begin_scrape(self: &Arc<Self>, campaign_id: &str) -> AppResult<OperationGuard> {
        self.begin(campaign_id, CampaignStage::Scraping, CampaignStage::Ready)
    }

    /// 开始发送：`READY`/`PARTIAL` → `SENDING`
    pub fn begin_send(self: &Arc<Self>, campaign_id: &str) -> AppResult<OperationGuard> {
        self.begin(campaign_id, CampaignStage::Sending, CampaignStage::Partial)
    }

    fn begin(
        self: &Arc<Self>,
        campaign_id: &str,
        active: CampaignStage,
        fallback: CampaignStage,
    ) -> AppResult<OperationGuard> {
        validate_campaign_id(campaign_id)?;
        let mut entries = self.entries();
        self.refresh(&mut entries, campaign_id)?;
        let owner = self.claim(&mut entries, campaign_id, &active.to_string())?;
        let entry = entries.get_mut(campaign_id).ok_or_else(|| not_found(campaign_id))?;

        let from = entry.campaign.stage;
        if from.is_busy() {
            return Err(conflict(campaign_id, from));
        }
        if !from.can_transition_to(active) {
            return Err(CampaignError::IllegalTransition {
                campaign_id: campaign_id.to_string(),
                from,
                to: active,
            }
            .into());
        }

        let cancel = CancelFlag::new();
        entry.campaign.stage = active;
        entry.campaign.updated_at = Utc::now();
        entry.cancel = Some(cancel.clone());
        self.persist(&entry.campaign);

        info!("🔒 活动 {}: {} → {}", campaign_id, from, active);

        Ok(OperationGuard {
            machine: Arc::clone(self),
            campaign_id: campaign_id.to_string(),
            cancel,
            fallback,
            finished: false,
            owner: Some(owner),
        })
    }

    /// 占用活动：本进程没有进行中的操作，也没有其他存活的进程持有占用文件
    ///
    /// 占用成功后重新读取元数据，此时磁盘上残留的 `SCRAPING`/`SENDING` 一定是中断遗留。
    fn claim(
        &self,
        entries: &mut HashMap<String, CampaignEntry>,
        campaign_id: &str,
        purpose: &str,
    ) -> AppResult<OwnerFile> {
        if let Some(entry) = entries.get(campaign_id).filter(|entry| entry.cancel.is_some()) {
            return Err(conflict(campaign_id, entry.campaign.stage));
        }

        let Some(owner) = self.store.claim_owner(campaign_id, purpose)? else {
            let stage = entries
                .get(campaign_id)
                .map(|entry| entry.campaign.stage)
                .filter(|stage| stage.is_busy())
                .unwrap_or(CampaignStage::Scraping);
            warn!("⏳ 活动 {} 正被其他进程操作 ({}), 拒绝 {}", campaign_id, stage, purpose);
            return Err(conflict(campaign_id, stage));
        };

        let campaign = self
            .load_recovered(campaign_id, true)?
            .ok_or_else(|| not_found(campaign_id))?;
        entries.insert(
            campaign_id.to_string(),
            CampaignEntry { campaign, cancel: None },
        );
        Ok(owner)
    }

    /// 请求取消活动当前的操作，没有进行中的操作时返回 `false`
    pub fn cancel(&self, campaign_id: &str) -> bool {
        let entries = self.entries();
        match entries.get(campaign_id).and_then(|entry| entry.cancel.as_ref()) {
            Some(flag) => {
                flag.cancel();
                info!("🛑 已请求取消活动 {} 的当前操作", campaign_id);
                true
            }
            None => false,
        }
    }

    /// 守卫结束：写入最终阶段并清除取消标记
    fn release(&self, campaign_id: &str, stage: CampaignStage) {
        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(campaign_id) else {
            return;
        };

        let from = entry.campaign.stage;
        if from.can_transition_to(stage) {
            entry.campaign.stage = stage;
        } else {
            error!("❌ 活动 {} 非法的结束阶段 {} → {}, 保留兜底阶段", campaign_id, from, stage);
            entry.campaign.stage = match from {
                CampaignStage::Sending => CampaignStage::Partial,
                _ => CampaignStage::Ready,
            };
        }
        entry.campaign.updated_at = Utc::now();
        entry.cancel = None;
        self.persist(&entry.campaign);

        info!("🔓 活动 {}: {} → {}", campaign_id, from, entry.campaign.stage);
    }

    /// 执行抓取，并根据数据集记录数决定最终阶段
    pub async fn run_scrape(
        self: &Arc<Self>,
        orchestrator: &ScrapeOrchestrator,
        request: &ScrapeRequest,
    ) -> AppResult<ScrapeJob> {
        if request.max_results == 0 {
            return Err(ValidationError::InvalidMaxResults.into());
        }

        let guard = self.begin_scrape(&request.campaign_id)?;
        self.update_meta(&request.campaign_id, |campaign| {
            campaign.business_type = Some(request.business_type.clone());
            campaign.location = Some(request.location.clone());
            campaign.max_results = Some(request.max_results);
        });

        let result = orchestrator.run(request, guard.cancel_flag()).await;
        let stage = self.stage_after_collect(&request.campaign_id).await;
        guard.finish(stage);
        result
    }

    /// 导入外部 CSV，阶段流转与抓取相同
    pub async fn run_import(self: &Arc<Self>, campaign_id: &str, csv_path: &Path) -> AppResult<ImportResult> {
        let guard = self.begin_scrape(campaign_id)?;
        let result = self.store.import_csv(campaign_id, csv_path).await;
        let stage = self.stage_after_collect(campaign_id).await;
        guard.finish(stage);
        result
    }

    /// 执行发送
    ///
    /// 已经是 `SENT` 的活动不会重复发送，直接返回一个空任务。
    pub async fn run_send(
        self: &Arc<Self>,
        orchestrator: &SendOrchestrator,
        campaign_id: &str,
        template: &EmailTemplate,
    ) -> AppResult<SendJob> {
        if self.get(campaign_id)?.stage == CampaignStage::Sent {
            info!("✓ 活动 {} 已全部发送, 无需再次发送", campaign_id);
            let mut job = SendJob::new(campaign_id, template.subject.clone());
            job.skipped = self.store.count(campaign_id).await?;
            return Ok(job);
        }

        let guard = self.begin_send(campaign_id)?;
        let job = orchestrator.run(campaign_id, template, guard.cancel_flag()).await?;
        let stage = if job.is_complete() {
            CampaignStage::Sent
        } else {
            CampaignStage::Partial
        };
        guard.finish(stage);
        Ok(job)
    }

    /// 用备份覆盖主数据集
    ///
    /// 已发送的记录保持 `sent`。只有恢复后确实出现了未发送的记录，
    /// `SENT` 的活动才回到 `PARTIAL`。
    pub async fn run_restore(&self, campaign_id: &str) -> AppResult<Campaign> {
        validate_campaign_id(campaign_id)?;
        let owner = {
            let mut entries = self.entries();
            self.refresh(&mut entries, campaign_id)?;
            self.claim(&mut entries, campaign_id, "RESTORING")?
        };

        let restored = self.store.restore_backup(campaign_id).await?;

        let mut entries = self.entries();
        let entry = entries.get_mut(campaign_id).ok_or_else(|| not_found(campaign_id))?;
        if entry.campaign.stage == CampaignStage::Sent && restored.has_unsent() {
            entry.campaign.stage = CampaignStage::Partial;
            entry.campaign.updated_at = Utc::now();
            self.persist(&entry.campaign);
        }
        let campaign = entry.campaign.clone();
        drop(entries);
        drop(owner);
        Ok(campaign)
    }

    async fn stage_after_collect(&self, campaign_id: &str) -> CampaignStage {
        match self.store.count(campaign_id).await {
            Ok(0) => CampaignStage::Empty,
            Ok(_) => CampaignStage::Ready,
            Err(e) => {
                warn!("⚠️ 活动 {} 统计记录数失败: {}", campaign_id, e);
                if self.store.has_dataset(campaign_id) {
                    CampaignStage::Ready
                } else {
                    CampaignStage::Empty
                }
            }
        }
    }

    fn update_meta(&self, campaign_id: &str, apply: impl FnOnce(&mut Campaign)) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(campaign_id) {
            apply(&mut entry.campaign);
            entry.campaign.updated_at = Utc::now();
            self.persist(&entry.campaign);
        }
    }

    /// 本进程没有在操作该活动时，从磁盘重新加载
    fn refresh(&self, entries: &mut HashMap<String, CampaignEntry>, campaign_id: &str) -> AppResult<()> {
        if entries.get(campaign_id).is_some_and(|entry| entry.cancel.is_some()) {
            return Ok(());
        }
        let campaign = self
            .load_recovered(campaign_id, false)?
            .ok_or_else(|| not_found(campaign_id))?;
        entries.insert(
            campaign_id.to_string(),
            CampaignEntry { campaign, cancel: None },
        );
        Ok(())
    }

    /// 从磁盘加载活动元数据
    ///
    /// 没有存活进程占用（或占用者就是调用方，`owned`）时，`SCRAPING`/`SENDING` 属于中断遗留：
    /// `SCRAPING` 按数据文件是否存在恢复为 `READY`/`EMPTY`，`SENDING` 恢复为 `PARTIAL`。
    /// 只有数据文件没有元数据的目录（手工放入的 CSV）视为 `READY`。
    fn load_recovered(&self, campaign_id: &str, owned: bool) -> AppResult<Option<Campaign>> {
        let Some(mut campaign) = self.store.load_campaign(campaign_id)? else {
            if self.store.has_dataset(campaign_id) {
                let mut campaign = Campaign::new(campaign_id);
                campaign.stage = CampaignStage::Ready;
                self.persist(&campaign);
                return Ok(Some(campaign));
            }
            if self.store.campaign_dir(campaign_id).is_dir() {
                let campaign = Campaign::new(campaign_id);
                self.persist(&campaign);
                return Ok(Some(campaign));
            }
            return Ok(None);
        };

        if campaign.stage.is_busy() && !owned && self.store.owner_held(campaign_id) {
            debug!("活动 {} 正被其他进程操作 ({})", campaign_id, campaign.stage);
            return Ok(Some(campaign));
        }

        let recovered = match campaign.stage {
            CampaignStage::Scraping if self.store.has_dataset(campaign_id) => Some(CampaignStage::Ready),
            CampaignStage::Scraping => Some(CampaignStage::Empty),
            CampaignStage::Sending => Some(CampaignStage::Partial),
            _ => None,
        };
        if let Some(stage) = recovered {
            warn!("♻️ 活动 {} 上次停在 {}, 恢复为 {}", campaign_id, campaign.stage, stage);
            campaign.stage = stage;
            campaign.updated_at = Utc::now();
            self.persist(&campaign);
        }
        Ok(Some(campaign))
    }

    fn persist(&self, campaign: &Campaign) {
        if let Err(e) = self.store.save_campaign(campaign) {
            warn!("⚠️ 活动 {} 元数据保存失败: {}", campaign.id, e);
        }
    }
}

fn conflict(campaign_id: &str, stage: CampaignStage) -> crate::error::AppError {
    CampaignError::ConflictingOperation {
        campaign_id: campaign_id.to_string(),
        stage,
    }
    .into()
}

fn not_found(campaign_id: &str) -> crate::error::AppError {
    CampaignError::NotFound {
        campaign_id: campaign_id.to_string(),
    }
    .into()
}

/// 活动操作守卫
///
/// 持有期间活动处于 `SCRAPING`/`SENDING`；drop 时一定会释放活动。
/// 占用文件在最终阶段写入之后才删除。
pub struct OperationGuard {
    machine: Arc<CampaignStateMachine>,
    campaign_id: String,
    cancel: CancelFlag,
    fallback: CampaignStage,
    finished: bool,
    owner: Option<OwnerFile>,
}

impl OperationGuard {
    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// 以指定阶段结束操作
    pub fn finish(mut self, stage: CampaignStage) {
        self.finished = true;
        self.machine.release(&self.campaign_id, stage);
        self.owner.take();
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!("⚠️ 活动 {} 的操作未正常结束, 回落到 {}", self.campaign_id, self.fallback);
            self.machine.release(&self.campaign_id, self.fallback);
        }
        self.owner.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MailTransport;
    use crate::error::{AppError, TransportError};
    use crate::models::lead::{LeadRecord, SendStatus, StatusUpdate};
    use crate::models::template::RenderedEmail;
    use crate::orchestrator::send_orchestrator::SendOptions;
    use crate::services::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    fn machine(dir: &TempDir) -> (Arc<DatasetStore>, Arc<CampaignStateMachine>) {
        let store = Arc::new(DatasetStore::new(dir.path(), Duration::from_secs(1)));
        let machine = Arc::new(CampaignStateMachine::new(store.clone()));
        (store, machine)
    }

    #[test]
    fn test_second_operation_on_busy_campaign_conflicts() {
        let dir = TempDir::new().unwrap();
        let (_store, machine) = machine(&dir);
        machine.create("c1").unwrap();

        let _guard = machine.begin_scrape("c1").unwrap();
        let err = machine.begin_scrape("c1").err().unwrap();
        assert!(matches!(
            err,
            AppError::Campaign(CampaignError::ConflictingOperation {
                stage: CampaignStage::Scraping,
                ..
            })
        ));
        assert!(matches!(
            machine.begin_send("c1").err().unwrap(),
            AppError::Campaign(CampaignError::ConflictingOperation { .. })
        ));
    }

    #[test]
    fn test_send_from_new_is_illegal() {
        let dir = TempDir::new().unwrap();
        let (_store, machine) = machine(&dir);
        machine.create("c1").unwrap();

        let err = machine.begin_send("c1").err().unwrap();
        assert!(matches!(
            err,
            AppError::Campaign(CampaignError::IllegalTransition {
                from: CampaignStage::New,
                to: CampaignStage::Sending,
                ..
            })
        ));
    }

    #[test]
    fn test_dropped_guard_falls_back() {
        let dir = TempDir::new().unwrap();
        let (_store, machine) = machine(&dir);
        machine.create("c1").unwrap();

        drop(machine.begin_scrape("c1").unwrap());
        assert_eq!(machine.get("c1").unwrap().stage, CampaignStage::Ready);

        drop(machine.begin_send("c1").unwrap());
        assert_eq!(machine.get("c1").unwrap().stage, CampaignStage::Partial);
    }

    #[test]
    fn test_cancel_flags_active_operation_only() {
        let dir = TempDir::new().unwrap();
        let (_store, machine) = machine(&dir);
        machine.create("c1").unwrap();
        assert!(!machine.cancel("c1"));

        let guard = machine.begin_scrape("c1").unwrap();
        assert!(machine.cancel("c1"));
        assert!(guard.cancel_flag().is_cancelled());
        guard.finish(CampaignStage::Empty);
        assert!(!machine.cancel("c1"));
    }

    #[tokio::test]
    async fn test_interrupted_stages_recover_on_reload() {
        let dir = TempDir::new().unwrap();
        let (store, _machine) = machine(&dir);
        store.append("sending", vec![LeadRecord::new("A", "a@x.com")]).await.unwrap();

        let mut sending = Campaign::new("sending");
        sending.stage = CampaignStage::Sending;
        store.save_campaign(&sending).unwrap();
        let mut scraping = Campaign::new("scraping");
        scraping.stage = CampaignStage::Scraping;
        store.save_campaign(&scraping).unwrap();

        let fresh = Arc::new(CampaignStateMachine::new(store.clone()));
        assert_eq!(fresh.get("sending").unwrap().stage, CampaignStage::Partial);
        assert_eq!(fresh.get("scraping").unwrap().stage, CampaignStage::Empty);
        assert_eq!(
            store.load_campaign("sending").unwrap().unwrap().stage,
            CampaignStage::Partial
        );
    }

    #[tokio::test]
    async fn test_restore_does_not_reopen_delivered_records() {
        let dir = TempDir::new().unwrap();
        let (store, machine) = machine(&dir);
        store.append("c1", vec![LeadRecord::new("A", "a@x.com")]).await.unwrap();
        store.backup("c1").await.unwrap();
        store.update_status("c1", "a@x.com", StatusUpdate::sent(1)).await.unwrap();

        let mut sent = Campaign::new("c1");
        sent.stage = CampaignStage::Sent;
        store.save_campaign(&sent).unwrap();

        let restored = machine.run_restore("c1").await.unwrap();
        assert_eq!(restored.stage, CampaignStage::Sent);
        assert_eq!(store.load("c1").await.unwrap()[0].status, SendStatus::Sent);
    }

    #[tokio::test]
    async fn test_restore_during_operation_conflicts() {
        let dir = TempDir::new().unwrap();
        let (store, machine) = machine(&dir);
        store.append("c1", vec![LeadRecord::new("A", "a@x.com")]).await.unwrap();
        store.backup("c1").await.unwrap();
        machine.create("c1").unwrap();

        let _guard = machine.begin_scrape("c1").unwrap();
        assert!(matches!(
            machine.run_restore("c1").await.unwrap_err(),
            AppError::Campaign(CampaignError::ConflictingOperation { .. })
        ));
    }

    #[test]
    fn test_operation_in_another_machine_blocks_and_is_not_recovered() {
        let dir = TempDir::new().unwrap();
        let (_store, first) = machine(&dir);
        let (_other_store, second) = machine(&dir);
        first.create("c1").unwrap();

        let guard = first.begin_scrape("c1").unwrap();
        assert_eq!(second.get("c1").unwrap().stage, CampaignStage::Scraping);
        for err in [second.begin_scrape("c1").err().unwrap(), second.begin_send("c1").err().unwrap()] {
            assert!(matches!(
                err,
                AppError::Campaign(CampaignError::ConflictingOperation {
                    stage: CampaignStage::Scraping,
                    ..
                })
            ));
        }

        guard.finish(CampaignStage::Empty);
        assert_eq!(second.get("c1").unwrap().stage, CampaignStage::Empty);
        assert!(second.begin_scrape("c1").is_ok());
    }

    #[test]
    fn test_owner_file_is_removed_when_operation_ends() {
        let dir = TempDir::new().unwrap();
        let (store, machine) = machine(&dir);
        machine.create("c1").unwrap();
        let owner_file = store.campaign_dir("c1").join(".owner.lock");

        let guard = machine.begin_scrape("c1").unwrap();
        assert!(owner_file.exists());
        guard.finish(CampaignStage::Empty);
        assert!(!owner_file.exists());

        drop(machine.begin_scrape("c1").unwrap());
        assert!(!owner_file.exists());
    }

    /// 第一封送达后通过状态机请求取消
    struct CancelAfterFirst {
        machine: Arc<CampaignStateMachine>,
    }

    #[async_trait]
    impl MailTransport for CancelAfterFirst {
        async fn send(&self, _to_address: &str, _email: &RenderedEmail) -> Result<(), TransportError> {
            self.machine.cancel("c1");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_send_cancelled_mid_run_ends_partial() {
        let dir = TempDir::new().unwrap();
        let (store, machine) = machine(&dir);
        let leads = (0..3).map(|i| LeadRecord::new(format!("B{}", i), format!("b{}@x.com", i))).collect();
        store.append("c1", leads).await.unwrap();
        let mut ready = Campaign::new("c1");
        ready.stage = CampaignStage::Ready;
        store.save_campaign(&ready).unwrap();

        let transport = Arc::new(CancelAfterFirst {
            machine: machine.clone(),
        });
        let policy = RetryPolicy {
            max_attempts: 1,
            ..RetryPolicy::default()
        };
        let options = SendOptions {
            concurrency: 1,
            ..SendOptions::default()
        };
        let sender = SendOrchestrator::new(store.clone(), transport, policy, options);

        let job = machine
            .run_send(&sender, "c1", &EmailTemplate::new("Hi", "Hello"))
            .await
            .unwrap();

        assert!(job.cancelled);
        assert_eq!(job.sent, 1);
        assert_eq!(machine.get("c1").unwrap().stage, CampaignStage::Partial);
        let stored = store.load("c1").await.unwrap();
        assert_eq!(stored[0].status, SendStatus::Sent);
        assert!(stored[1..].iter().all(|lead| lead.status == SendStatus::Pending));
    }

    #[test]
    fn test_unknown_campaign_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (_store, machine) = machine(&dir);
        assert!(matches!(
            machine.get("ghost").unwrap_err(),
            AppError::Campaign(CampaignError::NotFound { .. })
        ));
    }
}
