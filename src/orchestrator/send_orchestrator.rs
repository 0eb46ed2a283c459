//! 发送编排器 - 编排层
//!
//! ## 职责
//!
//! 1. **加载与备份**：读取数据集，在任何状态回写之前先做快照
//! 2. **筛选**：只处理 `pending` / `failed` 的记录，可按单次上限截断
//! 3. **并发控制**：Semaphore 限制同时发送的数量
//! 4. **向下委托**：每条记录交给 [`RecipientFlow`] 处理
//! 5. **汇总**：按数据集顺序汇总每条记录的结果
//!
//! 取消在每条记录开始前检查，尚未开始的记录保持 `pending`。

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::clients::MailTransport;
use crate::error::AppResult;
use crate::infrastructure::DatasetStore;
use crate::models::job::{RecordOutcome, SendJob};
use crate::models::lead::{LeadRecord, SendStatus};
use crate::models::template::EmailTemplate;
use crate::services::retry::RetryPolicy;
use crate::utils::CancelFlag;
use crate::workflow::{RecipientCtx, RecipientFlow};

/// 发送控制参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOptions {
    /// 同时发送的邮件数量
    pub concurrency: usize,
    /// 单次运行最多发送多少封，`None` 表示不限制
    pub max_per_run: Option<usize>,
    /// 每个发送槽位在两封邮件之间的基础间隔，实际等待为 1~2 倍
    pub pacing: Duration,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_per_run: None,
            pacing: Duration::ZERO,
        }
    }
}

/// 发送编排器
pub struct SendOrchestrator {
    store: Arc<DatasetStore>,
    transport: Arc<dyn MailTransport>,
    retry: RetryPolicy,
    options: SendOptions,
}

impl SendOrchestrator {
    pub fn new(
        store: Arc<DatasetStore>,
        transport: Arc<dyn MailTransport>,
        retry: RetryPolicy,
        options: SendOptions,
    ) -> Self {
        Self {
            store,
            transport,
            retry,
            options,
        }
    }

    /// 执行一次发送任务
    pub async fn run(&self, campaign_id: &str, template: &EmailTemplate, cancel: &CancelFlag) -> AppResult<SendJob> {
        let dataset = self.store.load(campaign_id).await?;
        self.store.backup(campaign_id).await?;

        let total = dataset.len();
        let mut job = SendJob::new(campaign_id, template.subject.clone());

        let mut targets: Vec<(usize, LeadRecord)> = dataset
            .into_iter()
            .enumerate()
            .filter(|(_, lead)| lead.status.is_sendable())
            .collect();
        job.skipped = total - targets.len();

        if let Some(cap) = self.options.max_per_run {
            if targets.len() > cap {
                info!("📋 活动 {} 本次最多发送 {} 封, 其余 {} 封留待下次", campaign_id, cap, targets.len() - cap);
                targets.truncate(cap);
            }
        }

        info!(
            "✓ 活动 {} 共 {} 条记录, 本次待发送 {} 条 (并发 {})",
            campaign_id,
            total,
            targets.len(),
            self.options.concurrency
        );

        let flow = Arc::new(RecipientFlow::new(
            self.store.clone(),
            self.transport.clone(),
            self.retry.clone(),
            template.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut handles = Vec::new();

        for (idx, lead) in targets {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if cancel.is_cancelled() {
                info!("🛑 活动 {} 发送已取消, 未开始的记录保持 pending", campaign_id);
                break;
            }

            let flow = flow.clone();
            let pacing = self.options.pacing;
            let ctx = RecipientCtx::new(campaign_id, idx + 1, total);
            let email = lead.email.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = flow.run(&lead, &ctx).await;
                if matches!(&result, Ok(outcome) if outcome.status != SendStatus::Skipped) {
                    pace(pacing).await;
                }
                result
            });
            handles.push((idx, email, handle));
        }

        let (meta, tasks): (Vec<_>, Vec<_>) = handles
            .into_iter()
            .map(|(idx, email, handle)| ((idx, email), handle))
            .unzip();
        let results = futures::future::join_all(tasks).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for ((idx, email), joined) in meta.into_iter().zip(results) {
            let outcome = match joined {
                Ok(Ok(outcome)) => outcome,
                // 只有未送达（失败/跳过）时的回写错误会走到这里
                Ok(Err(e)) => {
                    error!("[活动 {}] ❌ {} 状态回写失败: {}", campaign_id, email, e);
                    RecordOutcome {
                        email,
                        status: SendStatus::Failed,
                        attempts: 0,
                        error: Some(e.to_string()),
                        unpersisted: false,
                    }
                }
                Err(e) => {
                    error!("[活动 {}] ❌ {} 任务执行失败: {}", campaign_id, email, e);
                    RecordOutcome {
                        email,
                        status: SendStatus::Failed,
                        attempts: 0,
                        error: Some(e.to_string()),
                        unpersisted: false,
                    }
                }
            };
            outcomes.push((idx, outcome));
        }

        outcomes.sort_by_key(|(idx, _)| *idx);
        for (_, outcome) in outcomes {
            job.record(outcome);
        }

        job.cancelled = cancel.is_cancelled();
        job.remaining = match self.store.load(campaign_id).await {
            Ok(dataset) => dataset.iter().filter(|lead| lead.status.is_sendable()).count(),
            Err(e) => {
                warn!("⚠️ 活动 {} 重新读取数据集失败, 按本次结果估算剩余: {}", campaign_id, e);
                (total - job.skipped).saturating_sub(job.sent)
            }
        };

        Ok(job)
    }
}

/// 两封邮件之间的等待，加入 0~100% 的随机抖动
async fn pace(base: Duration) {
    if base.is_zero() {
        return;
    }
    let base_ms = base.as_millis() as u64;
    let wait_ms = rand::rng().random_range(base_ms..=base_ms.saturating_mul(2));
    sleep(Duration::from_millis(wait_ms)).await;
}
