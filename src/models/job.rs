//! 抓取任务与发送任务的结果模型
//!
//! 所有任务级操作都返回结构化结果，即使提前停止也会带上计数。

use serde::Serialize;

use crate::models::lead::{Rejection, SendStatus};

/// 抓取任务停止的原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// 已达到最大结果数
    CapReached,
    /// 数据源没有更多页
    Exhausted,
    /// 部分成功：中途某页重试耗尽，已收集的数据全部保留
    Partial { error: String },
    /// 被调用方取消
    Cancelled,
}

/// 被拒绝的原始记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    /// 所在页（从 1 开始）
    pub page: usize,
    /// 页内序号（从 0 开始）
    pub index: usize,
    pub reason: Rejection,
}

/// 一次抓取任务
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeJob {
    pub campaign_id: String,
    pub requested_max: usize,
    pub pages_fetched: usize,
    /// 本次任务新增的去重后记录数
    pub unique_collected: usize,
    pub duplicates_skipped: usize,
    pub rejected: Vec<RejectedRecord>,
    pub stop_reason: Option<StopReason>,
    pub terminal: bool,
}

impl ScrapeJob {
    pub fn new(campaign_id: impl Into<String>, requested_max: usize) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            requested_max,
            pages_fetched: 0,
            unique_collected: 0,
            duplicates_skipped: 0,
            rejected: Vec::new(),
            stop_reason: None,
            terminal: false,
        }
    }

    pub fn remaining_capacity(&self) -> usize {
        self.requested_max.saturating_sub(self.unique_collected)
    }

    pub fn finish(&mut self, reason: StopReason) {
        self.stop_reason = Some(reason);
        self.terminal = true;
    }

    /// 是否为"部分成功"（有数据但提前停止）
    pub fn is_partial(&self) -> bool {
        matches!(self.stop_reason, Some(StopReason::Partial { .. }))
    }
}

/// 单条记录的发送结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub email: String,
    pub status: SendStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 邮件已送达但状态没能写回数据集，下次运行前需要人工核对
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unpersisted: bool,
}

/// 一次发送任务
#[derive(Debug, Clone, Serialize)]
pub struct SendJob {
    pub campaign_id: String,
    /// 模板引用（主题行）
    pub template: String,
    /// 按数据集顺序排列
    pub outcomes: Vec<RecordOutcome>,
    pub sent: usize,
    pub failed: usize,
    /// 不在本次发送范围内的记录（已发送/已跳过/校验失败）
    pub skipped: usize,
    /// 已送达但状态没能写回的记录数（也计入 `sent`）
    pub unpersisted: usize,
    /// 任务结束后仍为 pending/failed 的记录数
    pub remaining: usize,
    pub cancelled: bool,
}

impl SendJob {
    pub fn new(campaign_id: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            template: template.into(),
            outcomes: Vec::new(),
            sent: 0,
            failed: 0,
            skipped: 0,
            unpersisted: 0,
            remaining: 0,
            cancelled: false,
        }
    }

    pub fn record(&mut self, outcome: RecordOutcome) {
        match outcome.status {
            SendStatus::Sent => self.sent += 1,
            SendStatus::Failed => self.failed += 1,
            SendStatus::Skipped => self.skipped += 1,
            SendStatus::Pending => {}
        }
        if outcome.unpersisted {
            self.unpersisted += 1;
        }
        self.outcomes.push(outcome);
    }

    /// 所有记录都已终结（没有 pending/failed）
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}
