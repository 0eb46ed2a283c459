//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务级的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `scrape_orchestrator` - 抓取编排器
//! - 逐页拉取数据源记录
//! - 归一化后逐页写入数据集
//! - 达到上限 / 数据源耗尽 / 取消 / 失败时停止
//!
//! ### `send_orchestrator` - 发送编排器
//! - 备份数据集并筛选待发送记录
//! - 控制并发数量（Semaphore）
//! - 委托 `RecipientFlow` 处理单条记录
//!
//! ### `campaign_machine` - 活动状态机
//! - 维护每个活动的阶段
//! - 同一活动同一时间只允许一个抓取或发送
//!
//! ## 层次关系
//!
//! ```text
//! campaign_machine (阶段与互斥)
//!     ↓
//! scrape_orchestrator / send_orchestrator (处理一个活动)
//!     ↓
//! workflow::RecipientFlow (处理单条记录)
//!     ↓
//! services (能力层：normalizer / retry)
//!     ↓
//! infrastructure (基础设施：DatasetStore)
//! ```

pub mod campaign_machine;
pub mod scrape_orchestrator;
pub mod send_orchestrator;

// 重新导出主要类型
pub use campaign_machine::{CampaignStateMachine, OperationGuard};
pub use scrape_orchestrator::{ScrapeOrchestrator, ScrapeRequest};
pub use send_orchestrator::{SendOptions, SendOrchestrator};
