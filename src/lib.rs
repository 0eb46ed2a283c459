//! # Leadflow
//!
//! 按活动抓取商家线索并批量发送邮件的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有磁盘上的活动数据，只暴露能力
//! - `DatasetStore` - 每个活动一个 CSV，原子写入、去重追加、备份恢复
//! - `LockTable` - 同一活动的写入者串行
//!
//! ### ② 外部客户端（Clients）
//! - `clients/` - `LeadProvider` / `MailTransport` 两个能力 trait
//! - `OutscraperClient` - 商家数据源
//! - `HttpMailClient` - HTTP 邮件网关
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 不依赖网络的纯能力
//! - `normalizer` - 原始记录 → `LeadRecord`
//! - `retry` - 重试策略（退避、抖动、单次超时）
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一条记录"的完整发送流程
//! - `RecipientCtx` - 上下文封装（campaign_id + 序号）
//! - `RecipientFlow` - 校验 → 渲染 → 发送 → 回写
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/scrape_orchestrator` - 逐页抓取并落盘
//! - `orchestrator/send_orchestrator` - 并发发送
//! - `orchestrator/campaign_machine` - 活动阶段与互斥
//!
//! ## 模块结构

pub mod app;
pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::DatasetStore;
pub use models::{Campaign, CampaignStage, EmailTemplate, LeadRecord, ScrapeJob, SendJob, SendStatus};
pub use orchestrator::{CampaignStateMachine, ScrapeRequest, SendOptions};
pub use utils::CancelFlag;
