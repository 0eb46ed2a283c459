//! 外部能力客户端
//!
//! 数据源和邮件网关都是不可靠的网络依赖，编排层只通过这里的 trait 使用它们，
//! 测试中可以替换为内存实现。

pub mod mail_client;
pub mod outscraper_client;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{ProviderError, TransportError};
use crate::models::template::RenderedEmail;

pub use mail_client::HttpMailClient;
pub use outscraper_client::OutscraperClient;

/// 一次分页请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub business_type: String,
    pub location: String,
    pub max_per_page: usize,
    /// 第一页为 `None`
    pub page_token: Option<String>,
}

/// 数据源返回的一页原始记录
#[derive(Debug, Clone, Default)]
pub struct ProviderPage {
    pub records: Vec<JsonValue>,
    /// 没有更多页时为 `None`
    pub next_page_token: Option<String>,
}

/// 商业数据源能力
#[async_trait]
pub trait LeadProvider: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<ProviderPage, ProviderError>;
}

/// 邮件发送能力
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, to_address: &str, email: &RenderedEmail) -> Result<(), TransportError>;
}
