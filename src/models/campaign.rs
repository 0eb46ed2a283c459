use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::error::ValidationError;

/// 活动生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStage {
    New,
    Scraping,
    Ready,
    Empty,
    Sending,
    Sent,
    Partial,
}

impl CampaignStage {
    /// 是否有抓取或发送正在进行
    pub fn is_busy(self) -> bool {
        matches!(self, CampaignStage::Scraping | CampaignStage::Sending)
    }

    /// 合法的阶段转换
    ///
    /// `Ready`/`Empty` 允许再次抓取（追加合并到同一个数据集），
    /// `Partial -> Sending` 是唯一的"回退"。
    pub fn can_transition_to(self, next: CampaignStage) -> bool {
        use CampaignStage::*;
        matches!(
            (self, next),
            (New, Scraping)
                | (Ready, Scraping)
                | (Empty, Scraping)
                | (Scraping, Ready)
                | (Scraping, Empty)
                | (Ready, Sending)
                | (Partial, Sending)
                | (Sending, Sent)
                | (Sending, Partial)
        )
    }
}

impl fmt::Display for CampaignStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CampaignStage::New => "NEW",
            CampaignStage::Scraping => "SCRAPING",
            CampaignStage::Ready => "READY",
            CampaignStage::Empty => "EMPTY",
            CampaignStage::Sending => "SENDING",
            CampaignStage::Sent => "SENT",
            CampaignStage::Partial => "PARTIAL",
        };
        f.write_str(s)
    }
}

/// 营销活动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub stage: CampaignStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            stage: CampaignStage::New,
            business_type: None,
            location: None,
            max_results: None,
            created_at: now,
            updated_at: now,
        }
    }
}

fn campaign_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("valid campaign id regex"))
}

/// 校验活动 ID
///
/// 活动 ID 直接用作目录名，只允许字母、数字、下划线和连字符。
pub fn validate_campaign_id(id: &str) -> Result<(), ValidationError> {
    if campaign_id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCampaignId { id: id.to_string() })
    }
}
