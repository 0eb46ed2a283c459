use serde::{Deserialize, Serialize};
use std::fmt;

/// 单条线索的发送状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    #[default]
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl SendStatus {
    /// 发送任务是否需要（再次）处理该记录
    pub fn is_sendable(self) -> bool {
        matches!(self, SendStatus::Pending | SendStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SendStatus::Pending => "pending",
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
            SendStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条潜在客户记录
///
/// 字段顺序即 CSV 列顺序，`name` 与 `email` 是必需列，
/// 其余列由编排层维护。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    #[serde(rename = "name")]
    pub business_name: String,
    pub email: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub status: SendStatus,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub attempts: u32,
}

impl LeadRecord {
    pub fn new(business_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            business_name: business_name.into(),
            email: email.into(),
            source_id: None,
            status: SendStatus::Pending,
            last_error: None,
            attempts: 0,
        }
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// 去重用的键
    pub fn dedup_key(&self) -> String {
        normalize_email(&self.email)
    }
}

/// 邮箱归一化：去掉首尾空白并转小写
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// 一个活动的数据集（有序，按归一化邮箱唯一）
pub type Dataset = Vec<LeadRecord>;

/// 记录被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    MissingName,
    MissingEmail,
    InvalidEmailFormat,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Rejection::MissingName => "missing_name",
            Rejection::MissingEmail => "missing_email",
            Rejection::InvalidEmailFormat => "invalid_email_format",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态回写内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: SendStatus,
    pub error: Option<String>,
    pub attempts: u32,
}

impl StatusUpdate {
    pub fn sent(attempts: u32) -> Self {
        Self {
            status: SendStatus::Sent,
            error: None,
            attempts,
        }
    }

    pub fn failed(attempts: u32, error: impl Into<String>) -> Self {
        Self {
            status: SendStatus::Failed,
            error: Some(error.into()),
            attempts,
        }
    }

    pub fn skipped(error: impl Into<String>) -> Self {
        Self {
            status: SendStatus::Skipped,
            error: Some(error.into()),
            attempts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_ignores_case_and_whitespace() {
        let a = LeadRecord::new("A", "  Sales@Example.COM ");
        let b = LeadRecord::new("B", "sales@example.com");
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_only_pending_and_failed_are_sendable() {
        assert!(SendStatus::Pending.is_sendable());
        assert!(SendStatus::Failed.is_sendable());
        assert!(!SendStatus::Sent.is_sendable());
        assert!(!SendStatus::Skipped.is_sendable());
    }
}
