//! 收件人处理上下文
//!
//! 封装"我正在处理哪个活动的第几条记录"这一信息

use std::fmt::Display;

/// 收件人处理上下文
#[derive(Debug, Clone)]
pub struct RecipientCtx {
    /// 活动ID
    pub campaign_id: String,

    /// 记录在数据集中的位置（从1开始，仅用于日志显示）
    pub index: usize,

    /// 数据集总记录数
    pub total: usize,
}

impl RecipientCtx {
    pub fn new(campaign_id: impl Into<String>, index: usize, total: usize) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            index,
            total,
        }
    }
}

impl Display for RecipientCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[活动 {} 第 {}/{} 条]", self.campaign_id, self.index, self.total)
    }
}
