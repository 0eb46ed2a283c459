use std::path::PathBuf;

use thiserror::Error;

use crate::models::campaign::CampaignStage;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误（坏活动 ID、坏参数）
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 数据源调用错误
    #[error("数据源错误: {0}")]
    Provider(#[from] ProviderError),
    /// 邮件发送错误
    #[error("邮件发送错误: {0}")]
    Transport(#[from] TransportError),
    /// 数据集存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),
    /// 活动状态错误
    #[error("活动错误: {0}")]
    Campaign(#[from] CampaignError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("非法的活动 ID: '{id}'")]
    InvalidCampaignId { id: String },
    #[error("最大结果数必须大于 0")]
    InvalidMaxResults,
}

/// 数据源错误
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// 网络故障或 5xx，可重试
    #[error("数据源请求失败 ({endpoint}): {message}")]
    Transient { endpoint: String, message: String },
    /// 单次调用超时
    #[error("数据源请求超时 ({after_ms}ms)")]
    Timeout { after_ms: u64 },
    /// 请求频率限制，调用方应延后重试
    #[error("数据源请求频率限制, 建议等待: {retry_after:?}秒")]
    RateLimited { retry_after: Option<u64> },
    /// 4xx 等不可重试的错误响应
    #[error("数据源返回错误响应 ({endpoint}): status={status}, message={message}")]
    BadResponse {
        endpoint: String,
        status: u16,
        message: String,
    },
    /// 第一页重试耗尽，没有拿到任何数据
    #[error("数据源不可用 (已尝试 {attempts} 次): {last_error}")]
    Unavailable { attempts: u32, last_error: String },
}

/// 邮件发送错误
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("邮件网关请求失败: {message}")]
    Transient { message: String },
    #[error("邮件发送超时 ({after_ms}ms)")]
    Timeout { after_ms: u64 },
    /// 网关明确拒收，重试无意义
    #[error("邮件被拒收 ({address}): {message}")]
    Rejected { address: String, message: String },
}

/// 数据集存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("活动 {campaign_id} 没有数据文件")]
    NotFound { campaign_id: String },
    /// 写锁等待超时，调用方可稍后重试
    #[error("活动 {campaign_id} 正在被其他写入者占用")]
    Busy { campaign_id: String },
    #[error("活动 {campaign_id} 中没有邮箱为 {email} 的记录")]
    RecordNotFound { campaign_id: String, email: String },
    #[error("活动 {campaign_id} 没有备份文件")]
    BackupMissing { campaign_id: String },
    #[error("CSV 缺少必需的列 ({path}): {columns:?}")]
    MissingColumns { path: PathBuf, columns: Vec<String> },
    #[error("文件操作失败 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV 读写失败 ({path}): {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("活动元数据读写失败 ({path}): {message}")]
    Meta { path: PathBuf, message: String },
}

/// 活动状态错误
#[derive(Debug, Error)]
pub enum CampaignError {
    /// 同一活动已有正在进行的抓取或发送
    #[error("活动 {campaign_id} 正处于 {stage} 阶段，拒绝新的操作")]
    ConflictingOperation {
        campaign_id: String,
        stage: CampaignStage,
    },
    #[error("活动 {campaign_id} 不能从 {from} 转换到 {to}")]
    IllegalTransition {
        campaign_id: String,
        from: CampaignStage,
        to: CampaignStage,
    },
    #[error("活动 {campaign_id} 不存在")]
    NotFound { campaign_id: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("缺少必需的配置项 {name}")]
    Missing { name: String },
}

// ========== 便捷构造函数 ==========

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        StorageError::Csv {
            path: path.into(),
            source,
        }
    }
}

impl ProviderError {
    pub fn transient(endpoint: impl Into<String>, message: impl ToString) -> Self {
        ProviderError::Transient {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }
}

impl AppError {
    /// 调用方是否应该稍后重试（限流或锁竞争）
    pub fn is_deferrable(&self) -> bool {
        matches!(
            self,
            AppError::Provider(ProviderError::RateLimited { .. })
                | AppError::Storage(StorageError::Busy { .. })
        )
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
