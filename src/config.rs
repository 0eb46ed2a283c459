use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::orchestrator::send_orchestrator::SendOptions;
use crate::services::retry::RetryPolicy;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 活动数据根目录（每个活动一个子目录）
    pub data_dir: PathBuf,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 数据源 (Outscraper) 配置 ---
    pub provider_base_url: String,
    pub provider_api_key: String,
    /// 每页请求的条数
    pub provider_page_size: usize,
    // --- 邮件网关配置 ---
    pub mail_api_url: String,
    pub mail_api_key: String,
    pub mail_from: String,
    // --- 发送控制 ---
    /// 同时发送的邮件数量
    pub send_concurrency: usize,
    /// 单次运行最多发送多少封（0 表示不限制）
    pub max_per_run: usize,
    /// 每封邮件之间的间隔（毫秒），实际间隔会加入随机抖动
    pub send_delay_ms: u64,
    // --- 重试策略 ---
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// 抖动比例 (0.0 ~ 1.0)
    pub retry_jitter: f64,
    /// 单次外部调用超时（秒）
    pub call_timeout_secs: u64,
    /// 等待活动写锁的最长时间（毫秒）
    pub store_lock_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            verbose_logging: false,
            provider_base_url: "https://api.outscraper.cloud".to_string(),
            provider_api_key: String::new(),
            provider_page_size: 50,
            mail_api_url: "http://localhost:8025/api/send".to_string(),
            mail_api_key: String::new(),
            mail_from: "noreply@example.com".to_string(),
            send_concurrency: 5,
            max_per_run: 0,
            send_delay_ms: 0,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 10_000,
            retry_jitter: 0.2,
            call_timeout_secs: 30,
            store_lock_timeout_ms: 5_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            data_dir: std::env::var("LEADFLOW_DATA_DIR").map(PathBuf::from).unwrap_or(default.data_dir),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            provider_base_url: std::env::var("OUTSCRAPER_BASE_URL").unwrap_or(default.provider_base_url),
            provider_api_key: std::env::var("OUTSCRAPER_API_KEY").unwrap_or(default.provider_api_key),
            provider_page_size: std::env::var("PROVIDER_PAGE_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.provider_page_size),
            mail_api_url: std::env::var("MAIL_API_URL").unwrap_or(default.mail_api_url),
            mail_api_key: std::env::var("MAIL_API_KEY").unwrap_or(default.mail_api_key),
            mail_from: std::env::var("MAIL_FROM").unwrap_or(default.mail_from),
            send_concurrency: std::env::var("SEND_CONCURRENCY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.send_concurrency),
            max_per_run: std::env::var("EMAILS_PER_RUN").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_per_run),
            send_delay_ms: std::env::var("SEND_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.send_delay_ms),
            retry_max_attempts: std::env::var("RETRY_MAX_ATTEMPTS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_max_attempts),
            retry_base_delay_ms: std::env::var("RETRY_BASE_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_base_delay_ms),
            retry_max_delay_ms: std::env::var("RETRY_MAX_DELAY_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_max_delay_ms),
            retry_jitter: std::env::var("RETRY_JITTER").ok().and_then(|v| v.parse().ok()).unwrap_or(default.retry_jitter),
            call_timeout_secs: std::env::var("CALL_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.call_timeout_secs),
            store_lock_timeout_ms: std::env::var("STORE_LOCK_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.store_lock_timeout_ms),
        }
    }

    /// 页面抓取和单封发送共用的重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter: if self.retry_jitter.is_finite() {
                self.retry_jitter.clamp(0.0, 1.0)
            } else {
                0.0
            },
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }

    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            concurrency: self.send_concurrency.max(1),
            max_per_run: (self.max_per_run > 0).then_some(self.max_per_run),
            pacing: Duration::from_millis(self.send_delay_ms),
        }
    }

    /// 访问真实数据源之前检查 API Key
    pub fn require_provider_key(&self) -> Result<&str, ConfigError> {
        if self.provider_api_key.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: "OUTSCRAPER_API_KEY".to_string(),
            });
        }
        Ok(&self.provider_api_key)
    }

    pub fn store_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.store_lock_timeout_ms)
    }
}
