//! 重试策略 - 业务能力层
//!
//! 页面抓取和单封邮件发送共用同一个策略对象：
//! 有上限的尝试次数、指数退避、随机抖动、单次调用超时。

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{ProviderError, TransportError};

/// 可被重试策略识别的错误
pub trait TransientError: Sized {
    /// 是否值得再试一次
    fn is_transient(&self) -> bool;

    /// 构造"单次调用超时"错误
    fn timed_out(after: Duration) -> Self;

    /// 服务端建议的等待时间
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl TransientError for ProviderError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient { .. }
                | ProviderError::Timeout { .. }
                | ProviderError::RateLimited { .. }
        )
    }

    fn timed_out(after: Duration) -> Self {
        ProviderError::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl TransientError for TransportError {
    fn is_transient(&self) -> bool {
        !matches!(self, TransportError::Rejected { .. })
    }

    fn timed_out(after: Duration) -> Self {
        TransportError::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含第一次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 抖动比例 (0.0 ~ 1.0)
    pub jitter: f64,
    /// 单次调用超时
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// 一次带重试调用的结果
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    /// 实际尝试次数
    pub attempts: u32,
}

impl RetryPolicy {
    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        // NaN/无穷大的抖动系数按没有抖动处理
        if !(self.jitter.is_finite() && self.jitter > 0.0) || backoff.is_zero() {
            return backoff;
        }

        let factor = rand::rng().random_range(-self.jitter..=self.jitter);
        backoff.mul_f64((1.0 + factor).max(0.0))
    }

    /// 执行操作，失败时按策略重试
    ///
    /// 每次调用都受 `call_timeout` 限制，超时按可重试错误处理；
    /// 不可重试的错误立即返回。
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> RetryOutcome<T, E>
    where
        E: TransientError + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match timeout(self.call_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(E::timed_out(self.call_timeout)),
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} 在第 {} 次尝试时成功", label, attempt);
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(err) => err,
            };

            if !err.is_transient() || attempt >= max_attempts {
                warn!("{} 失败 (尝试 {}/{}): {}", label, attempt, max_attempts, err);
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt,
                };
            }

            let mut delay = self.delay_for(attempt);
            if let Some(hint) = err.retry_after() {
                delay = delay.max(hint.min(self.max_delay));
            }

            warn!(
                "{} 失败 (尝试 {}/{}), {:?} 后重试: {}",
                label, attempt, max_attempts, delay, err
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
            call_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_delay_grows_exponentially_and_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(10), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter: 0.5,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_non_finite_jitter_means_no_jitter() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter: f64::NAN,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let outcome = fast_policy(3)
            .run("测试调用", |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::transient("test", "boom"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 2);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn test_stops_at_max_attempts() {
        let outcome: RetryOutcome<(), _> = fast_policy(2)
            .run("测试调用", |_| async {
                Err(TransportError::Transient {
                    message: "down".into(),
                })
            })
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let outcome: RetryOutcome<(), _> = fast_policy(5)
            .run("测试调用", |_| async {
                Err(TransportError::Rejected {
                    address: "a@x.com".into(),
                    message: "mailbox unavailable".into(),
                })
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(outcome.result, Err(TransportError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_stuck_call_times_out_and_is_retried() {
        let policy = RetryPolicy {
            call_timeout: Duration::from_millis(20),
            ..fast_policy(2)
        };
        let outcome: RetryOutcome<(), ProviderError> = policy
            .run("卡住的调用", |_| async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(outcome.attempts, 2);
        assert!(matches!(outcome.result, Err(ProviderError::Timeout { .. })));
    }
}
