//! 业务能力层（Service Layer）
//!
//! 不依赖任何网络资源的纯能力：记录归一化、重试策略

pub mod normalizer;
pub mod retry;

pub use normalizer::{is_valid_email, normalize, normalize_batch, NormalizedBatch};
pub use retry::{RetryOutcome, RetryPolicy, TransientError};
