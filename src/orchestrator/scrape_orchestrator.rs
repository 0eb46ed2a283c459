//! 抓取编排器 - 编排层
//!
//! 逐页从数据源拉取原始记录，归一化后立即写入数据集，
//! 直到达到最大结果数、数据源没有更多页、被取消或某页重试耗尽。
//!
//! 每一页在请求下一页之前就已经落盘，中途失败不会丢失已收集的数据。

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clients::{LeadProvider, PageRequest};
use crate::error::{AppResult, ProviderError, ValidationError};
use crate::infrastructure::DatasetStore;
use crate::models::campaign::validate_campaign_id;
use crate::models::job::{ScrapeJob, StopReason};
use crate::services::normalizer::normalize_batch;
use crate::services::retry::RetryPolicy;
use crate::utils::CancelFlag;

/// 抓取请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub campaign_id: String,
    pub business_type: String,
    pub location: String,
    pub max_results: usize,
}

/// 抓取编排器
pub struct ScrapeOrchestrator {
    store: Arc<DatasetStore>,
    provider: Arc<dyn LeadProvider>,
    retry: RetryPolicy,
    page_size: usize,
}

impl ScrapeOrchestrator {
    pub fn new(
        store: Arc<DatasetStore>,
        provider: Arc<dyn LeadProvider>,
        retry: RetryPolicy,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            provider,
            retry,
            page_size: page_size.max(1),
        }
    }

    /// 执行一次抓取任务
    ///
    /// 第一页就重试耗尽时返回 `ProviderError`（`RateLimited` 或 `Unavailable`）；
    /// 之后的失败都以 `StopReason::Partial` 结束并保留已写入的数据。
    pub async fn run(&self, request: &ScrapeRequest, cancel: &CancelFlag) -> AppResult<ScrapeJob> {
        validate_campaign_id(&request.campaign_id)?;
        if request.max_results == 0 {
            return Err(ValidationError::InvalidMaxResults.into());
        }

        let campaign_id = request.campaign_id.as_str();
        let mut job = ScrapeJob::new(campaign_id, request.max_results);
        let mut page_token: Option<String> = None;

        loop {
            if job.remaining_capacity() == 0 {
                job.finish(StopReason::CapReached);
                break;
            }
            if cancel.is_cancelled() {
                info!("🛑 活动 {} 抓取已取消, 已收集 {} 条", campaign_id, job.unique_collected);
                job.finish(StopReason::Cancelled);
                break;
            }

            let page_number = job.pages_fetched + 1;
            let page_request = PageRequest {
                business_type: request.business_type.clone(),
                location: request.location.clone(),
                max_per_page: self.page_size,
                page_token: page_token.clone(),
            };

            let label = format!("[活动 {}] 第 {} 页抓取", campaign_id, page_number);
            let outcome = self
                .retry
                .run(&label, |_| self.provider.fetch_page(&page_request))
                .await;

            let page = match outcome.result {
                Ok(page) => page,
                Err(err) if job.pages_fetched == 0 => {
                    error!("❌ 活动 {} 第一页抓取失败: {}", campaign_id, err);
                    if matches!(err, ProviderError::RateLimited { .. }) {
                        return Err(err.into());
                    }
                    return Err(ProviderError::Unavailable {
                        attempts: outcome.attempts,
                        last_error: err.to_string(),
                    }
                    .into());
                }
                Err(err) => {
                    warn!(
                        "⚠️ 活动 {} 第 {} 页抓取失败, 保留已收集的 {} 条: {}",
                        campaign_id, page_number, job.unique_collected, err
                    );
                    job.finish(StopReason::Partial {
                        error: err.to_string(),
                    });
                    break;
                }
            };

            job.pages_fetched += 1;
            let batch = normalize_batch(&page.records);
            job.rejected.extend(batch.rejected_on_page(page_number));

            let limit = Some(job.remaining_capacity());
            match self.store.append_limited(campaign_id, batch.leads, limit).await {
                Ok(appended) => {
                    job.unique_collected += appended.added;
                    job.duplicates_skipped += appended.duplicates_skipped;
                }
                Err(err) => {
                    error!("❌ 活动 {} 第 {} 页写入失败: {}", campaign_id, page_number, err);
                    job.finish(StopReason::Partial {
                        error: err.to_string(),
                    });
                    break;
                }
            }

            info!(
                "[活动 {}] ✓ 第 {} 页: 原始 {} 条, 累计新增 {}/{}",
                campaign_id,
                page_number,
                page.records.len(),
                job.unique_collected,
                job.requested_max
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => {
                    let reason = if job.remaining_capacity() == 0 {
                        StopReason::CapReached
                    } else {
                        StopReason::Exhausted
                    };
                    job.finish(reason);
                    break;
                }
            }
        }

        Ok(job)
    }
}
