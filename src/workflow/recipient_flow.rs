//! 单个收件人的发送流程 - 流程层
//!
//! 核心职责：定义"一条记录"的完整发送流程
//!
//! 流程顺序：
//! 1. 重新校验邮箱（不合法 → skipped）
//! 2. 渲染模板
//! 3. 按重试策略发送（明确拒收不重试）
//! 4. 立即把结果写回数据集（失败时再试一次）

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::clients::MailTransport;
use crate::error::AppResult;
use crate::infrastructure::DatasetStore;
use crate::models::job::RecordOutcome;
use crate::models::lead::{LeadRecord, Rejection, SendStatus, StatusUpdate};
use crate::models::template::EmailTemplate;
use crate::services::normalizer::is_valid_email;
use crate::services::retry::RetryPolicy;
use crate::utils::logging::truncate_text;
use crate::workflow::recipient_ctx::RecipientCtx;

const WRITE_BACK_RETRY_DELAY: Duration = Duration::from_millis(200);

/// 收件人发送流程
///
/// - 只处理一条记录，不关心并发和批量
/// - 每条记录的结果都在返回前落盘
pub struct RecipientFlow {
    store: Arc<DatasetStore>,
    transport: Arc<dyn MailTransport>,
    retry: RetryPolicy,
    template: EmailTemplate,
}

impl RecipientFlow {
    pub fn new(
        store: Arc<DatasetStore>,
        transport: Arc<dyn MailTransport>,
        retry: RetryPolicy,
        template: EmailTemplate,
    ) -> Self {
        Self {
            store,
            transport,
            retry,
            template,
        }
    }

    pub async fn run(&self, lead: &LeadRecord, ctx: &RecipientCtx) -> AppResult<RecordOutcome> {
        let email = lead.email.trim();

        if !is_valid_email(email) {
            warn!("{} ⏭️ 邮箱格式不合法，跳过: '{}'", ctx, lead.email);
            let reason = Rejection::InvalidEmailFormat.as_str();
            self.write_back(ctx, &lead.email, StatusUpdate::skipped(reason)).await?;
            return Ok(RecordOutcome {
                email: lead.email.clone(),
                status: SendStatus::Skipped,
                attempts: 0,
                error: Some(reason.to_string()),
                unpersisted: false,
            });
        }

        let rendered = self.template.render(&lead.business_name);
        let label = format!("{} 发送 {}", ctx, email);
        let outcome = self
            .retry
            .run(&label, |_| self.transport.send(email, &rendered))
            .await;

        let attempts = lead.attempts + outcome.attempts;
        match outcome.result {
            Ok(()) => {
                // 邮件已经发出，写回失败也不能报成发送失败
                let (error, unpersisted) = match self.write_back(ctx, &lead.email, StatusUpdate::sent(attempts)).await {
                    Ok(()) => {
                        info!("{} ✅ 已发送 -> {} ({})", ctx, email, lead.business_name);
                        (None, false)
                    }
                    Err(e) => {
                        error!("{} ⚠️ 已送达 {}, 但状态未能写回: {}", ctx, email, e);
                        (Some(format!("已送达, 状态未能写回: {}", e)), true)
                    }
                };
                Ok(RecordOutcome {
                    email: lead.email.clone(),
                    status: SendStatus::Sent,
                    attempts,
                    error,
                    unpersisted,
                })
            }
            Err(err) => {
                let message = err.to_string();
                self.write_back(ctx, &lead.email, StatusUpdate::failed(attempts, message.clone()))
                    .await?;
                warn!("{} ❌ 发送失败 -> {}: {}", ctx, email, truncate_text(&message, 120));
                Ok(RecordOutcome {
                    email: lead.email.clone(),
                    status: SendStatus::Failed,
                    attempts,
                    error: Some(message),
                    unpersisted: false,
                })
            }
        }
    }

    async fn write_back(&self, ctx: &RecipientCtx, email: &str, update: StatusUpdate) -> AppResult<()> {
        match self.store.update_status(&ctx.campaign_id, email, update.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("{} 状态回写失败, 稍后重试一次: {}", ctx, e);
                sleep(WRITE_BACK_RETRY_DELAY).await;
                self.store.update_status(&ctx.campaign_id, email, update).await
            }
        }
    }
}
