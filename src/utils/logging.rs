/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::job::{ScrapeJob, SendJob, StopReason};

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`，否则默认 `info`，详细模式下为 `debug`
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 活动线索流水线");
    info!("📁 数据目录: {}", config.data_dir.display());
    info!("📊 发送并发数: {}", config.send_concurrency);
    info!("{}", "=".repeat(60));
}

/// 记录任务开始信息
pub fn log_job_start(kind: &str, campaign_id: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始{}: 活动 {}", kind, campaign_id);
    info!("{}", "=".repeat(60));
}

/// 打印抓取任务统计
pub fn print_scrape_stats(job: &ScrapeJob) {
    info!("\n{}", "─".repeat(60));
    info!("📊 抓取完成统计 - 活动 {}", job.campaign_id);
    info!("📄 已抓取页数: {}", job.pages_fetched);
    info!("✅ 新增线索: {}/{}", job.unique_collected, job.requested_max);
    info!("🔁 重复跳过: {}", job.duplicates_skipped);
    info!("🚫 无效记录: {}", job.rejected.len());
    match &job.stop_reason {
        Some(StopReason::CapReached) => info!("🏁 停止原因: 已达到最大结果数"),
        Some(StopReason::Exhausted) => info!("🏁 停止原因: 数据源没有更多结果"),
        Some(StopReason::Partial { error }) => {
            info!("⚠️ 停止原因: 部分成功 ({})", truncate_text(error, 120))
        }
        Some(StopReason::Cancelled) => info!("🛑 停止原因: 已取消"),
        None => {}
    }
    info!("{}", "─".repeat(60));
}

/// 打印发送任务统计
pub fn print_send_stats(job: &SendJob) {
    info!("\n{}", "─".repeat(60));
    info!("📊 发送完成统计 - 活动 {}", job.campaign_id);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("✅ 成功: {}", job.sent);
    info!("❌ 失败: {}", job.failed);
    info!("⏭️ 跳过: {}", job.skipped);
    info!("⏳ 剩余待发送: {}", job.remaining);
    if job.unpersisted > 0 {
        warn!("⚠️ 已送达但状态未写回: {} (再次发送前请核对)", job.unpersisted);
    }
    if job.cancelled {
        info!("🛑 任务已被取消");
    }
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars_not_bytes() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("邮件发送失败原因", 4), "邮件发送...");
    }
}
