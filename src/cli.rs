//! 命令行入口
//!
//! 每个子命令执行一次操作，并在标准输出打印一段 JSON 结果。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use tracing::warn;

use crate::app::App;
use crate::config::Config;
use crate::models::load_template;
use crate::orchestrator::ScrapeRequest;

#[derive(Parser)]
#[command(name = "leadflow")]
#[command(about = "抓取商家线索并按活动发送邮件")]
pub struct Cli {
    /// 活动数据根目录（覆盖 LEADFLOW_DATA_DIR）
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 显示详细日志
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 创建活动
    Create { campaign_id: String },

    /// 从数据源抓取线索
    Scrape {
        campaign_id: String,
        #[arg(long)]
        business_type: String,
        #[arg(long)]
        location: String,
        #[arg(long, default_value_t = 100)]
        max_results: usize,
    },

    /// 向待发送的记录发送邮件
    Send {
        campaign_id: String,
        /// 邮件模板（TOML：subject / content）
        #[arg(long)]
        template: PathBuf,
        /// 本次最多发送多少封（覆盖 EMAILS_PER_RUN）
        #[arg(long)]
        max_per_run: Option<usize>,
    },

    /// 校验数据集
    Validate { campaign_id: String },

    /// 列出所有活动
    List,

    /// 导入数据源导出的 CSV
    Import { campaign_id: String, csv: PathBuf },

    /// 从发送前的备份恢复数据集
    Restore { campaign_id: String },

    /// 查询数据源支持的地区
    Locations {
        #[arg(default_value = "IT")]
        country: String,
    },
}

impl Cli {
    /// 把命令行参数叠加到环境变量配置上
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if self.verbose {
            config.verbose_logging = true;
        }
        if let Commands::Send {
            max_per_run: Some(cap),
            ..
        } = &self.command
        {
            config.max_per_run = *cap;
        }
    }
}

/// 执行子命令
pub async fn run(command: Commands, app: &App) -> Result<()> {
    match command {
        Commands::Create { campaign_id } => {
            let campaign = app.create_campaign(&campaign_id)?;
            print_json(&campaign)
        }
        Commands::Scrape {
            campaign_id,
            business_type,
            location,
            max_results,
        } => {
            app.config().require_provider_key()?;
            let request = ScrapeRequest {
                campaign_id: campaign_id.clone(),
                business_type,
                location,
                max_results,
            };
            let job = cancel_on_ctrl_c(app, &campaign_id, app.scrape(&request))
                .await
                .inspect_err(|e| {
                    if e.is_deferrable() {
                        warn!("⏳ 数据源限流或活动正忙, 请稍后重试");
                    }
                })?;
            print_json(&job)
        }
        Commands::Send {
            campaign_id,
            template,
            ..
        } => {
            let template = load_template(&template).await?;
            let job = cancel_on_ctrl_c(app, &campaign_id, app.send(&campaign_id, &template)).await?;
            print_json(&job)
        }
        Commands::Validate { campaign_id } => {
            let report = app.validate(&campaign_id).await?;
            print_json(&report)
        }
        Commands::List => {
            let campaigns = app.list_campaigns()?;
            print_json(&campaigns)
        }
        Commands::Import { campaign_id, csv } => {
            let result = app
                .import(&campaign_id, &csv)
                .await
                .with_context(|| format!("导入 {} 失败", csv.display()))?;
            print_json(&result)
        }
        Commands::Restore { campaign_id } => {
            let campaign = app.restore(&campaign_id).await?;
            print_json(&campaign)
        }
        Commands::Locations { country } => {
            app.config().require_provider_key()?;
            let locations = app.locations(&country).await?;
            print_json(&locations)
        }
    }
}

/// 收到 Ctrl-C 时请求取消，并等待操作把已完成的进度落盘后返回
async fn cancel_on_ctrl_c<F>(app: &App, campaign_id: &str, operation: F) -> F::Output
where
    F: Future,
{
    tokio::pin!(operation);
    tokio::select! {
        output = &mut operation => output,
        _ = tokio::signal::ctrl_c() => {
            warn!("🛑 收到中断信号, 正在停止活动 {} 的当前操作...", campaign_id);
            app.cancel(campaign_id);
            operation.await
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("结果序列化失败")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_scrape_command() {
        let cli = Cli::parse_from([
            "leadflow",
            "scrape",
            "dentists",
            "--business-type",
            "dentist",
            "--location",
            "IT>Lombardia",
        ]);
        match cli.command {
            Commands::Scrape {
                campaign_id,
                max_results,
                ..
            } => {
                assert_eq!(campaign_id, "dentists");
                assert_eq!(max_results, 100);
            }
            _ => panic!("expected scrape command"),
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "leadflow",
            "--data-dir",
            "/tmp/leads",
            "send",
            "c1",
            "--template",
            "t.toml",
            "--max-per-run",
            "20",
        ]);
        let mut config = Config::default();
        cli.apply_to(&mut config);

        assert_eq!(config.data_dir, PathBuf::from("/tmp/leads"));
        assert_eq!(config.max_per_run, 20);
    }
}
