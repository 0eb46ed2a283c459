//! 应用装配
//!
//! 进程启动时创建一次：一个数据集存储、一个活动状态机、两个编排器。
//! 所有请求入口（CLI 子命令、测试）都通过这里进入系统。

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::clients::{HttpMailClient, LeadProvider, MailTransport, OutscraperClient};
use crate::config::Config;
use crate::error::{AppResult, StorageError};
use crate::infrastructure::{DatasetReport, DatasetStore, ImportResult};
use crate::models::campaign::Campaign;
use crate::models::job::{ScrapeJob, SendJob};
use crate::models::template::EmailTemplate;
use crate::orchestrator::{CampaignStateMachine, ScrapeOrchestrator, ScrapeRequest, SendOrchestrator};
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<DatasetStore>,
    machine: Arc<CampaignStateMachine>,
    scraper: ScrapeOrchestrator,
    sender: SendOrchestrator,
}

impl App {
    /// 使用真实的 Outscraper 和邮件网关初始化应用
    pub fn initialize(config: Config) -> AppResult<Self> {
        logging::log_startup(&config);

        std::fs::create_dir_all(&config.data_dir).map_err(|e| StorageError::io(&config.data_dir, e))?;

        let provider = Arc::new(OutscraperClient::new(&config));
        let transport = Arc::new(HttpMailClient::new(&config));
        Ok(Self::with_collaborators(config, provider, transport))
    }

    /// 使用指定的数据源和邮件通道装配应用
    pub fn with_collaborators(
        config: Config,
        provider: Arc<dyn LeadProvider>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        let store = Arc::new(DatasetStore::new(&config.data_dir, config.store_lock_timeout()));
        let machine = Arc::new(CampaignStateMachine::new(store.clone()));
        let retry = config.retry_policy();

        let scraper = ScrapeOrchestrator::new(store.clone(), provider, retry.clone(), config.provider_page_size);
        let sender = SendOrchestrator::new(store.clone(), transport, retry, config.send_options());

        Self {
            config,
            store,
            machine,
            scraper,
            sender,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<DatasetStore> {
        &self.store
    }

    pub fn machine(&self) -> &Arc<CampaignStateMachine> {
        &self.machine
    }

    /// 创建活动目录和元数据
    pub fn create_campaign(&self, campaign_id: &str) -> AppResult<Campaign> {
        self.machine.create(campaign_id)
    }

    pub fn list_campaigns(&self) -> AppResult<Vec<Campaign>> {
        self.machine.list()
    }

    pub fn campaign(&self, campaign_id: &str) -> AppResult<Campaign> {
        self.machine.get(campaign_id)
    }

    /// 抓取线索并追加到活动数据集（活动不存在时自动创建）
    pub async fn scrape(&self, request: &ScrapeRequest) -> AppResult<ScrapeJob> {
        logging::log_job_start("抓取", &request.campaign_id);
        self.machine.create(&request.campaign_id)?;

        let job = self.machine.run_scrape(&self.scraper, request).await?;
        logging::print_scrape_stats(&job);
        Ok(job)
    }

    /// 向活动中所有待发送的记录发送邮件
    pub async fn send(&self, campaign_id: &str, template: &EmailTemplate) -> AppResult<SendJob> {
        logging::log_job_start("发送", campaign_id);

        let job = self.machine.run_send(&self.sender, campaign_id, template).await?;
        logging::print_send_stats(&job);
        Ok(job)
    }

    /// 导入外部 CSV（活动不存在时自动创建）
    pub async fn import(&self, campaign_id: &str, csv_path: &Path) -> AppResult<ImportResult> {
        self.machine.create(campaign_id)?;
        self.machine.run_import(campaign_id, csv_path).await
    }

    pub async fn validate(&self, campaign_id: &str) -> AppResult<DatasetReport> {
        self.store.validate(campaign_id).await
    }

    /// 从发送前的备份恢复数据集
    pub async fn restore(&self, campaign_id: &str) -> AppResult<Campaign> {
        let campaign = self.machine.run_restore(campaign_id).await?;
        info!("♻️ 活动 {} 已恢复, 当前阶段 {}", campaign_id, campaign.stage);
        Ok(campaign)
    }

    /// 请求取消活动当前的抓取或发送
    pub fn cancel(&self, campaign_id: &str) -> bool {
        self.machine.cancel(campaign_id)
    }

    /// 查询数据源支持的地区
    pub async fn locations(&self, country: &str) -> AppResult<Vec<String>> {
        let client = OutscraperClient::new(&self.config);
        let outcome = self
            .config
            .retry_policy()
            .run("地区列表查询", |_| client.locations(country))
            .await;
        Ok(outcome.result?)
    }
}
