use anyhow::Result;
use clap::Parser;
use leadflow::cli::{self, Cli};
use leadflow::utils::logging;
use leadflow::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let mut config = Config::from_env();
    cli.apply_to(&mut config);

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let app = App::initialize(config)?;
    cli::run(cli.command, &app).await
}
