use anyhow::Result;
use omr_checker_api::{logger, App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load()?;

    // 初始化日志
    logger::init(config.verbose_logging);

    // 初始化并运行服务
    App::initialize(config).await?.run().await
}
