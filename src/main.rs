use anyhow::Result;
use so_answer_pairs::utils::logging;
use so_answer_pairs::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置（第一个参数为配置文件路径）
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    // 初始化并运行应用
    App::initialize(config)?.run().await?;

    Ok(())
}
