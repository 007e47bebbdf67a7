//! ReAct Agent - 终端对话智能体
//!
//! 入口：加载 .env 与配置、初始化日志、校验配置，然后运行交互式控制台。
//! 配置错误以非零状态退出；其余错误只影响单次提问。

use std::path::PathBuf;

use anyhow::Context;
use react_agent::{agent::create_orchestrator, config::load_config, observability, ui::run_console};
use tokio::io::BufReader;
use tracing_subscriber::filter::LevelFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先加载 .env，旧版变量名（subscription_key 等）由配置层补齐
    let _ = dotenvy::dotenv();

    // 日志：默认 warn（避免打断交互），可通过 RUST_LOG 覆盖；输出到 stderr
    observability::init(LevelFilter::WARN);

    let config_path = std::env::var("REACT_AGENT_CONFIG").ok().map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load configuration")?;
    cfg.validate().context("Invalid configuration")?;

    let mut orchestrator = create_orchestrator(&cfg).context("Failed to create agent")?;

    run_console(
        &mut orchestrator,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        cfg.agent.verbose,
    )
    .await
    .context("Console run failed")?;

    Ok(())
}
