//! 可观测性：tracing 日志输出到 stderr，避免与控制台回复交错

use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// 初始化全局日志；RUST_LOG 存在时覆盖 default_level
pub fn init(default_level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
