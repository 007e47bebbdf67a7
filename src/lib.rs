//! ReAct Agent - 带工具与记忆的终端对话智能体
//!
//! 模块划分：
//! - **agent**: 按配置装配 Planner / 工具 / 记忆，得到 Orchestrator
//! - **config**: 应用配置加载（TOML + 环境变量 + 旧版 .env 变量名）与启动校验
//! - **core**: 错误与恢复策略、单次运行状态机、编排器
//! - **llm**: LLM 客户端抽象与实现（Azure OpenAI / OpenAI 兼容 / Mock / 回放）
//! - **memory**: 对话轮次、token 估算、摘要缓冲记忆
//! - **observability**: tracing 日志初始化
//! - **react**: Planner（prompt 与输出解析）、ReAct 主循环、过程事件
//! - **tools**: 工具注册表、执行器、Date Time 与 Wikipedia 工具
//! - **ui**: 交互式控制台

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
pub mod ui;

pub use agent::{create_orchestrator, create_orchestrator_with_llm};
pub use config::{load_config, AppConfig};
pub use core::{AgentError, Orchestrator};
