//! Agent 运行时装配
//!
//! create_agent_components 按配置构建 Planner / ToolExecutor（Date Time + Wikipedia）/ Recovery / 上限；
//! create_orchestrator 再加上摘要缓冲记忆（与 Planner 共用同一个 LLM 客户端），得到可直接驱动控制台的编排器。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{create_llm_from_config, AgentError, Orchestrator, RecoveryEngine};
use crate::llm::LlmClient;
use crate::memory::{LlmSummarizer, SummaryBufferMemory};
use crate::react::{AgentLimits, Planner};
use crate::tools::{ClockTool, ToolExecutor, ToolRegistry, WikipediaTool};

/// 预构建的 Agent 组件：Planner、ToolExecutor、Recovery 与单次运行上限
pub struct AgentComponents {
    pub planner: Planner,
    pub executor: ToolExecutor,
    pub recovery: RecoveryEngine,
    pub limits: AgentLimits,
}

/// 注册内置工具：Date Time、Wikipedia（名称重复属于配置错误）
pub fn default_registry(cfg: &AppConfig) -> Result<ToolRegistry, AgentError> {
    let wiki = &cfg.tools.wikipedia;
    let mut tools = ToolRegistry::new();
    tools.register(ClockTool)?;
    let wikipedia = WikipediaTool::new(
        &wiki.base_url,
        wiki.timeout_secs,
        wiki.max_result_chars,
        wiki.search_results,
    )
    .map_err(|e| AgentError::Config(format!("tools.wikipedia: {e}")))?;
    tools.register(wikipedia)?;
    Ok(tools)
}

/// 用给定 LLM 构建组件（测试中可注入 ScriptedLlmClient）
pub fn create_agent_components(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<AgentComponents, AgentError> {
    let tools = default_registry(cfg)?;
    tracing::debug!(tools = ?tools.tool_names(), "tools registered");

    Ok(AgentComponents {
        planner: Planner::new(llm, cfg.llm.temperature),
        executor: ToolExecutor::new(tools, cfg.tools.tool_timeout_secs),
        recovery: RecoveryEngine::new(cfg.agent.timeout_policy),
        limits: AgentLimits::from(&cfg.agent),
    })
}

/// 用给定 LLM 构建编排器（Planner 与摘要器共用该客户端）
pub fn create_orchestrator_with_llm(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Orchestrator, AgentError> {
    let components = create_agent_components(cfg, llm.clone())?;
    let summarizer = Arc::new(LlmSummarizer::new(llm, cfg.llm.temperature));
    let memory = SummaryBufferMemory::new(cfg.memory.limits(), summarizer);
    Ok(Orchestrator::new(
        components,
        memory,
        Duration::from_secs(cfg.llm.request_timeout_secs),
    ))
}

/// 按配置选择 LLM 后端并构建编排器
pub fn create_orchestrator(cfg: &AppConfig) -> Result<Orchestrator, AgentError> {
    let llm = create_llm_from_config(cfg)?;
    create_orchestrator_with_llm(cfg, llm)
}
