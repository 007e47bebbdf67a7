//! Agent 编排器
//!
//! 持有记忆与各组件，逐条处理用户提问：快照记忆 → 跑 ReAct 循环 → 成功则追加两条轮次 → 检查压缩。
//! 失败、超限或被取消的运行不修改记忆。run_query 只在运行的 await 全部完成后才追加轮次，
//! 可以安全地被丢弃（Ctrl-C）；compact_memory 单独调用，控制台不会在压缩中途取消它。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;

use crate::agent::AgentComponents;
use crate::config::{AppConfig, LlmProvider};
use crate::core::AgentError;
use crate::llm::{LlmClient, LlmError, MockLlmClient, OpenAiClient};
use crate::memory::{MemoryDelta, SummaryBufferMemory};
use crate::react::{react_loop, ReactEvent, ReactSession};

/// 根据配置选择 LLM 后端（Azure OpenAI / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let llm = &cfg.llm;
    let required = |value: &Option<String>, name: &str| {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| AgentError::Config(format!("missing llm.{name}")))
    };

    match llm.provider {
        LlmProvider::Azure => {
            let deployment = required(&llm.deployment, "deployment")?;
            let endpoint = required(&llm.endpoint, "endpoint")?;
            let api_key = required(&llm.api_key, "api_key")?;
            let api_version = required(&llm.api_version, "api_version")?;
            tracing::info!(deployment = %deployment, "Using Azure OpenAI LLM");
            Ok(Arc::new(OpenAiClient::azure(
                &endpoint,
                &deployment,
                &api_version,
                &api_key,
            )))
        }
        LlmProvider::OpenAi => {
            let api_key = required(&llm.api_key, "api_key")?;
            tracing::info!(model = %llm.model, "Using OpenAI-compatible LLM");
            Ok(Arc::new(OpenAiClient::new(
                llm.base_url.as_deref(),
                &llm.model,
                &api_key,
            )))
        }
        LlmProvider::Mock => {
            tracing::warn!("Using Mock LLM (offline echo)");
            Ok(Arc::new(MockLlmClient))
        }
    }
}

/// 编排器：独占记忆，一次只处理一个提问
pub struct Orchestrator {
    components: AgentComponents,
    memory: SummaryBufferMemory,
    /// 记忆摘要请求的超时
    summary_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        components: AgentComponents,
        memory: SummaryBufferMemory,
        summary_timeout: Duration,
    ) -> Self {
        Self {
            components,
            memory,
            summary_timeout,
        }
    }

    /// 处理一个用户提问并在需要时压缩记忆：返回最终回复，或本次运行的错误（记忆保持不变）
    pub async fn handle_query(
        &mut self,
        query: &str,
        event_tx: Option<&UnboundedSender<ReactEvent>>,
    ) -> Result<String, AgentError> {
        let answer = self.run_query(query, event_tx).await?;
        self.compact_memory().await;
        Ok(answer)
    }

    /// 只跑 ReAct 循环并追加本轮对话，不做压缩
    ///
    /// 追加发生在最后一个 await 之后，丢弃该 future 要么不改记忆，要么两条轮次都已写入。
    pub async fn run_query(
        &mut self,
        query: &str,
        event_tx: Option<&UnboundedSender<ReactEvent>>,
    ) -> Result<String, AgentError> {
        let view = self.memory.snapshot();
        let c = &self.components;
        let mut session = ReactSession::new(&c.planner, &c.executor, &c.recovery, c.limits);
        if let Some(tx) = event_tx {
            session = session.with_event_tx(tx);
        }

        // 只有 Done 返回 Ok；其余终态直接返回错误，记忆不变
        let answer = react_loop(&session, &view, query).await.into_result()?;

        self.memory.apply(MemoryDelta::exchange(query, answer.as_str()));
        Ok(answer)
    }

    /// 超出阈值时压缩记忆，受 summary_timeout 约束；失败只记录警告，轮次原样保留
    ///
    /// 返回是否完成了一次压缩。
    pub async fn compact_memory(&mut self) -> bool {
        if !self.memory.needs_compaction() {
            return false;
        }
        match timeout(self.summary_timeout, self.memory.compact()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "memory compaction failed, keeping turns verbatim");
                false
            }
            Err(_) => {
                tracing::warn!(
                    error = %LlmError::Timeout,
                    "memory compaction failed, keeping turns verbatim"
                );
                false
            }
        }
    }

    pub fn memory(&self) -> &SummaryBufferMemory {
        &self.memory
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }
}
