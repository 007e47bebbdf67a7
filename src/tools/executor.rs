//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, input) 在超时内调用一次工具，
//! 未知工具 / 超时 / 失败时转为 AgentError（UnknownTool / ToolTimeout / Tool）；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// 执行指定工具（恰好一次，不重试）
    pub async fn execute(&self, tool_name: &str, input: &str) -> Result<String, AgentError> {
        let start = Instant::now();
        let tool = match self.registry.get(tool_name) {
            Ok(tool) => tool,
            Err(e) => {
                audit(tool_name, false, "unknown_tool", start, input);
                return Err(e.into());
            }
        };

        let result = timeout(self.timeout, tool.invoke(input)).await;

        let (ok, outcome) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        audit(tool_name, ok, outcome, start, input);

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::Tool(e)),
            Err(_) => Err(AgentError::ToolTimeout {
                tool: tool_name.to_string(),
                after: self.timeout,
            }),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// (name, description)，供 Planner 拼 prompt
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.registry.list_all()
    }
}

fn audit(tool: &str, ok: bool, outcome: &str, start: Instant, input: &str) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": start.elapsed().as_millis() as u64,
        "input_preview": input_preview(input),
    });
    tracing::info!(audit = %audit, "tool");
}

fn input_preview(input: &str) -> String {
    if input.chars().count() > 200 {
        format!("{}...", input.chars().take(200).collect::<String>())
    } else {
        input.to_string()
    }
}
