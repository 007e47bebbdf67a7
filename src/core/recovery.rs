//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 ReAct 循环决定是把错误写回 scratchpad 重试，还是终止本次运行。

use crate::config::TimeoutPolicy;
use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作（重试提示 / 终止）
#[derive(Debug, Clone, Default)]
pub struct RecoveryEngine {
    timeout_policy: TimeoutPolicy,
}

impl RecoveryEngine {
    pub fn new(timeout_policy: TimeoutPolicy) -> Self {
        Self { timeout_policy }
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.timeout_policy
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ParseFailure { reason, .. } => RecoveryAction::RetryWithObservation(
                format!(
                    "{reason}\nRemember to answer with either `Action:` + `Action Input:` \
                     or `Final Answer:`."
                ),
            ),
            AgentError::Tool(e) => RecoveryAction::RetryWithObservation(e.to_string()),
            AgentError::UnknownTool(name) => RecoveryAction::RetryWithObservation(format!(
                "{name} is not a valid tool."
            )),
            e if e.is_timeout() => match self.timeout_policy {
                TimeoutPolicy::Retry => RecoveryAction::RetryWithObservation(e.to_string()),
                TimeoutPolicy::Abort => RecoveryAction::Abort,
            },
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::LlmError;
    use crate::tools::ToolError;

    #[test]
    fn test_recovery_parse_failure() {
        let engine = RecoveryEngine::default();
        let err = AgentError::ParseFailure {
            reason: "Invalid Format: Missing 'Action:' after 'Thought:'".to_string(),
            raw: "hmm".to_string(),
        };
        match engine.handle(&err) {
            RecoveryAction::RetryWithObservation(msg) => {
                assert!(msg.contains("Missing 'Action:'"));
            }
            other => panic!("Expected RetryWithObservation, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_tool_error_is_observation() {
        let engine = RecoveryEngine::default();
        let err = AgentError::Tool(ToolError::NotFound("Atlantis".to_string()));
        assert!(matches!(
            engine.handle(&err),
            RecoveryAction::RetryWithObservation(_)
        ));
    }

    #[test]
    fn test_recovery_timeout_follows_policy() {
        let err = AgentError::ToolTimeout {
            tool: "Wikipedia".to_string(),
            after: Duration::from_secs(5),
        };
        let retry = RecoveryEngine::new(TimeoutPolicy::Retry);
        assert!(matches!(
            retry.handle(&err),
            RecoveryAction::RetryWithObservation(_)
        ));
        let abort = RecoveryEngine::new(TimeoutPolicy::Abort);
        assert_eq!(abort.handle(&err), RecoveryAction::Abort);
    }

    #[test]
    fn test_recovery_provider_error_aborts() {
        let engine = RecoveryEngine::default();
        let err = AgentError::Provider(LlmError::Api("401 unauthorized".to_string()));
        assert_eq!(engine.handle(&err), RecoveryAction::Abort);
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::default();
        assert_eq!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort);
    }
}
