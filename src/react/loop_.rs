//! ReAct 主循环
//!
//! Reasoning → (ToolCall → ToolExecuting → Observation → Reasoning)* → Finished | Failed | LimitExceeded。
//! 每次未结束运行的推理都计入步数（工具调用、格式错误、按策略重试的超时），达到 max_iterations 即 LimitExceeded；
//! 每个 ToolCall 恰好调用一次工具。循环只读 MemoryView，不修改记忆；取消由调用方丢弃本 future 完成。
//! 可选 event_tx：向控制台推送 Thinking / ToolCall / Observation / FinalAnswer 等事件。

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;

use crate::config::AgentSection;
use crate::core::{
    AgentError, AgentPhase, AgentRun, Observation, ObservationKind, RecoveryAction, RecoveryEngine,
};
use crate::memory::MemoryView;
use crate::react::{AgentStep, Planner, ReactEvent, ScratchpadEntry};
use crate::tools::{ToolError, ToolExecutor};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;
/// 思考内容展示最大字符数
const THINKING_PREVIEW_CHARS: usize = 800;

/// 单次运行的上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentLimits {
    pub max_iterations: usize,
    pub max_parse_retries: usize,
    pub reasoning_timeout: Duration,
}

impl Default for AgentLimits {
    fn default() -> Self {
        Self::from(&AgentSection::default())
    }
}

impl From<&AgentSection> for AgentLimits {
    fn from(cfg: &AgentSection) -> Self {
        Self {
            max_iterations: cfg.max_iterations,
            max_parse_retries: cfg.max_parse_retries,
            reasoning_timeout: Duration::from_secs(cfg.reasoning_timeout_secs),
        }
    }
}

/// ReAct 会话配置：一次运行需要的全部组件（均为借用）
pub struct ReactSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub recovery: &'a RecoveryEngine,
    pub limits: AgentLimits,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
}

impl<'a> ReactSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a ToolExecutor,
        recovery: &'a RecoveryEngine,
        limits: AgentLimits,
    ) -> Self {
        Self {
            planner,
            executor,
            recovery,
            limits,
            event_tx: None,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 工具失败 → 带标签的观察结果（detail 来自 RecoveryEngine）
fn tool_failure_observation(
    err: &AgentError,
    tool: &str,
    detail: String,
    tool_names: &[String],
) -> Observation {
    let kind = match err {
        AgentError::Tool(ToolError::Ambiguous { .. }) => ObservationKind::Disambiguation,
        AgentError::Tool(ToolError::NotFound(_)) => ObservationKind::NotFound,
        AgentError::UnknownTool(_) => ObservationKind::UnknownTool,
        AgentError::ToolTimeout { .. } => ObservationKind::Timeout,
        _ => ObservationKind::ToolError,
    };
    let text = if kind == ObservationKind::UnknownTool {
        format!(
            "{} Try one of [{}].",
            detail.trim_end(),
            tool_names.join(", ")
        )
    } else {
        detail
    };
    Observation::new(kind, Some(tool), text)
}

/// 执行一次 ReAct 运行，返回终态的 AgentRun（Finished / Failed / LimitExceeded）
pub async fn react_loop(session: &ReactSession<'_>, memory: &MemoryView, query: &str) -> AgentRun {
    let planner = session.planner;
    let executor = session.executor;
    let limits = session.limits;

    let mut run = AgentRun::new(query);
    let tools = executor.tool_descriptions();
    let tool_names = executor.tool_names();
    let mut scratchpad: Vec<ScratchpadEntry> = Vec::new();
    let mut iterations = 0usize;
    let mut parse_failures = 0usize;

    // 记录初始 token 数，用于计算本次增量
    let (init_prompt, init_completion, init_total) = planner.token_usage();

    tracing::info!(run = %run.id, query = %query, "agent run started");
    run.transition(AgentPhase::Reasoning);

    loop {
        if iterations >= limits.max_iterations {
            tracing::warn!(run = %run.id, iterations, "iteration limit reached");
            session.send(ReactEvent::Error {
                text: format!("Stopped after {} iterations", limits.max_iterations),
            });
            run.exceed_limit(limits.max_iterations);
            break;
        }

        session.send(ReactEvent::StepUpdate {
            step: iterations + 1,
            max_steps: limits.max_iterations,
        });
        session.send(ReactEvent::Thinking);

        let planned = timeout(
            limits.reasoning_timeout,
            planner.plan(query, memory, &tools, &scratchpad),
        )
        .await;
        let step = match planned {
            Ok(Ok(step)) => step,
            Ok(Err(e)) => {
                tracing::error!(run = %run.id, error = %e, "reasoning step failed");
                session.send(ReactEvent::Error { text: e.to_string() });
                run.fail(e);
                break;
            }
            Err(_) => {
                let err = AgentError::ReasoningTimeout(limits.reasoning_timeout);
                match session.recovery.handle(&err) {
                    RecoveryAction::RetryWithObservation(detail) => {
                        tracing::warn!(run = %run.id, "reasoning step timed out, retrying");
                        session.send(ReactEvent::Retry { detail });
                        iterations += 1;
                        run.transition(AgentPhase::Reasoning);
                        continue;
                    }
                    RecoveryAction::Abort => {
                        session.send(ReactEvent::Error { text: err.to_string() });
                        run.fail(err);
                        break;
                    }
                }
            }
        };
        run.steps.push(step.clone());

        match step {
            AgentStep::FinalAnswer { text, log } => {
                session.send(ReactEvent::ThinkingContent {
                    text: preview(log.trim(), THINKING_PREVIEW_CHARS),
                });
                session.send(ReactEvent::FinalAnswer { text: text.clone() });
                run.finish(text);
                break;
            }
            AgentStep::ParseFailure { raw_text, reason } => {
                iterations += 1;
                parse_failures += 1;
                tracing::warn!(run = %run.id, attempt = parse_failures, reason = %reason, "unparseable LLM output");
                session.send(ReactEvent::ParseFailure {
                    reason: reason.clone(),
                    attempt: parse_failures,
                });

                let err = AgentError::ParseFailure {
                    reason,
                    raw: raw_text.clone(),
                };
                if parse_failures > limits.max_parse_retries {
                    session.send(ReactEvent::Error { text: err.to_string() });
                    run.fail(err);
                    break;
                }
                match session.recovery.handle(&err) {
                    RecoveryAction::RetryWithObservation(detail) => {
                        let observation =
                            Observation::new(ObservationKind::InvalidFormat, None, detail);
                        run.observations.push(observation.clone());
                        scratchpad.push(ScratchpadEntry {
                            log: raw_text,
                            observation,
                        });
                        run.transition(AgentPhase::Reasoning);
                    }
                    RecoveryAction::Abort => {
                        run.fail(err);
                        break;
                    }
                }
            }
            AgentStep::ToolCall {
                tool_name,
                tool_input,
                log,
            } => {
                iterations += 1;
                session.send(ReactEvent::ThinkingContent {
                    text: preview(log.trim(), THINKING_PREVIEW_CHARS),
                });
                session.send(ReactEvent::ToolCall {
                    tool: tool_name.clone(),
                    input: tool_input.clone(),
                });
                run.transition(AgentPhase::ToolExecuting);

                let observation = match executor.execute(&tool_name, &tool_input).await {
                    Ok(output) => Observation::result(&tool_name, output),
                    Err(e) => match session.recovery.handle(&e) {
                        RecoveryAction::RetryWithObservation(detail) => {
                            tool_failure_observation(&e, &tool_name, detail, &tool_names)
                        }
                        RecoveryAction::Abort => {
                            tracing::error!(run = %run.id, tool = %tool_name, error = %e, "tool failure aborted the run");
                            session.send(ReactEvent::Error { text: e.to_string() });
                            run.fail(e);
                            break;
                        }
                    },
                };

                tracing::debug!(run = %run.id, tool = %tool_name, kind = ?observation.kind, "observation");
                session.send(ReactEvent::Observation {
                    tool: observation.tool.clone(),
                    kind: observation.kind,
                    preview: preview(&observation.to_string(), OBSERVATION_PREVIEW_CHARS),
                });
                run.observations.push(observation.clone());
                scratchpad.push(ScratchpadEntry { log, observation });
                run.transition(AgentPhase::Reasoning);
            }
        }
    }

    let (prompt, completion, total) = planner.token_usage();
    let (prompt_tokens, completion_tokens, total_tokens) = (
        prompt.saturating_sub(init_prompt),
        completion.saturating_sub(init_completion),
        total.saturating_sub(init_total),
    );
    tracing::info!(
        run = %run.id,
        phase = ?run.phase,
        iterations,
        tool_calls = run.tool_invocations(),
        prompt_tokens,
        completion_tokens,
        cumulative_total = total,
        "agent run finished"
    );
    session.send(ReactEvent::TokenUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens,
        cumulative_total: total,
    });
    run
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::*;
    use crate::config::TimeoutPolicy;
    use crate::core::RunStatus;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::tools::{ClockTool, Tool, ToolRegistry};

    /// 离线百科：Mercury 返回消歧义，其余返回摘要
    struct FakeEncyclopedia;

    #[async_trait]
    impl Tool for FakeEncyclopedia {
        fn name(&self) -> &str {
            "Wikipedia"
        }

        fn description(&self) -> &str {
            "offline encyclopedia"
        }

        async fn invoke(&self, input: &str) -> Result<String, ToolError> {
            match input {
                "Mercury" => Err(ToolError::Ambiguous {
                    query: "Mercury".to_string(),
                    options: vec!["Mercury (planet)".to_string(), "Mercury (element)".to_string()],
                }),
                other => Ok(format!("Page: {other}\nSummary: the smallest planet")),
            }
        }
    }

    struct CountingTool(Arc<AtomicUsize>);

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "Counter"
        }

        fn description(&self) -> &str {
            "counts"
        }

        async fn invoke(&self, _input: &str) -> Result<String, ToolError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n.to_string())
        }
    }

    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            "Sleepy"
        }

        fn description(&self) -> &str {
            "never answers in time"
        }

        async fn invoke(&self, _input: &str) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok("late".to_string())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(ClockTool).unwrap();
        registry.register(FakeEncyclopedia).unwrap();
        ToolExecutor::new(registry, 5)
    }

    fn limits(max_iterations: usize, max_parse_retries: usize) -> AgentLimits {
        AgentLimits {
            max_iterations,
            max_parse_retries,
            reasoning_timeout: Duration::from_secs(5),
        }
    }

    async fn run_with(
        llm: Arc<ScriptedLlmClient>,
        executor: &ToolExecutor,
        recovery: RecoveryEngine,
        limits: AgentLimits,
        query: &str,
    ) -> AgentRun {
        let planner = Planner::new(llm, 0.0);
        let session = ReactSession::new(&planner, executor, &recovery, limits);
        react_loop(&session, &MemoryView::default(), query).await
    }

    #[tokio::test]
    async fn test_clock_question() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Thought: I should check the clock.\nAction: Date Time\nAction Input: now",
            "Thought: I now know the final answer\nFinal Answer: It is late.",
        ]));
        let run = run_with(llm.clone(), &executor(), RecoveryEngine::default(), limits(15, 3), "What time is it?").await;

        assert_eq!(run.phase, AgentPhase::Finished);
        assert_eq!(run.tool_invocations(), 1);
        assert_eq!(run.observations[0].kind, ObservationKind::Result);
        assert!(DateTime::parse_from_rfc3339(&run.observations[0].text).is_ok());

        // 第二次推理能看到时间戳
        let second = llm.requests()[1].messages.last().unwrap().content.clone();
        assert!(second.contains(&format!("Observation: {}", run.observations[0].text)));
        assert_eq!(run.into_result().unwrap(), "It is late.");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_fatal() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Thought: add\nAction: Calculator\nAction Input: 1+1",
            "Thought: fine\nFinal Answer: 2",
        ]));
        let run = run_with(llm, &executor(), RecoveryEngine::default(), limits(15, 3), "1+1?").await;

        assert_eq!(run.phase, AgentPhase::Finished);
        let obs = &run.observations[0];
        assert_eq!(obs.kind, ObservationKind::UnknownTool);
        assert!(obs.text.contains("Calculator is not a valid tool"));
        assert!(obs.text.contains("Date Time, Wikipedia"));
    }

    #[tokio::test]
    async fn test_always_tool_call_hits_limit_exactly() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool(calls.clone())).unwrap();
        let executor = ToolExecutor::new(registry, 5);
        let llm = Arc::new(
            ScriptedLlmClient::new(["Thought: again\nAction: Counter\nAction Input: x"]).repeating(),
        );

        let run = run_with(llm.clone(), &executor, RecoveryEngine::default(), limits(3, 3), "loop").await;

        assert_eq!(run.phase, AgentPhase::LimitExceeded);
        assert!(matches!(run.status, RunStatus::IterationLimitExceeded(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_parse_failures_beyond_bound_fail_the_run() {
        let llm = Arc::new(ScriptedLlmClient::new(["I am not sure what to do"]).repeating());
        let run = run_with(llm.clone(), &executor(), RecoveryEngine::default(), limits(15, 2), "?").await;

        assert_eq!(run.phase, AgentPhase::Failed);
        assert!(matches!(
            run.into_result(),
            Err(AgentError::ParseFailure { .. })
        ));
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn test_parse_failure_within_bound_recovers() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Let me think about it",
            "Thought: ok\nFinal Answer: recovered",
        ]));
        let run = run_with(llm.clone(), &executor(), RecoveryEngine::default(), limits(15, 3), "?").await;

        assert_eq!(run.phase, AgentPhase::Finished);
        assert_eq!(run.observations[0].kind, ObservationKind::InvalidFormat);
        let retry_prompt = llm.requests()[1].messages.last().unwrap().content.clone();
        assert!(retry_prompt.contains("[invalid format] Invalid Format: Missing 'Action:' after 'Thought:'"));
    }

    #[tokio::test]
    async fn test_provider_error_fails_run() {
        let llm = Arc::new(
            ScriptedLlmClient::new(Vec::<String>::new()).then_error(LlmError::Api("503".to_string())),
        );
        let run = run_with(llm, &executor(), RecoveryEngine::default(), limits(15, 3), "hi").await;

        assert_eq!(run.phase, AgentPhase::Failed);
        assert!(matches!(
            run.into_result(),
            Err(AgentError::Provider(LlmError::Api(_)))
        ));
    }

    #[tokio::test]
    async fn test_disambiguation_then_refined_query() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Thought: look it up\nAction: Wikipedia\nAction Input: Mercury",
            "Thought: several pages, pick the planet\nAction: Wikipedia\nAction Input: \"Mercury (planet)\"",
            "Thought: I now know the final answer\nFinal Answer: Mercury is the smallest planet.",
        ]));
        let run = run_with(llm, &executor(), RecoveryEngine::default(), limits(15, 3), "Tell me about Mercury").await;

        assert_eq!(run.phase, AgentPhase::Finished);
        let kinds: Vec<_> = run.observations.iter().map(|o| o.kind).collect();
        assert_eq!(kinds, vec![ObservationKind::Disambiguation, ObservationKind::Result]);
        assert!(run.observations[0].text.contains("Mercury (planet)"));
        assert!(run.observations[1].text.contains("Page: Mercury (planet)"));
    }

    #[tokio::test]
    async fn test_reasoning_timeout_policies() {
        let slow = || {
            Arc::new(
                ScriptedLlmClient::new(["Final Answer: too late"])
                    .with_delay(Duration::from_millis(300)),
            )
        };
        let limits = AgentLimits {
            max_iterations: 2,
            max_parse_retries: 3,
            reasoning_timeout: Duration::from_millis(20),
        };

        let run = run_with(slow(), &executor(), RecoveryEngine::new(TimeoutPolicy::Retry), limits, "q").await;
        assert_eq!(run.phase, AgentPhase::LimitExceeded);

        let run = run_with(slow(), &executor(), RecoveryEngine::new(TimeoutPolicy::Abort), limits, "q").await;
        assert!(matches!(
            run.into_result(),
            Err(AgentError::ReasoningTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_tool_timeout_policies() {
        let mut registry = ToolRegistry::new();
        registry.register(SleepyTool).unwrap();
        let executor = ToolExecutor::with_timeout(registry, Duration::from_millis(20));
        let script = || {
            Arc::new(ScriptedLlmClient::new([
                "Action: Sleepy\nAction Input: x",
                "Final Answer: gave up waiting",
            ]))
        };

        let run = run_with(script(), &executor, RecoveryEngine::new(TimeoutPolicy::Retry), limits(15, 3), "q").await;
        assert_eq!(run.phase, AgentPhase::Finished);
        assert_eq!(run.observations[0].kind, ObservationKind::Timeout);

        let run = run_with(script(), &executor, RecoveryEngine::new(TimeoutPolicy::Abort), limits(15, 3), "q").await;
        assert!(matches!(
            run.into_result(),
            Err(AgentError::ToolTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "Thought: clock\nAction: Date Time\nAction Input: now",
            "Final Answer: done",
        ]));
        let planner = Planner::new(llm, 0.0);
        let executor = executor();
        let recovery = RecoveryEngine::default();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session = ReactSession::new(&planner, &executor, &recovery, limits(15, 3)).with_event_tx(&tx);
        react_loop(&session, &MemoryView::default(), "time?").await;
        drop(tx);

        let mut names = Vec::new();
        while let Some(ev) = rx.recv().await {
            names.push(match ev {
                ReactEvent::ToolCall { .. } => "tool_call",
                ReactEvent::Observation { .. } => "observation",
                ReactEvent::FinalAnswer { .. } => "final_answer",
                ReactEvent::TokenUsage { .. } => "token_usage",
                _ => continue,
            });
        }
        assert_eq!(names, vec!["tool_call", "observation", "final_answer", "token_usage"]);
    }
}
