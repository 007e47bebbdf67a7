//! 状态定义：AgentPhase 状态机、AgentRun 单次运行记录、Observation
//!
//! AgentRun 只在一次用户提问内存在：创建于提问开始，回复返回后即丢弃，从不持久化。

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::core::AgentError;
use crate::react::AgentStep;

/// ReAct 状态机的阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AgentPhase {
    Start,
    Reasoning,
    ToolExecuting,
    Finished,
    Failed,
    LimitExceeded,
}

impl AgentPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AgentPhase::Finished | AgentPhase::Failed | AgentPhase::LimitExceeded
        )
    }

    /// 合法迁移表：Start → Reasoning → {ToolExecuting → Reasoning} → Finished | Failed | LimitExceeded
    pub fn can_transition_to(self, next: AgentPhase) -> bool {
        use AgentPhase::*;
        match (self, next) {
            (Start, Reasoning) => true,
            (Reasoning, ToolExecuting | Reasoning | Finished | Failed) => true,
            (ToolExecuting, Reasoning | Failed) => true,
            (from, LimitExceeded | Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// 运行结果状态
#[derive(Clone, Debug)]
pub enum RunStatus {
    Running,
    Done(String),
    Failed(AgentError),
    IterationLimitExceeded(usize),
}

/// Observation 的种类；歧义（disambiguation）与真实摘要区分开，便于推理步骤分支
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationKind {
    Result,
    Disambiguation,
    NotFound,
    ToolError,
    UnknownTool,
    Timeout,
    InvalidFormat,
}

impl ObservationKind {
    /// 写入 scratchpad 时的前缀标签；普通结果不加标签
    pub fn tag(self) -> Option<&'static str> {
        match self {
            ObservationKind::Result => None,
            ObservationKind::Disambiguation => Some("[disambiguation]"),
            ObservationKind::NotFound => Some("[not found]"),
            ObservationKind::ToolError => Some("[tool error]"),
            ObservationKind::UnknownTool => Some("[unknown tool]"),
            ObservationKind::Timeout => Some("[timeout]"),
            ObservationKind::InvalidFormat => Some("[invalid format]"),
        }
    }
}

/// 一次工具调用（或解析失败）后写回推理上下文的观察结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub kind: ObservationKind,
    /// 产生该观察的工具名；解析失败时为 None
    pub tool: Option<String>,
    pub text: String,
}

impl Observation {
    pub fn new(kind: ObservationKind, tool: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            kind,
            tool: tool.map(String::from),
            text: text.into(),
        }
    }

    pub fn result(tool: &str, text: impl Into<String>) -> Self {
        Self::new(ObservationKind::Result, Some(tool), text)
    }

    /// 消歧义不算错误：它是一份候选列表，LLM 应据此细化查询
    pub fn is_error(&self) -> bool {
        !matches!(
            self.kind,
            ObservationKind::Result | ObservationKind::Disambiguation
        )
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.tag() {
            Some(tag) => write!(f, "{} {}", tag, self.text),
            None => f.write_str(&self.text),
        }
    }
}

/// 单次用户提问的执行记录
#[derive(Debug)]
pub struct AgentRun {
    pub id: Uuid,
    pub query: String,
    pub steps: Vec<AgentStep>,
    pub observations: Vec<Observation>,
    pub phase: AgentPhase,
    pub status: RunStatus,
}

impl AgentRun {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            steps: Vec::new(),
            observations: Vec::new(),
            phase: AgentPhase::Start,
            status: RunStatus::Running,
        }
    }

    /// 推进状态机；非法迁移只记录告警（属于实现缺陷，不应影响用户）
    pub fn transition(&mut self, next: AgentPhase) {
        if !self.phase.can_transition_to(next) {
            tracing::warn!(run = %self.id, from = ?self.phase, to = ?next, "illegal phase transition");
        }
        tracing::debug!(run = %self.id, from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    pub fn finish(&mut self, answer: String) {
        self.transition(AgentPhase::Finished);
        self.status = RunStatus::Done(answer);
    }

    pub fn fail(&mut self, err: AgentError) {
        self.transition(AgentPhase::Failed);
        self.status = RunStatus::Failed(err);
    }

    pub fn exceed_limit(&mut self, max: usize) {
        self.transition(AgentPhase::LimitExceeded);
        self.status = RunStatus::IterationLimitExceeded(max);
    }

    /// 本次运行实际执行的工具调用次数
    pub fn tool_invocations(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, AgentStep::ToolCall { .. }))
            .count()
    }

    /// 转为调用方需要的结果：最终回复或本次运行的错误
    pub fn into_result(self) -> Result<String, AgentError> {
        match self.status {
            RunStatus::Done(answer) => Ok(answer),
            RunStatus::Failed(err) => Err(err),
            RunStatus::IterationLimitExceeded(max) => Err(AgentError::IterationLimitExceeded(max)),
            RunStatus::Running => Err(AgentError::Cancelled),
        }
    }
}
