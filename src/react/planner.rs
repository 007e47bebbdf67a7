//! Planner：拼 ReAct prompt、调用 LLM、解析输出为 AgentStep
//!
//! 输出语法：
//! ```text
//! Thought: ...
//! Action: <工具名>
//! Action Input: <输入>
//! Observation: ...        ← 由循环填写，LLM 在此处被 stop 截断
//! Final Answer: ...
//! ```
//! Planner 本身无状态：scratchpad 由 ReAct 循环持有并在每一步传入。

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::core::{AgentError, Observation};
use crate::llm::{CompletionRequest, LlmClient};
use crate::memory::{Message, MemoryView};

/// LLM 在写出 Observation 之前停止
pub const OBSERVATION_STOP: &str = "\nObservation:";
const FINAL_ANSWER: &str = "Final Answer:";

pub const MISSING_ACTION: &str = "Invalid Format: Missing 'Action:' after 'Thought:'";
pub const MISSING_ACTION_INPUT: &str = "Invalid Format: Missing 'Action Input:' after 'Action:'";
pub const BOTH_ACTION_AND_ANSWER: &str =
    "Invalid Format: Parsing LLM output produced both a final answer and an action";

static ACTION_RE: OnceLock<Regex> = OnceLock::new();
static ACTION_ONLY_RE: OnceLock<Regex> = OnceLock::new();

/// 一次推理的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStep {
    /// 调用工具；log 为 LLM 原文，写回 scratchpad
    ToolCall {
        tool_name: String,
        tool_input: String,
        log: String,
    },
    FinalAnswer {
        text: String,
        log: String,
    },
    /// 输出不符合语法；reason 作为 Observation 反馈给 LLM
    ParseFailure { raw_text: String, reason: String },
}

impl AgentStep {
    /// 写回 scratchpad 的原文
    pub fn log(&self) -> &str {
        match self {
            AgentStep::ToolCall { log, .. } | AgentStep::FinalAnswer { log, .. } => log,
            AgentStep::ParseFailure { raw_text, .. } => raw_text,
        }
    }
}

/// 解析 LLM 输出：Action/Action Input 与 Final Answer 二选一
pub fn parse_llm_output(text: &str) -> AgentStep {
    let action_re = ACTION_RE.get_or_init(|| {
        Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
            .expect("action regex")
    });
    let includes_answer = text.contains(FINAL_ANSWER);

    if let Some(caps) = action_re.captures(text) {
        if includes_answer {
            return AgentStep::ParseFailure {
                raw_text: text.to_string(),
                reason: BOTH_ACTION_AND_ANSWER.to_string(),
            };
        }
        let tool_name = caps.get(1).map_or("", |m| m.as_str()).trim();
        let tool_input = caps.get(2).map_or("", |m| m.as_str()).trim();
        let tool_input = tool_input.trim_matches('"');
        return AgentStep::ToolCall {
            tool_name: tool_name.to_string(),
            tool_input: tool_input.to_string(),
            log: text.to_string(),
        };
    }

    if let Some(idx) = text.find(FINAL_ANSWER) {
        return AgentStep::FinalAnswer {
            text: text[idx + FINAL_ANSWER.len()..].trim().to_string(),
            log: text.to_string(),
        };
    }

    let action_only = ACTION_ONLY_RE
        .get_or_init(|| Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)").expect("action-only regex"));
    let reason = if action_only.is_match(text) {
        MISSING_ACTION_INPUT
    } else {
        MISSING_ACTION
    };
    AgentStep::ParseFailure {
        raw_text: text.to_string(),
        reason: reason.to_string(),
    }
}

/// 已完成的一步：LLM 原文 + 对应的观察结果
#[derive(Debug, Clone)]
pub struct ScratchpadEntry {
    pub log: String,
    pub observation: Observation,
}

/// 拼接 scratchpad：每步原文后跟 Observation，再起一个 Thought
pub fn render_scratchpad(entries: &[ScratchpadEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push(' ');
        out.push_str(entry.log.trim());
        out.push_str("\nObservation: ");
        out.push_str(&entry.observation.to_string());
        out.push_str("\nThought:");
    }
    out
}

/// Planner：持有 LLM 与温度，负责拼 prompt 并解析一次推理
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// system 消息：说明、工具列表、语法、观察标签说明、对话摘要
    pub fn system_prompt(tools: &[(String, String)], summary: &str) -> String {
        let tool_lines = tools
            .iter()
            .map(|(name, desc)| format!("{name}: {desc}"))
            .collect::<Vec<_>>()
            .join("\n");
        let tool_names = tools
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let mut prompt = format!(
            "Answer the following questions as best you can. You have access to the following tools:\n\n\
             {tool_lines}\n\n\
             Use the following format:\n\n\
             Question: the input question you must answer\n\
             Thought: you should always think about what to do\n\
             Action: the action to take, should be one of [{tool_names}]\n\
             Action Input: the input to the action\n\
             Observation: the result of the action\n\
             ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
             Thought: I now know the final answer\n\
             Final Answer: the final answer to the original input question\n\n\
             Observations may start with a tag:\n\
             [disambiguation] the query matched several pages; pick one of the listed options and search again\n\
             [not found] nothing matched; try a different query\n\
             [tool error] / [timeout] the tool failed; retry or answer without it\n\
             [unknown tool] use one of the listed tools\n\
             [invalid format] your previous reply did not follow the format above\n\n\
             Never write both an Action and a Final Answer in the same reply."
        );
        if !summary.trim().is_empty() {
            prompt.push_str("\n\nSummary of the earlier conversation:\n");
            prompt.push_str(summary.trim());
        }
        prompt
    }

    /// 拼完整消息：system → 最近轮次 → Question + scratchpad + Thought:
    pub fn build_messages(
        &self,
        query: &str,
        memory: &MemoryView,
        tools: &[(String, String)],
        scratchpad: &[ScratchpadEntry],
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(Self::system_prompt(tools, &memory.summary))];
        messages.extend(memory.turn_messages());
        messages.push(Message::user(format!(
            "Question: {query}\nThought:{}",
            render_scratchpad(scratchpad)
        )));
        messages
    }

    /// 执行一次推理；LLM 调用失败返回 AgentError::Provider，格式错误返回 ParseFailure 步骤（不是错误）
    pub async fn plan(
        &self,
        query: &str,
        memory: &MemoryView,
        tools: &[(String, String)],
        scratchpad: &[ScratchpadEntry],
    ) -> Result<AgentStep, AgentError> {
        let request = CompletionRequest::new(self.build_messages(query, memory, tools, scratchpad))
            .with_stop(OBSERVATION_STOP)
            .with_temperature(self.temperature);
        let output = self.llm.complete(&request).await?;
        Ok(parse_llm_output(&output))
    }
}
