//! Mock LLM 客户端（无需 API）
//!
//! - MockLlmClient：`provider = "mock"` 时使用，直接给出 Final Answer 回显问题，便于离线跑通 CLI。
//! - ScriptedLlmClient：按顺序回放预设输出并记录请求，供测试驱动 ReAct 循环。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{apply_stop, CompletionRequest, LlmClient, LlmError};
use crate::memory::Role;

/// Mock 客户端：回显最后一条 User 消息中的 Question
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        let question = last_user
            .lines()
            .find_map(|l| l.strip_prefix("Question:"))
            .map(str::trim)
            .unwrap_or(last_user);

        Ok(format!(
            "Thought: I am running offline.\nFinal Answer: Echo from Mock: {question}"
        ))
    }
}

/// 回放式客户端：每次 complete 弹出一条预设结果；耗尽后返回 EmptyResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    /// 可选：每次调用前等待，用于超时测试
    delay: Option<Duration>,
    /// 预设耗尽后重复最后一条成功输出（用于「永远调用工具」的场景）
    repeat_last: bool,
    last: Mutex<Option<String>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(outputs.into_iter().map(|s| Ok(s.into())).collect()),
            ..Self::default()
        }
    }

    /// 追加一条失败结果
    pub fn then_error(self, err: LlmError) -> Self {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(Err(err));
        }
        self
    }

    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(request.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        let out = match next {
            Some(result) => result?,
            None if self.repeat_last => self
                .last
                .lock()
                .ok()
                .and_then(|l| l.clone())
                .ok_or(LlmError::EmptyResponse)?,
            None => return Err(LlmError::EmptyResponse),
        };
        if let Ok(mut l) = self.last.lock() {
            *l = Some(out.clone());
        }
        Ok(apply_stop(&out, &request.stop))
    }
}
