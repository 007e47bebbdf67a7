//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / invoke），由 ToolRegistry 按注册顺序保存、按名查找；
//! 推理步骤只能看到 (name, description)，真正的调用由 ToolExecutor 发起。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::RegistryError;

/// 工具内部失败；由编排层转为 Observation，不会让运行失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// 查询有多个候选（如维基百科消歧义页）
    #[error("\"{query}\" may refer to: {}", .options.join(", "))]
    Ambiguous { query: String, options: Vec<String> },

    #[error("Page not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),
}

/// 工具 trait：名称、描述（供 LLM 理解）、异步调用（输入为 Action Input 原文）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应 `Action:` 行）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    async fn invoke(&self, input: &str) -> Result<String, ToolError>;
}

/// 工具注册表：名称唯一，保持注册顺序
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            return Err(RegistryError::DuplicateName(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的工具段落
    pub fn list_all(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
