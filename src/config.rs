//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REACT_AGENT__*` 覆盖（双下划线表示嵌套，如 `REACT_AGENT__LLM__PROVIDER=openai`）。
//! 最后用旧版 .env 变量名（subscription_key / deployment / endpoint / api_version）补齐仍为空的凭据。
//! 启动时调用一次 validate()，之后配置不可变，按引用传入各组件构造函数。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;
use crate::memory::MemoryLimits;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub memory: MemorySection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
}

/// LLM 后端
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Azure,
    OpenAi,
    Mock,
}

/// [llm] 段：后端选择、凭据与温度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: LlmProvider,
    /// Azure 部署名
    pub deployment: Option<String>,
    /// Azure 端点，如 https://xxx.openai.azure.com
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub api_version: Option<String>,
    /// OpenAI 兼容端点的模型名
    pub model: String,
    /// OpenAI 兼容端点地址（为空时用官方地址）
    pub base_url: Option<String>,
    pub temperature: f32,
    /// 推理步之外的 LLM 请求（记忆摘要）超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            deployment: None,
            endpoint: None,
            api_key: None,
            api_version: None,
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            temperature: 0.0,
            request_timeout_secs: 60,
        }
    }
}

/// [memory] 段：摘要缓冲记忆预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    /// 原文轮次的 token 预算
    pub max_token_limit: usize,
    /// 原文保留的最大轮次数（10 = 5 问 5 答）
    pub max_turns: usize,
    pub summary_token_limit: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        let limits = MemoryLimits::default();
        Self {
            max_token_limit: limits.max_token_limit,
            max_turns: limits.max_turns,
            summary_token_limit: limits.summary_token_limit,
        }
    }
}

impl MemorySection {
    pub fn limits(&self) -> MemoryLimits {
        MemoryLimits {
            max_turns: self.max_turns,
            max_token_limit: self.max_token_limit,
            summary_token_limit: self.summary_token_limit,
        }
    }
}

/// 超时处理策略：retry 把超时当作可重试的观察结果，abort 直接终止本次运行
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    #[default]
    Retry,
    Abort,
}

/// [agent] 段：ReAct 循环上限与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单次提问最多推理步数（未给出最终回复的步数）
    pub max_iterations: usize,
    /// 单次提问允许的解析失败次数，超过即失败
    pub max_parse_retries: usize,
    pub reasoning_timeout_secs: u64,
    pub timeout_policy: TimeoutPolicy,
    /// 控制台是否实时打印 Thought / Action / Observation
    pub verbose: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            max_parse_retries: 3,
            reasoning_timeout_secs: 60,
            timeout_policy: TimeoutPolicy::default(),
            verbose: true,
        }
    }
}

/// [tools] 段：工具超时与 Wikipedia 参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub wikipedia: WikipediaSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            wikipedia: WikipediaSection::default(),
        }
    }
}

/// [tools.wikipedia] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WikipediaSection {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    /// 搜索取前几个标题（其余标题作为消歧义候选）
    pub search_results: usize,
}

impl Default for WikipediaSection {
    fn default() -> Self {
        Self {
            base_url: "https://en.wikipedia.org".to_string(),
            timeout_secs: 15,
            max_result_chars: 4000,
            search_results: 5,
        }
    }
}

/// 旧版 .env 变量名 → [llm] 字段
const LEGACY_ENV: [(&str, &str); 4] = [
    ("subscription_key", "api_key"),
    ("deployment", "deployment"),
    ("endpoint", "endpoint"),
    ("api_version", "api_version"),
];

impl AppConfig {
    /// 用外部变量补齐仍为空的凭据（lookup 通常是 std::env::var）
    pub fn fill_credentials_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let llm = &mut self.llm;
        for (var, field) in LEGACY_ENV {
            let slot = match field {
                "api_key" => &mut llm.api_key,
                "deployment" => &mut llm.deployment,
                "endpoint" => &mut llm.endpoint,
                _ => &mut llm.api_version,
            };
            if slot.as_deref().map_or(true, str::is_empty) {
                if let Some(v) = lookup(var).filter(|v| !v.is_empty()) {
                    *slot = Some(v);
                }
            }
        }
        if llm.provider == LlmProvider::OpenAi && llm.api_key.is_none() {
            llm.api_key = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty());
        }
    }

    /// 启动时校验：缺凭据或数值非法时返回 AgentError::Config（致命）
    pub fn validate(&self) -> Result<(), AgentError> {
        let mut problems = Vec::new();
        let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());

        match self.llm.provider {
            LlmProvider::Azure => {
                for (name, value) in [
                    ("llm.deployment (deployment)", &self.llm.deployment),
                    ("llm.endpoint (endpoint)", &self.llm.endpoint),
                    ("llm.api_key (subscription_key)", &self.llm.api_key),
                    ("llm.api_version (api_version)", &self.llm.api_version),
                ] {
                    if missing(value) {
                        problems.push(format!("missing {name}"));
                    }
                }
            }
            LlmProvider::OpenAi => {
                if missing(&self.llm.api_key) {
                    problems.push("missing llm.api_key (OPENAI_API_KEY)".to_string());
                }
                if self.llm.model.trim().is_empty() {
                    problems.push("llm.model must not be empty".to_string());
                }
            }
            LlmProvider::Mock => {}
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            problems.push(format!(
                "llm.temperature must be within [0, 2], got {}",
                self.llm.temperature
            ));
        }
        for (name, value) in [
            ("memory.max_turns", self.memory.max_turns),
            ("memory.max_token_limit", self.memory.max_token_limit),
            ("memory.summary_token_limit", self.memory.summary_token_limit),
            ("agent.max_iterations", self.agent.max_iterations),
            ("tools.wikipedia.max_result_chars", self.tools.wikipedia.max_result_chars),
            ("tools.wikipedia.search_results", self.tools.wikipedia.search_results),
        ] {
            if value == 0 {
                problems.push(format!("{name} must be positive"));
            }
        }
        for (name, value) in [
            ("llm.request_timeout_secs", self.llm.request_timeout_secs),
            ("agent.reasoning_timeout_secs", self.agent.reasoning_timeout_secs),
            ("tools.tool_timeout_secs", self.tools.tool_timeout_secs),
            ("tools.wikipedia.timeout_secs", self.tools.wikipedia.timeout_secs),
        ] {
            if value == 0 {
                problems.push(format!("{name} must be positive"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Config(problems.join("; ")))
        }
    }
}

/// 从 config 目录加载配置，环境变量 REACT_AGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REACT_AGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REACT_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.fill_credentials_from(|name| std::env::var(name).ok());
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, LlmProvider::Azure);
        assert_eq!(cfg.llm.temperature, 0.0);
        assert_eq!(cfg.memory.max_token_limit, 150);
        assert_eq!(cfg.memory.max_turns, 10);
        assert_eq!(cfg.agent.max_iterations, 15);
        assert_eq!(cfg.agent.timeout_policy, TimeoutPolicy::Retry);
        assert_eq!(cfg.tools.wikipedia.base_url, "https://en.wikipedia.org");
    }

    #[test]
    fn test_validate_reports_missing_azure_credentials() {
        let cfg = AppConfig::default();
        let err = cfg.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("llm.deployment"));
        assert!(msg.contains("subscription_key"));
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_fill_credentials_from_legacy_names() {
        let env: HashMap<&str, &str> = [
            ("subscription_key", "secret"),
            ("deployment", "gpt-4o"),
            ("endpoint", "https://example.openai.azure.com"),
            ("api_version", "2024-06-01"),
        ]
        .into_iter()
        .collect();
        let mut cfg = AppConfig::default();
        cfg.llm.deployment = Some("from-file".to_string());
        cfg.fill_credentials_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.llm.api_key.as_deref(), Some("secret"));
        // 已配置的值不被覆盖
        assert_eq!(cfg.llm.deployment.as_deref(), Some("from-file"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_mock_and_limits() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = LlmProvider::Mock;
        assert!(cfg.validate().is_ok());

        cfg.agent.max_iterations = 0;
        cfg.llm.temperature = 3.0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("agent.max_iterations"));
        assert!(msg.contains("llm.temperature"));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
provider = "mock"

[memory]
max_turns = 4

[agent]
timeout_policy = "abort"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, LlmProvider::Mock);
        assert_eq!(cfg.memory.max_turns, 4);
        assert_eq!(cfg.agent.timeout_policy, TimeoutPolicy::Abort);
        assert_eq!(cfg.agent.max_iterations, 15);
    }
}
