//! Date Time 工具：返回当前本地时间（ISO-8601），忽略输入，永不失败

use async_trait::async_trait;
use chrono::{Local, SecondsFormat};

use crate::tools::{Tool, ToolError};

pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn name(&self) -> &str {
        "Date Time"
    }

    fn description(&self) -> &str {
        "Useful for checking the current date and time. Input is ignored."
    }

    async fn invoke(&self, _input: &str) -> Result<String, ToolError> {
        Ok(Local::now().to_rfc3339_opts(SecondsFormat::Micros, false))
    }
}
