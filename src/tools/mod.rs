//! 工具箱：注册表、执行器与两个内置工具（Date Time / Wikipedia）

pub mod clock;
pub mod executor;
pub mod registry;
pub mod wikipedia;

pub use clock::ClockTool;
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolError, ToolRegistry};
pub use wikipedia::WikipediaTool;
