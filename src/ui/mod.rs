//! 交互层：基于 stdin/stdout 的 ReAct 控制台

pub mod console;

pub use console::{run_console, run_console_with_interrupt};
