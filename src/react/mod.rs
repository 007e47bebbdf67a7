//! 认知层：Planner（prompt + 输出解析）、ReAct 主循环、过程事件

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::ReactEvent;
pub use loop_::{react_loop, AgentLimits, ReactSession};
pub use planner::{parse_llm_output, AgentStep, Planner, ScratchpadEntry};
