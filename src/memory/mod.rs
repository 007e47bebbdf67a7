//! 记忆层：对话消息/轮次、token 估算、渐进式摘要、摘要缓冲记忆

pub mod conversation;
pub mod summarizer;
pub mod summary_buffer;
pub mod token_budget;

pub use conversation::{Message, Role, Turn, TurnRole};
pub use summarizer::{LlmSummarizer, Summarizer};
pub use summary_buffer::{CompactionReport, MemoryDelta, MemoryLimits, MemoryView, SummaryBufferMemory};
pub use token_budget::{truncate_to_tokens, TokenEstimator};
