//! 核心编排层：错误与恢复、运行状态、主控编排器

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use error::{AgentError, RecoveryAction, RegistryError};
pub use orchestrator::{create_llm_from_config, Orchestrator};
pub use recovery::RecoveryEngine;
pub use state::{AgentPhase, AgentRun, Observation, ObservationKind, RunStatus};
