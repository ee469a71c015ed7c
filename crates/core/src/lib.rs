pub mod config;
pub mod entity;
pub mod error;
pub mod kinds;
pub mod manifest;
pub mod workflow;

pub use config::PipelineConfig;
pub use entity::*;
pub use error::*;
pub use kinds::*;
pub use workflow::{transition, IllegalTransition, WorkflowEvent};
