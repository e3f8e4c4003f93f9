//! Skill-graph execution engine (spec §4.H): DAG scheduling across three
//! concurrency modes, argument resolution, conditional/loop dispatch,
//! and per-run persistence via `skillflow-storage`.

pub mod argref;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod scheduler;

pub use context::RunState;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
