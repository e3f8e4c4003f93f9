//! Session lifecycle and draft projection (spec §4.F).

pub mod draft;
pub mod error;
pub mod manager;

pub use draft::{to_skill_draft, ExposeParamSpec, LogSelection};
pub use error::{RecordingError, RecordingResult};
pub use manager::RecordingManager;
