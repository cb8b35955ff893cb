//! Intake conversation state machine.
//!
//! - `step`: step and mode enums
//! - `validators`: pure input checks
//! - `registry`: step definitions and transitions
//! - `session`: per-user record and lifecycle
//! - `engine`: advance one step

pub mod engine;
pub mod registry;
pub mod session;
pub mod step;
pub mod validators;

pub use engine::{Advanced, advance};
pub use registry::{MenuOption, StepDef, StepRegistry, Transition};
pub use session::Session;
pub use step::{Mode, Step};
pub use validators::{Answer, Validator};
