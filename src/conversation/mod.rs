//! Webhook-facing orchestration of the intake flow and inquiry mode.

pub mod notify;
pub mod service;

pub use notify::AdminNotifier;
pub use service::{ConversationDeps, ConversationService, is_restart};
