//! Refi Assist: a Messenger chatbot that collects home-loan details,
//! estimates refinancing savings and answers follow-up questions.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod flow;
pub mod inquiry;
pub mod llm;
pub mod locale;
pub mod savings;
pub mod store;
