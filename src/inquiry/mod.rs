//! Inquiry mode: open questions after (or instead of) the intake flow.
//!
//! Every message is charged against a per-user quota, then answered by the
//! first source that applies: greeting, human-contact request, FAQ preset,
//! topic keyword, and finally the AI.

pub mod dispatcher;
pub mod intent;
pub mod keywords;
pub mod presets;
pub mod quota;

pub use dispatcher::{AnswerSource, InquiryDispatcher, InquiryReply};
pub use keywords::KeywordTable;
pub use presets::PresetTable;
pub use quota::{QuotaDecision, QuotaPolicy, QuotaState, QuotaWindow};
