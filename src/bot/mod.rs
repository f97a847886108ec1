//! Conversational front end: commands in, text and charts out.

pub mod dispatcher;
pub mod session;

pub use crate::delivery::ConversationId;
pub use dispatcher::Dispatcher;
pub use session::{ConversationState, SessionStore};
