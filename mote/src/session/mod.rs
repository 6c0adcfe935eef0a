//! Session manager: cached, persisted conversational state.

mod cache;
mod manager;
mod store;
mod types;

pub use cache::{CachedSession, SessionCache};
pub use manager::SessionManager;
pub use store::{SessionStore, SqliteSessionStore};
pub use types::{Run, RunState, Scenario, Session};
