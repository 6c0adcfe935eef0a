//! Mote: a local, long-running AI agent runtime. Owns session state, the
//! per-session run queue, the orchestration loop (standard tool-calling and
//! ACP variants), the PDA sub-agent engine, and context compaction. Transport
//! (HTTP/SSE/WebSocket) lives in the separate `mote-serve` crate, which talks
//! to this crate only through [`session::SessionManager`] and
//! [`queue::RunQueue`].

pub mod compactor;
pub mod config;
pub mod error;
pub mod events;
pub mod hooks;
pub mod message;
pub mod orchestrator;
pub mod pda;
pub mod policy;
pub mod prompt;
pub mod provider;
pub mod queue;
pub mod session;
pub mod storage;
pub mod tools;

pub use config::EngineConfig;
pub use error::EngineError;
pub use message::{Message, Role, ToolCall};
pub use session::{Scenario, Session, SessionManager};
