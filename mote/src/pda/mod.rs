//! PDA sub-agent engine (§4.8): drives an agent whose definition carries a
//! `steps` pipeline, over a stack of frames checkpointed into session
//! metadata between ticks.

mod engine;
mod route;
mod types;

pub use engine::PdaEngine;
pub use types::{AgentDef, Frame, Step};
