//! Entry point for the e2e suite under `tests/e2e/`; each file there is a
//! submodule rather than its own cargo test binary, matching the grouping
//! the teacher's (undiscovered) `tests/e2e/` layout aimed for.

mod e2e {
    mod common;
    mod ws_chat;
}
