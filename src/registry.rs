// Thin re-export module: the registry's record types, state machine and
// revert reasons live in `registry/`.

pub mod document;
pub mod revert;
pub mod state;

pub use document::*;
pub use revert::*;
pub use state::*;
