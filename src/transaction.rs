//! Registry calls, signed transactions, receipts and input validation.

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::*;
