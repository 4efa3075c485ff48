// Thin re-export module: the transport contract lives in `chain/transport.rs`,
// the in-process development chain in `chain/local.rs`.

pub mod block;
pub mod local;
pub mod transport;

pub use block::*;
pub use local::*;
pub use transport::*;
