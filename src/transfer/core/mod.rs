//! Transfer protocol core
//!
//! - `frame`: control messages and payload boundary handling
//! - `error`: failure taxonomy shared by both ends
//! - `store`: the served directory and its path containment rules

mod error;
pub mod frame;
mod store;

pub use error::{FailureKind, TransferError};
pub use frame::{Reply, TransferRequest};
pub use store::{FileStore, StoredFile, is_plain_name};
