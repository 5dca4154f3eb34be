//! Testing support: a recording host adapter and a headless harness.

pub mod harness;
pub mod host;

pub use harness::Harness;
pub use host::{HostOp, TestHost};
