//! # Types
//!
//! Platform-agnostic types shared by the launcher, the debug engines, and the
//! control loop.

pub mod address;
pub mod process;

// Re-export all public types
pub use address::Address;
pub use process::{ProcessId, TargetExit};
