//! # Types
//!
//! Backend-agnostic types used throughout the core.
//!
//! These types abstract away backend-specific details, allowing the rest of
//! the core to work with concepts like "thread", "address", and "register
//! number" without knowing which target implementation is active.

pub mod address;
pub mod registers;
pub mod thread;

// Re-export all public types
pub use address::Address;
pub use registers::{ByteOrder, RegisterBytes, RegisterClass, RegisterGroup, RegisterId, RegisterStatus};
pub use thread::{ProcessId, ThreadId};
