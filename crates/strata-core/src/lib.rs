//! # strata-core
//!
//! Inferior control primitives for Strata: the target stack, register
//! caches, object transfer, and the exception machinery that keeps a
//! debugging session alive through failures.
//!
//! The crate is built as layers that only meet inside a [`Session`]:
//! - [`target`]: the stratum-ordered target stack and operation dispatch
//! - [`regcache`]: per-thread register caches over an [`arch::Arch`]
//! - [`transfer`]: object transfer, the memory line cache, and image sections
//! - [`exception`]: catchable exceptions, catcher frames, and cleanup chains
//!
//! ## Threading
//!
//! A session is single-threaded by design. Nothing in this crate locks;
//! callers that want concurrency put the whole session behind their own
//! synchronization.

pub mod arch;
pub mod exception;
pub mod prelude;
pub mod regcache;
pub mod session;
pub mod target;
pub mod transfer;
pub mod types;

pub use exception::{CatchMask, Caught, ErrorKind, Exception, Result};
// Re-export commonly used types
pub use session::{Session, SessionConfig};
pub use types::{Address, ProcessId, RegisterId, ThreadId};
