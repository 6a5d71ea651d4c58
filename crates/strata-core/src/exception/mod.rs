//! # Exceptions
//!
//! Structured error propagation for the whole core.
//!
//! Every fallible operation returns [`Result`], and callers that want to stop
//! an error from unwinding further wrap the work in
//! [`Session::protect`](crate::session::Session::protect) with a [`CatchMask`]
//! naming the categories they are prepared to absorb. Cleanup actions
//! registered along the way run on every exit path, innermost first.
//!
//! We use `thiserror` to generate `Error` trait implementations and display
//! messages.

pub mod catcher;

use thiserror::Error;

pub use catcher::{CleanupChain, CleanupMark};

/// Classification of a recoverable error.
///
/// The kind travels with the error instead of being encoded in the message so
/// that callers can branch on it without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind
{
    /// Anything without a more specific kind.
    Generic,
    /// The operation needs a live process and none is being debugged.
    NoProcess,
    /// The active target configuration cannot perform the operation.
    Unsupported,
    /// The target backend reported a failure.
    TargetFailure,
    /// A memory transfer could not reach the requested range.
    MemoryError,
    /// The caller passed an argument the core cannot act on.
    InvalidArgument,
    /// A target backend lost its connection mid-operation.
    TargetClose,
}

/// The two catchable exception categories.
///
/// Internal consistency failures deliberately have no category; no mask can
/// name them and no catcher absorbs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCategory
{
    /// Cancellation requested by the user.
    Quit,
    /// A recoverable error.
    Error,
}

impl std::fmt::Display for ExceptionCategory
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self {
            ExceptionCategory::Quit => write!(f, "quit"),
            ExceptionCategory::Error => write!(f, "error"),
        }
    }
}

/// Exception raised by core operations.
///
/// ## Taxonomy
///
/// 1. **Quit**: the user cancelled the operation. Absorbed only by catchers
///    whose mask includes [`CatchMask::QUIT`].
/// 2. **Error**: a recoverable error with a [`ErrorKind`] and a message for
///    the user. Absorbed by catchers whose mask includes [`CatchMask::ERROR`].
/// 3. **Internal**: an internal consistency failure. Never absorbed; it
///    unwinds through every protected region (running cleanups on the way)
///    and poisons the session it escaped from.
#[derive(Error, Debug, Clone)]
pub enum Exception
{
    /// The user asked the current operation to stop.
    #[error("Quit")]
    Quit,

    /// A recoverable error; the session survives it.
    #[error("{message}")]
    Error
    {
        /// Classification the caller can branch on.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },

    /// A broken invariant inside the core itself. The debugging session is
    /// over once one of these is raised.
    #[error("internal consistency failure: {0}")]
    Internal(String),
}

impl Exception
{
    /// Construct a cancellation exception.
    #[must_use]
    pub const fn quit() -> Self
    {
        Exception::Quit
    }

    /// Construct a recoverable error of the given kind.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self
    {
        Exception::Error {
            kind,
            message: message.into(),
        }
    }

    /// Construct an internal consistency failure.
    pub fn internal(message: impl Into<String>) -> Self
    {
        Exception::Internal(message.into())
    }

    /// The catchable category of this exception, if it has one.
    #[must_use]
    pub fn category(&self) -> Option<ExceptionCategory>
    {
        match self {
            Exception::Quit => Some(ExceptionCategory::Quit),
            Exception::Error { .. } => Some(ExceptionCategory::Error),
            Exception::Internal(_) => None,
        }
    }

    /// The error kind, for recoverable errors.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind>
    {
        match self {
            Exception::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this is a cancellation.
    #[must_use]
    pub fn is_quit(&self) -> bool
    {
        matches!(self, Exception::Quit)
    }

    /// Whether this is an internal consistency failure.
    #[must_use]
    pub fn is_internal(&self) -> bool
    {
        matches!(self, Exception::Internal(_))
    }
}

/// Convenience type alias for `Result<T, Exception>`
pub type Result<T> = std::result::Result<T, Exception>;

/// Mask of exception categories a protected region absorbs.
///
/// Combine masks with [`CatchMask::union`]. Internal consistency failures are
/// representable in no mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchMask(u8);

impl CatchMask
{
    /// Absorb cancellations.
    pub const QUIT: Self = CatchMask(1);
    /// Absorb recoverable errors.
    pub const ERROR: Self = CatchMask(1 << 1);
    /// Absorb both catchable categories.
    pub const ALL: Self = CatchMask(Self::QUIT.0 | Self::ERROR.0);

    /// Combine two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self
    {
        CatchMask(self.0 | other.0)
    }

    /// Whether the mask names the given category.
    #[must_use]
    pub const fn accepts(self, category: ExceptionCategory) -> bool
    {
        let bit = match category {
            ExceptionCategory::Quit => Self::QUIT.0,
            ExceptionCategory::Error => Self::ERROR.0,
        };
        self.0 & bit != 0
    }
}

/// Outcome of a protected region.
///
/// A region either produced its value or had an exception absorbed by its
/// mask. Exceptions the mask rejects never become a `Caught`; they keep
/// unwinding as `Err`.
#[derive(Debug)]
pub enum Caught<T>
{
    /// The body completed and produced a value.
    Ok(T),
    /// An exception was absorbed by the region's mask.
    Failed
    {
        /// Category of the absorbed exception.
        category: ExceptionCategory,
        /// The exception's display message.
        message: String,
    },
}

impl<T> Caught<T>
{
    /// The produced value, if the body completed.
    pub fn ok(self) -> Option<T>
    {
        match self {
            Caught::Ok(value) => Some(value),
            Caught::Failed { .. } => None,
        }
    }

    /// Whether an exception was absorbed.
    pub fn is_caught(&self) -> bool
    {
        matches!(self, Caught::Failed { .. })
    }

    /// The absorbed exception's message, if any.
    pub fn failure_message(&self) -> Option<&str>
    {
        match self {
            Caught::Ok(_) => None,
            Caught::Failed { message, .. } => Some(message),
        }
    }
}
