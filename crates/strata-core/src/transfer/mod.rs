//! # Object Transfer
//!
//! One generic operation moves bytes of a target-side object over a region
//! `[offset, offset + len)`, in either direction. Targets answer with an
//! [`XferChunk`] describing how far they got; the stack walk folds those
//! into a [`TransferStatus`] with exactly three shapes: the whole request
//! moved, a shorter prefix moved (the caller loops), or the request failed
//! with a typed reason.
//!
//! `Complete(0)` is reserved for one meaning: the object ends at this
//! offset. A transfer that moves bytes always reports a positive count.

use thiserror::Error;

use crate::exception::{ErrorKind, Exception};

pub mod dcache;
pub mod sections;

pub use dcache::DataCache;
pub use sections::{Section, SectionTable};

/// Kind of target-side object a transfer addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferObject
{
    /// The inferior's address space; `offset` is the address.
    Memory,
    /// The ELF auxiliary vector of a live process.
    AuxVector,
    /// Target description data, selected by annex.
    Features,
    /// Flash memory, written through erase-aware backends.
    Flash,
}

impl std::fmt::Display for TransferObject
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let name = match self {
            TransferObject::Memory => "memory",
            TransferObject::AuxVector => "auxiliary vector",
            TransferObject::Features => "target features",
            TransferObject::Flash => "flash",
        };
        write!(f, "{name}")
    }
}

/// Direction and buffer of one transfer request.
#[derive(Debug)]
pub enum TransferIo<'a>
{
    /// Read from the target into the buffer.
    Read(&'a mut [u8]),
    /// Write the bytes to the target.
    Write(&'a [u8]),
}

impl TransferIo<'_>
{
    /// Requested length in bytes.
    #[must_use]
    pub fn len(&self) -> usize
    {
        match self {
            TransferIo::Read(buf) => buf.len(),
            TransferIo::Write(bytes) => bytes.len(),
        }
    }

    /// Whether the request is zero-length.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.len() == 0
    }

    /// A fresh request over the same buffer, so one request can be offered
    /// to several targets in turn.
    pub fn reborrow(&mut self) -> TransferIo<'_>
    {
        match self {
            TransferIo::Read(buf) => TransferIo::Read(&mut **buf),
            TransferIo::Write(bytes) => TransferIo::Write(*bytes),
        }
    }
}

/// One target's answer to a transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferChunk
{
    /// Moved this many bytes; always positive.
    Bytes(usize),
    /// The object ends at this offset as far as this target is concerned.
    Eof,
    /// This target cannot serve the object at all; ask the next layer.
    Unsupported,
}

/// Why a transfer produced no bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError
{
    /// No active target serves this object kind.
    #[error("the {0} object is not supported by any active target")]
    Unsupported(TransferObject),
    /// Every layer was consulted and none could serve the region.
    #[error("Cannot access memory at address {offset:#x}")]
    Exhausted
    {
        /// The object that was being transferred.
        object: TransferObject,
        /// Where the transfer stopped.
        offset: u64
    },
}

impl From<TransferError> for Exception
{
    fn from(error: TransferError) -> Self
    {
        let kind = match error {
            TransferError::Unsupported(_) => ErrorKind::Unsupported,
            TransferError::Exhausted { .. } => ErrorKind::MemoryError,
        };
        Exception::error(kind, error.to_string())
    }
}

/// Outcome of one transfer request against the whole stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus
{
    /// The full request moved, or (`Complete(0)`) the object is exhausted.
    Complete(usize),
    /// A positive prefix moved; the caller should loop for the rest.
    Partial(usize),
    /// Nothing moved and nothing will; the reason says why.
    Failed(TransferError),
}

impl TransferStatus
{
    /// Bytes actually moved by this request.
    #[must_use]
    pub const fn bytes_moved(&self) -> usize
    {
        match self {
            TransferStatus::Complete(n) | TransferStatus::Partial(n) => *n,
            TransferStatus::Failed(_) => 0,
        }
    }
}
