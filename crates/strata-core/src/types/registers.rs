//! Register numbering and classification types.

use smallvec::SmallVec;

/// Inline-capacity byte buffer for a single register value.
///
/// Most registers are at most 16 bytes (vector registers included), so reads
/// usually avoid a heap allocation.
pub type RegisterBytes = SmallVec<[u8; 16]>;

/// Register number within an architecture's register file.
///
/// Numbers below the architecture's raw register count name raw registers,
/// the ones a target backend actually fetches and stores. Numbers from there
/// up to the total count name cooked registers, which are composed from raw
/// registers by the architecture and never touch a target directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(pub usize);

impl RegisterId
{
    /// Get the raw index of this register number.
    #[must_use]
    pub const fn index(self) -> usize
    {
        self.0
    }
}

impl From<usize> for RegisterId
{
    fn from(value: usize) -> Self
    {
        Self(value)
    }
}

/// Validity state of one register slot in a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterStatus
{
    /// Nothing cached; a read must fetch from the target first.
    Unknown,
    /// The cached bytes are current for the owning thread.
    Cached,
    /// The architecture declares this register unfetchable. The slot holds a
    /// synthesized zero value and no fetch is ever issued for it.
    PermanentlyUnavailable,
}

/// Byte order of the debugged architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder
{
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// Broad classification of a register, used for default group membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass
{
    /// General-purpose integer register.
    General,
    /// Floating-point register.
    FloatingPoint,
    /// Vector register.
    Vector,
    /// Status or control register (flags, processor state).
    Status,
}

/// Named register groupings used by bulk operations.
///
/// `Save` and `Restore` select which registers participate in snapshot
/// save/restore; the default membership rule admits raw registers only, since
/// cooked values are recomputed from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterGroup
{
    /// Every register.
    All,
    /// General-purpose registers.
    General,
    /// Floating-point and vector registers.
    Float,
    /// Status and control registers.
    System,
    /// Registers captured by a snapshot save.
    Save,
    /// Registers written back by a snapshot restore.
    Restore,
}
