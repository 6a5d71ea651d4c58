//! # Architecture Contract
//!
//! The interface an architecture description implements so the register cache
//! can size, name, and classify registers without knowing the concrete
//! machine.
//!
//! Concrete architecture descriptions (register layouts, calling conventions)
//! live outside this crate; tests implement the trait with a small synthetic
//! machine.

use crate::exception::{ErrorKind, Exception, Result};
use crate::types::{ByteOrder, RegisterClass, RegisterGroup, RegisterId};

/// Raw-register view handed to cooked register composition functions.
///
/// Reads and writes issued through this view go through the per-thread cache
/// and its lazy-fetch machinery, so a composition function that touches three
/// raw registers costs at most three fetches, and usually zero.
pub trait RawRegisterAccess
{
    /// Read a raw register's bytes into `buf` (exactly the register's size).
    fn read_raw(&mut self, reg: RegisterId, buf: &mut [u8]) -> Result<()>;

    /// Write a raw register from `bytes` (exactly the register's size).
    fn write_raw(&mut self, reg: RegisterId, bytes: &[u8]) -> Result<()>;
}

/// Description of a debugged architecture.
///
/// Register numbers `0..raw_register_count()` are raw registers, fetched from
/// and stored to targets. Numbers `raw_register_count()..register_count()`
/// are cooked registers, composed from raw ones by
/// [`pseudo_register_read`](Arch::pseudo_register_read) and decomposed by
/// [`pseudo_register_write`](Arch::pseudo_register_write).
pub trait Arch
{
    /// Short architecture name for logs and errors.
    fn name(&self) -> &str;

    /// Byte order of register and memory contents.
    fn byte_order(&self) -> ByteOrder;

    /// Total number of registers, raw and cooked.
    fn register_count(&self) -> usize;

    /// Number of raw registers; also the first cooked register number.
    fn raw_register_count(&self) -> usize;

    /// Name of a register, for diagnostics.
    fn register_name(&self, reg: RegisterId) -> &str;

    /// Size of a register's value in bytes.
    fn register_size(&self, reg: RegisterId) -> usize;

    /// Broad classification of a register.
    fn register_class(&self, _reg: RegisterId) -> RegisterClass
    {
        RegisterClass::General
    }

    /// Whether a raw register can never be fetched from a target.
    ///
    /// Such registers are synthesized as zeros by the cache and no fetch is
    /// issued for them.
    fn cannot_fetch(&self, _reg: RegisterId) -> bool
    {
        false
    }

    /// Whether a raw register can never be stored to a target. Writes to such
    /// registers are silent no-ops.
    fn cannot_store(&self, _reg: RegisterId) -> bool
    {
        false
    }

    /// Whether a register belongs to a named group.
    ///
    /// The default rule: `All` admits everything; `Save` and `Restore` admit
    /// raw registers only (cooked values are recomputed from them); the rest
    /// match on [`register_class`](Arch::register_class).
    fn register_in_group(&self, reg: RegisterId, group: RegisterGroup) -> bool
    {
        match group {
            RegisterGroup::All => true,
            RegisterGroup::Save | RegisterGroup::Restore => reg.index() < self.raw_register_count(),
            RegisterGroup::General => self.register_class(reg) == RegisterClass::General,
            RegisterGroup::Float => {
                matches!(self.register_class(reg), RegisterClass::FloatingPoint | RegisterClass::Vector)
            }
            RegisterGroup::System => self.register_class(reg) == RegisterClass::Status,
        }
    }

    /// Compose a cooked register's value from raw registers.
    ///
    /// `buf` has exactly the cooked register's size. Implementations read the
    /// raw registers they need through `raw`.
    fn pseudo_register_read(&self, raw: &mut dyn RawRegisterAccess, reg: RegisterId, buf: &mut [u8]) -> Result<()>
    {
        let _ = (raw, buf);
        Err(Exception::internal(format!(
            "architecture {} declares cooked register {} but provides no composition",
            self.name(),
            reg.index()
        )))
    }

    /// Decompose a cooked register write into raw register writes.
    fn pseudo_register_write(&self, raw: &mut dyn RawRegisterAccess, reg: RegisterId, bytes: &[u8]) -> Result<()>
    {
        let _ = (raw, bytes);
        Err(Exception::internal(format!(
            "architecture {} declares cooked register {} but provides no decomposition",
            self.name(),
            reg.index()
        )))
    }
}

/// Extract an unsigned integer from register or memory bytes.
///
/// Values wider than 8 bytes cannot be represented; asking for one is a
/// caller error, not a truncation.
pub fn extract_unsigned(bytes: &[u8], order: ByteOrder) -> Result<u64>
{
    if bytes.len() > 8 {
        return Err(Exception::error(
            ErrorKind::InvalidArgument,
            "That operation is not available on integers of more than 8 bytes.",
        ));
    }
    let mut value: u64 = 0;
    match order {
        ByteOrder::Big => {
            for byte in bytes {
                value = (value << 8) | u64::from(*byte);
            }
        }
        ByteOrder::Little => {
            for byte in bytes.iter().rev() {
                value = (value << 8) | u64::from(*byte);
            }
        }
    }
    Ok(value)
}

/// Extract a sign-extended integer from register or memory bytes.
pub fn extract_signed(bytes: &[u8], order: ByteOrder) -> Result<i64>
{
    let unsigned = extract_unsigned(bytes, order)?;
    let bits = bytes.len() * 8;
    if bits == 0 || bits >= 64 {
        #[allow(clippy::cast_possible_wrap)]
        return Ok(unsigned as i64);
    }
    let sign = 1u64 << (bits - 1);
    #[allow(clippy::cast_possible_wrap)]
    Ok(((unsigned ^ sign).wrapping_sub(sign)) as i64)
}

/// Store an unsigned integer into a byte buffer of arbitrary width.
///
/// The value is truncated to the buffer's width, matching what a register
/// move of a wider value onto a narrower register does.
pub fn store_unsigned(buf: &mut [u8], order: ByteOrder, value: u64)
{
    let mut remaining = value;
    match order {
        ByteOrder::Little => {
            for slot in buf.iter_mut() {
                *slot = (remaining & 0xff) as u8;
                remaining >>= 8;
            }
        }
        ByteOrder::Big => {
            for slot in buf.iter_mut().rev() {
                *slot = (remaining & 0xff) as u8;
                remaining >>= 8;
            }
        }
    }
}
