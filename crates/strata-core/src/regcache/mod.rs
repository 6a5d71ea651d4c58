//! # Register Cache
//!
//! Byte storage for one thread's register file plus a per-register validity
//! tag. The cache itself is deliberately passive: it never talks to a
//! target. The session layer decides when a fetch is needed, routes it
//! through the target stack, and the target answers by calling back into
//! the cache through [`RegisterSink`].
//!
//! A live cache holds raw registers only; cooked values are recomputed from
//! raw ones on every read. A read-only cache (a snapshot) may hold both and
//! answers purely from what was saved into it.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::arch::Arch;
use crate::exception::{ErrorKind, Exception, Result};
use crate::types::{RegisterBytes, RegisterGroup, RegisterId, RegisterStatus};

pub mod layout;

pub use layout::{RegcacheLayout, MAX_REGISTER_SIZE};

/// Receiver of register bytes during a fetch.
///
/// Targets answering a fetch call [`supply`](RegisterSink::supply) once per
/// register they know; registers they cannot produce are simply skipped.
pub trait RegisterSink
{
    /// Record the current bytes of `reg`.
    fn supply(&mut self, reg: RegisterId, bytes: &[u8]) -> Result<()>;
}

/// Provider of register bytes during a store.
pub trait RegisterSource
{
    /// Copy the pending bytes of `reg` into `buf`.
    fn collect(&self, reg: RegisterId, buf: &mut [u8]) -> Result<()>;
}

/// Per-thread register storage with validity tracking.
pub struct Regcache
{
    layout: Arc<RegcacheLayout>,
    registers: Vec<u8>,
    status: Vec<RegisterStatus>,
    readonly: bool,
}

impl std::fmt::Debug for Regcache
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let cached = self
            .status
            .iter()
            .filter(|status| **status == RegisterStatus::Cached)
            .count();
        f.debug_struct("Regcache")
            .field("registers", &self.layout.register_count())
            .field("cached", &cached)
            .field("readonly", &self.readonly)
            .finish()
    }
}

impl Regcache
{
    /// Create a live cache for one thread.
    ///
    /// Raw registers the architecture marks unfetchable are synthesized as
    /// zeros up front and tagged so no fetch is ever issued for them.
    pub(crate) fn new_live(layout: Arc<RegcacheLayout>, arch: &dyn Arch) -> Regcache
    {
        let mut status = vec![RegisterStatus::Unknown; layout.register_count()];
        for index in 0..layout.raw_register_count() {
            if arch.cannot_fetch(RegisterId(index)) {
                status[index] = RegisterStatus::PermanentlyUnavailable;
            }
        }
        Regcache {
            registers: vec![0; layout.total_bytes()],
            status,
            layout,
            readonly: false,
        }
    }

    /// Create an empty read-only snapshot shell, to be filled by
    /// [`save_from`](Regcache::save_from).
    pub(crate) fn new_readonly(layout: Arc<RegcacheLayout>) -> Regcache
    {
        Regcache {
            registers: vec![0; layout.total_bytes()],
            status: vec![RegisterStatus::Unknown; layout.register_count()],
            layout,
            readonly: true,
        }
    }

    /// Whether this cache is a frozen snapshot.
    #[must_use]
    pub const fn is_readonly(&self) -> bool
    {
        self.readonly
    }

    /// Validity tag of `reg`, out-of-range numbers reading as unknown.
    #[must_use]
    pub fn status(&self, reg: RegisterId) -> RegisterStatus
    {
        self.status
            .get(reg.index())
            .copied()
            .unwrap_or(RegisterStatus::Unknown)
    }

    /// Read a register's bytes out of the cache.
    ///
    /// Answers purely from storage: a register never supplied is an error,
    /// a permanently unavailable one reads as its synthesized zeros.
    pub fn read(&self, reg: RegisterId) -> Result<RegisterBytes>
    {
        self.layout.validate(reg)?;
        match self.status[reg.index()] {
            RegisterStatus::Unknown => Err(Exception::error(
                ErrorKind::Generic,
                format!("register {} is not available in this register cache", reg.index()),
            )),
            RegisterStatus::Cached | RegisterStatus::PermanentlyUnavailable => {
                Ok(SmallVec::from_slice(self.slice(reg)))
            }
        }
    }

    /// Store bytes for `reg` and mark it cached.
    pub(crate) fn record(&mut self, reg: RegisterId, bytes: &[u8]) -> Result<()>
    {
        self.layout.validate(reg)?;
        let size = self.layout.register_size(reg);
        if bytes.len() != size {
            return Err(Exception::internal(format!(
                "supplying {} bytes for register {} of {size} bytes",
                bytes.len(),
                reg.index()
            )));
        }
        self.slice_mut(reg).copy_from_slice(bytes);
        self.status[reg.index()] = RegisterStatus::Cached;
        Ok(())
    }

    /// Copy a register's bytes into `buf`. The register must be valid.
    pub(crate) fn collect_into(&self, reg: RegisterId, buf: &mut [u8]) -> Result<()>
    {
        self.layout.validate(reg)?;
        let size = self.layout.register_size(reg);
        if buf.len() != size {
            return Err(Exception::internal(format!(
                "collecting {} bytes from register {} of {size} bytes",
                buf.len(),
                reg.index()
            )));
        }
        if self.status[reg.index()] == RegisterStatus::Unknown {
            return Err(Exception::internal(format!(
                "collecting register {} that was never supplied",
                reg.index()
            )));
        }
        buf.copy_from_slice(self.slice(reg));
        Ok(())
    }

    /// Whether `reg` is cached with exactly these bytes.
    pub(crate) fn equals(&self, reg: RegisterId, bytes: &[u8]) -> bool
    {
        self.status(reg) == RegisterStatus::Cached && self.slice(reg) == bytes
    }

    /// Populate a snapshot by pulling each save-group register through
    /// `read`.
    ///
    /// The callback reports whether it produced a value; a register it
    /// declines stays unknown and is skipped when the snapshot is restored.
    pub(crate) fn save_from(
        &mut self,
        arch: &dyn Arch,
        mut read: impl FnMut(RegisterId, &mut [u8]) -> Result<bool>,
    ) -> Result<()>
    {
        if !self.readonly {
            return Err(Exception::internal("saving registers into a live register cache"));
        }
        let mut buf = [0u8; MAX_REGISTER_SIZE];
        for index in 0..self.layout.register_count() {
            let reg = RegisterId(index);
            if !arch.register_in_group(reg, RegisterGroup::Save) {
                continue;
            }
            let size = self.layout.register_size(reg);
            if read(reg, &mut buf[..size])? {
                self.record(reg, &buf[..size])?;
            }
        }
        Ok(())
    }

    /// The layout this cache was built against.
    #[must_use]
    pub(crate) fn layout(&self) -> &Arc<RegcacheLayout>
    {
        &self.layout
    }

    fn slice(&self, reg: RegisterId) -> &[u8]
    {
        let offset = self.layout.offset(reg);
        &self.registers[offset..offset + self.layout.register_size(reg)]
    }

    fn slice_mut(&mut self, reg: RegisterId) -> &mut [u8]
    {
        let offset = self.layout.offset(reg);
        let size = self.layout.register_size(reg);
        &mut self.registers[offset..offset + size]
    }
}

impl RegisterSink for Regcache
{
    fn supply(&mut self, reg: RegisterId, bytes: &[u8]) -> Result<()>
    {
        if self.readonly {
            return Err(Exception::internal("supplying a read-only register cache"));
        }
        self.record(reg, bytes)
    }
}

impl RegisterSource for Regcache
{
    fn collect(&self, reg: RegisterId, buf: &mut [u8]) -> Result<()>
    {
        self.collect_into(reg, buf)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::ByteOrder;

    struct PairArch;

    impl Arch for PairArch
    {
        fn name(&self) -> &str
        {
            "pair"
        }

        fn byte_order(&self) -> ByteOrder
        {
            ByteOrder::Little
        }

        fn register_count(&self) -> usize
        {
            3
        }

        fn raw_register_count(&self) -> usize
        {
            2
        }

        fn register_name(&self, reg: RegisterId) -> &str
        {
            ["a", "b", "ab"][reg.index()]
        }

        fn register_size(&self, reg: RegisterId) -> usize
        {
            if reg.index() < 2 { 4 } else { 8 }
        }

        fn cannot_fetch(&self, reg: RegisterId) -> bool
        {
            reg.index() == 1
        }
    }

    fn layout() -> Arc<RegcacheLayout>
    {
        RegcacheLayout::new(&PairArch).unwrap()
    }

    #[test]
    fn test_record_then_read_round_trips()
    {
        let mut cache = Regcache::new_live(layout(), &PairArch);
        cache.record(RegisterId(0), &[1, 2, 3, 4]).unwrap();
        assert_eq!(cache.status(RegisterId(0)), RegisterStatus::Cached);
        assert_eq!(cache.read(RegisterId(0)).unwrap().as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_unfetchable_register_reads_as_zeros()
    {
        let cache = Regcache::new_live(layout(), &PairArch);
        assert_eq!(cache.status(RegisterId(1)), RegisterStatus::PermanentlyUnavailable);
        assert_eq!(cache.read(RegisterId(1)).unwrap().as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_register_read_is_an_error()
    {
        let cache = Regcache::new_live(layout(), &PairArch);
        assert!(cache.read(RegisterId(0)).is_err());
    }

    #[test]
    fn test_record_rejects_wrong_size()
    {
        let mut cache = Regcache::new_live(layout(), &PairArch);
        let error = cache.record(RegisterId(0), &[1, 2]).unwrap_err();
        assert!(error.is_internal());
    }

    #[test]
    fn test_equals_only_matches_cached_bytes()
    {
        let mut cache = Regcache::new_live(layout(), &PairArch);
        assert!(!cache.equals(RegisterId(0), &[9, 9, 9, 9]));
        cache.record(RegisterId(0), &[9, 9, 9, 9]).unwrap();
        assert!(cache.equals(RegisterId(0), &[9, 9, 9, 9]));
        assert!(!cache.equals(RegisterId(0), &[9, 9, 9, 8]));
    }

    #[test]
    fn test_save_from_fills_raw_save_group_only()
    {
        let mut snapshot = Regcache::new_readonly(layout());
        snapshot
            .save_from(&PairArch, |reg, buf| {
                buf.fill(reg.index() as u8 + 1);
                Ok(true)
            })
            .unwrap();
        // The default save group admits raw registers only.
        assert_eq!(snapshot.status(RegisterId(0)), RegisterStatus::Cached);
        assert_eq!(snapshot.status(RegisterId(1)), RegisterStatus::Cached);
        assert_eq!(snapshot.status(RegisterId(2)), RegisterStatus::Unknown);
        assert_eq!(snapshot.read(RegisterId(1)).unwrap().as_slice(), &[2, 2, 2, 2]);
    }

    #[test]
    fn test_save_from_skips_declined_registers()
    {
        let mut snapshot = Regcache::new_readonly(layout());
        snapshot
            .save_from(&PairArch, |reg, buf| {
                buf.fill(0xaa);
                Ok(reg.index() == 0)
            })
            .unwrap();
        assert_eq!(snapshot.status(RegisterId(0)), RegisterStatus::Cached);
        assert_eq!(snapshot.status(RegisterId(1)), RegisterStatus::Unknown);
    }

    #[test]
    fn test_supply_to_readonly_cache_is_internal()
    {
        let mut snapshot = Regcache::new_readonly(layout());
        let error = snapshot.supply(RegisterId(0), &[0; 4]).unwrap_err();
        assert!(error.is_internal());
    }
}
