//! # Register File Layout
//!
//! Precomputed geometry of an architecture's register file: where each
//! register's bytes live in a cache buffer and how big they are. Built once
//! per session and shared by every per-thread cache.

use std::sync::Arc;

use crate::arch::Arch;
use crate::exception::{Exception, Result};
use crate::types::RegisterId;

/// Upper bound on a single register's size in bytes.
///
/// Scratch buffers for register values are sized to this, so an architecture
/// declaring something larger is rejected when the layout is built.
pub const MAX_REGISTER_SIZE: usize = 64;

/// Byte offsets and sizes for every register, raw and cooked.
#[derive(Debug)]
pub struct RegcacheLayout
{
    offsets: Vec<usize>,
    sizes: Vec<usize>,
    raw_count: usize,
    count: usize,
    total_bytes: usize,
}

impl RegcacheLayout
{
    /// Compute the layout for `arch`, validating its register geometry.
    pub fn new(arch: &dyn Arch) -> Result<Arc<RegcacheLayout>>
    {
        let count = arch.register_count();
        let raw_count = arch.raw_register_count();
        if raw_count > count {
            return Err(Exception::internal(format!(
                "architecture {} declares {raw_count} raw registers but only {count} registers",
                arch.name()
            )));
        }

        let mut offsets = Vec::with_capacity(count);
        let mut sizes = Vec::with_capacity(count);
        let mut total_bytes = 0usize;
        for index in 0..count {
            let size = arch.register_size(RegisterId(index));
            if size == 0 || size > MAX_REGISTER_SIZE {
                return Err(Exception::internal(format!(
                    "architecture {} declares register {index} as {size} bytes",
                    arch.name()
                )));
            }
            offsets.push(total_bytes);
            sizes.push(size);
            total_bytes += size;
        }

        Ok(Arc::new(RegcacheLayout { offsets, sizes, raw_count, count, total_bytes }))
    }

    /// Total number of registers, raw and cooked.
    #[must_use]
    pub const fn register_count(&self) -> usize
    {
        self.count
    }

    /// Number of raw registers.
    #[must_use]
    pub const fn raw_register_count(&self) -> usize
    {
        self.raw_count
    }

    /// Bytes needed to hold every register value.
    #[must_use]
    pub const fn total_bytes(&self) -> usize
    {
        self.total_bytes
    }

    /// Whether `reg` is raw rather than cooked.
    #[must_use]
    pub fn is_raw(&self, reg: RegisterId) -> bool
    {
        reg.index() < self.raw_count
    }

    /// Size in bytes of a validated register.
    #[must_use]
    pub fn register_size(&self, reg: RegisterId) -> usize
    {
        self.sizes[reg.index()]
    }

    /// Buffer offset of a validated register.
    #[must_use]
    pub fn offset(&self, reg: RegisterId) -> usize
    {
        self.offsets[reg.index()]
    }

    /// Reject register numbers outside the layout.
    pub fn validate(&self, reg: RegisterId) -> Result<()>
    {
        if reg.index() < self.count {
            Ok(())
        } else {
            Err(Exception::internal(format!(
                "register number {} out of range for a {} register layout",
                reg.index(),
                self.count
            )))
        }
    }
}
