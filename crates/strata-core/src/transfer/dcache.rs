//! # Data Cache
//!
//! Read-through line cache consulted before raw memory transfers. The cache
//! only ever holds whole lines that were fetched completely; a request any
//! of whose lines cannot be filled is not served here at all, and the caller
//! falls back to a direct transfer so partial results and errors keep their
//! usual shape.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::exception::Result;
use crate::target::stack::TargetStack;
use crate::transfer::{TransferIo, TransferObject, TransferStatus};

/// Bytes per cache line.
pub const LINE_SIZE: usize = 64;

const fn line_align_down(offset: u64) -> u64
{
    offset & !(LINE_SIZE as u64 - 1)
}

/// Bounded line cache over the inferior's memory.
#[derive(Debug)]
pub struct DataCache
{
    lines: HashMap<u64, [u8; LINE_SIZE]>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl DataCache
{
    /// Create a cache holding at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self
    {
        let capacity = capacity.max(1);
        DataCache {
            lines: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of lines currently held.
    #[must_use]
    pub fn line_count(&self) -> usize
    {
        self.lines.len()
    }

    /// Drop every cached line.
    pub fn clear(&mut self)
    {
        self.lines.clear();
        self.order.clear();
    }

    /// Drop cached lines overlapping `[offset, offset + len)`.
    pub fn invalidate_range(&mut self, offset: u64, len: usize)
    {
        if len == 0 {
            return;
        }
        let end = offset.saturating_add(len as u64);
        let mut base = line_align_down(offset);
        loop {
            self.lines.remove(&base);
            let Some(next) = base.checked_add(LINE_SIZE as u64) else { break };
            base = next;
            if base >= end {
                break;
            }
        }
    }

    /// Serve a read from cached lines, filling missing lines from the stack.
    ///
    /// Returns `Ok(None)` when the request cannot be served whole, which is
    /// not an error: the caller retries as a direct transfer.
    pub(crate) fn read(&mut self, targets: &mut TargetStack, offset: u64, buf: &mut [u8]) -> Result<Option<usize>>
    {
        let mut copied = 0usize;
        while copied < buf.len() {
            let Some(absolute) = offset.checked_add(copied as u64) else {
                return Ok(None);
            };
            let base = line_align_down(absolute);
            let line_offset = (absolute - base) as usize;
            let chunk = (buf.len() - copied).min(LINE_SIZE - line_offset);
            let Some(line) = self.fetch_line(targets, base)? else {
                return Ok(None);
            };
            buf[copied..copied + chunk].copy_from_slice(&line[line_offset..line_offset + chunk]);
            copied += chunk;
        }
        Ok(Some(copied))
    }

    fn fetch_line(&mut self, targets: &mut TargetStack, base: u64) -> Result<Option<&[u8; LINE_SIZE]>>
    {
        if !self.lines.contains_key(&base) {
            let mut line = [0u8; LINE_SIZE];
            match targets.xfer_walk(TransferObject::Memory, None, base, TransferIo::Read(&mut line))? {
                TransferStatus::Complete(n) if n == LINE_SIZE => {
                    trace!(base = format_args!("{base:#x}"), "data cache line filled");
                    self.insert_line(base, line);
                }
                // A line that cannot be read whole is never cached.
                _ => return Ok(None),
            }
        }
        Ok(self.lines.get(&base))
    }

    fn insert_line(&mut self, base: u64, line: [u8; LINE_SIZE])
    {
        while self.lines.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            self.lines.remove(&oldest);
        }
        self.lines.insert(base, line);
        self.order.push_back(base);
    }
}
