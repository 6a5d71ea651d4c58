//! # Debug Sessions
//!
//! A [`Session`] owns everything the core needs to control one inferior: the
//! target stack, the per-thread register caches, the memory fronts, and the
//! exception machinery. It is the only type that wires those layers together;
//! the layers themselves never reach across to each other.
//!
//! ## Ordering rules the session enforces
//!
//! 1. Register reads fetch lazily and at most once per cached value.
//! 2. Register writes go through in prepare, record, store order, and are
//!    elided entirely when the new value matches the cached one.
//! 3. Every resume and every target stack mutation invalidates the register
//!    and data caches before anything else observes them.
//! 4. An internal consistency failure that escapes a protected region poisons
//!    the session; every later operation refuses to run.

use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::arch::{Arch, RawRegisterAccess, extract_signed, extract_unsigned, store_unsigned};
use crate::exception::catcher::{Advance, CatcherAction, CatcherStack};
use crate::exception::{CatchMask, Caught, CleanupChain, CleanupMark, ErrorKind, Exception, Result};
use crate::regcache::{MAX_REGISTER_SIZE, Regcache, RegcacheLayout};
use crate::target::{Provider, ResumeRequest, Stratum, Target, TargetId, TargetOp, TargetStack, WaitEvent};
use crate::transfer::{DataCache, SectionTable, TransferIo, TransferObject, TransferStatus};
use crate::types::{Address, ProcessId, RegisterBytes, RegisterGroup, RegisterId, RegisterStatus, ThreadId};

/// Tunables fixed at session construction.
#[derive(Debug, Clone)]
pub struct SessionConfig
{
    /// Cache whole lines of target memory inside the core.
    pub data_cache: bool,
    /// Serve reads of read-only sections from the loaded image without
    /// asking the target.
    pub trust_readonly_sections: bool,
    /// Capacity of the data cache, in lines.
    pub data_cache_lines: usize,
}

impl SessionConfig
{
    /// The default configuration: no data cache, no image-backed reads.
    #[must_use]
    pub const fn new() -> Self
    {
        SessionConfig {
            data_cache: false,
            trust_readonly_sections: false,
            data_cache_lines: 64,
        }
    }

    /// Enable or disable the memory line cache.
    #[must_use]
    pub const fn with_data_cache(mut self, enabled: bool) -> Self
    {
        self.data_cache = enabled;
        self
    }

    /// Serve read-only section reads from the image.
    #[must_use]
    pub const fn with_trust_readonly_sections(mut self, trust: bool) -> Self
    {
        self.trust_readonly_sections = trust;
        self
    }

    /// Set the data cache capacity, in lines.
    #[must_use]
    pub const fn with_data_cache_lines(mut self, lines: usize) -> Self
    {
        self.data_cache_lines = lines;
        self
    }
}

impl Default for SessionConfig
{
    fn default() -> Self
    {
        SessionConfig::new()
    }
}

/// One debugging session over one architecture.
///
/// All inferior access flows through here. Register traffic goes through the
/// per-thread [`Regcache`]s, memory and object traffic through the transfer
/// fronts, and both bottom out in the target stack. Fallible work that must
/// release resources on the way out runs under [`Session::protect`].
pub struct Session
{
    arch: Arc<dyn Arch>,
    layout: Arc<RegcacheLayout>,
    targets: TargetStack,
    caches: HashMap<ThreadId, Regcache>,
    threads: Vec<ThreadId>,
    current_thread: ThreadId,
    sections: SectionTable,
    dcache: Option<DataCache>,
    trust_readonly: bool,
    dcache_lines: usize,
    catchers: CatcherStack,
    cleanups: CleanupChain<Session>,
    poisoned: bool,
}

impl Session
{
    /// Create a session for the given architecture.
    ///
    /// Fails if the architecture's register description is inconsistent,
    /// for example a register wider than [`MAX_REGISTER_SIZE`].
    pub fn new(arch: Arc<dyn Arch>, config: SessionConfig) -> Result<Session>
    {
        let layout = RegcacheLayout::new(arch.as_ref())?;
        let dcache = if config.data_cache {
            Some(DataCache::new(config.data_cache_lines))
        } else {
            None
        };
        Ok(Session {
            arch,
            layout,
            targets: TargetStack::new(),
            caches: HashMap::new(),
            threads: Vec::new(),
            current_thread: ThreadId::NULL,
            sections: SectionTable::new(),
            dcache,
            trust_readonly: config.trust_readonly_sections,
            dcache_lines: config.data_cache_lines,
            catchers: CatcherStack::new(),
            cleanups: CleanupChain::new(),
            poisoned: false,
        })
    }

    /// The architecture this session debugs.
    #[must_use]
    pub fn arch(&self) -> &dyn Arch
    {
        self.arch.as_ref()
    }

    /// Whether an internal failure has poisoned the session.
    #[must_use]
    pub fn is_poisoned(&self) -> bool
    {
        self.poisoned
    }

    // Target stack management.

    /// Register a target implementation with the session.
    ///
    /// Registration only hands out an id; the target joins the stack when it
    /// is pushed.
    pub fn register_target(&mut self, target: Box<dyn Target>) -> TargetId
    {
        self.targets.register(target)
    }

    /// Open a registered target with `args` and push it onto the stack.
    ///
    /// Returns true when the target became the new top.
    pub fn open_target(&mut self, id: TargetId, args: &str) -> Result<bool>
    {
        self.ensure_usable()?;
        self.targets.open(id, args)?;
        let became_top = self.targets.push(id)?;
        self.invalidate_caches();
        Ok(became_top)
    }

    /// Push a registered target onto the stack at its stratum.
    ///
    /// A target already occupying that stratum is closed and unlinked first.
    /// Returns true when the pushed target became the new top.
    pub fn push_target(&mut self, id: TargetId) -> Result<bool>
    {
        self.ensure_usable()?;
        let became_top = self.targets.push(id)?;
        self.invalidate_caches();
        Ok(became_top)
    }

    /// Close and unlink the top target.
    pub fn pop_target(&mut self) -> Result<TargetId>
    {
        self.ensure_usable()?;
        let popped = self.targets.pop()?;
        self.invalidate_caches();
        Ok(popped)
    }

    /// Close and unlink a specific target, wherever it sits on the stack.
    pub fn unpush_target(&mut self, id: TargetId) -> Result<()>
    {
        self.ensure_usable()?;
        self.targets.unpush(id)?;
        self.invalidate_caches();
        Ok(())
    }

    /// The stratum of the current top target.
    #[must_use]
    pub fn top_stratum(&self) -> Stratum
    {
        self.targets.top_stratum()
    }

    /// The short name of the current top target.
    #[must_use]
    pub fn top_shortname(&self) -> &'static str
    {
        self.targets.top_shortname()
    }

    /// How many targets are on the stack, the bottom sentinel included.
    #[must_use]
    pub fn target_depth(&self) -> usize
    {
        self.targets.depth()
    }

    /// Who would answer `op` right now.
    #[must_use]
    pub fn provider_for(&self, op: TargetOp) -> Provider
    {
        self.targets.provider(op)
    }

    /// Whether some active target can reach all of the inferior's memory.
    #[must_use]
    pub fn has_all_memory(&self) -> bool
    {
        self.targets.composite().has_all_memory()
    }

    /// Whether some active target can reach inferior memory.
    #[must_use]
    pub fn has_memory(&self) -> bool
    {
        self.targets.composite().has_memory()
    }

    /// Whether some active target has a call stack.
    #[must_use]
    pub fn has_stack(&self) -> bool
    {
        self.targets.composite().has_stack()
    }

    /// Whether some active target has registers.
    #[must_use]
    pub fn has_registers(&self) -> bool
    {
        self.targets.composite().has_registers()
    }

    /// Whether some active target can run the inferior.
    #[must_use]
    pub fn has_execution(&self) -> bool
    {
        self.targets.composite().has_execution()
    }

    // Execution control.

    /// Attach to a running process.
    pub fn attach(&mut self, pid: ProcessId) -> Result<()>
    {
        self.ensure_usable()?;
        self.targets.attach(pid)?;
        self.invalidate_caches();
        debug!(%pid, "attached");
        Ok(())
    }

    /// Detach from the inferior and unlink the target that carried it.
    pub fn detach(&mut self) -> Result<()>
    {
        self.ensure_usable()?;
        let provider = self.targets.provider(TargetOp::Detach);
        self.targets.detach()?;
        if let Provider::Target(id) = provider {
            self.targets.unpush(id)?;
        }
        self.invalidate_caches();
        Ok(())
    }

    /// Set the inferior running.
    ///
    /// Caches are invalidated before the target moves, so no stale register
    /// or memory value survives into the next stop.
    pub fn resume(&mut self, request: &ResumeRequest) -> Result<()>
    {
        self.ensure_usable()?;
        self.invalidate_caches();
        trace!(?request, "resuming");
        self.targets.resume(request)
    }

    /// Block until the inferior reports an event.
    ///
    /// The reporting thread becomes the current thread and joins the thread
    /// list if it was not yet known.
    pub fn wait(&mut self) -> Result<WaitEvent>
    {
        self.ensure_usable()?;
        let event = self.targets.wait()?;
        self.current_thread = event.thread;
        if !self.threads.contains(&event.thread) {
            self.threads.push(event.thread);
        }
        debug!(thread = %event.thread, status = ?event.status, "target reported an event");
        Ok(event)
    }

    /// Ask the target whether a thread still exists.
    pub fn thread_alive(&mut self, thread: ThreadId) -> Result<bool>
    {
        self.ensure_usable()?;
        self.targets.thread_alive(thread)
    }

    // Thread bookkeeping.

    /// Merge newly discovered threads into the list and prune dead ones.
    pub fn update_thread_list(&mut self) -> Result<()>
    {
        self.ensure_usable()?;
        for thread in self.targets.find_new_threads()? {
            if !self.threads.contains(&thread) {
                self.threads.push(thread);
            }
        }
        let known: Vec<ThreadId> = self.threads.clone();
        for thread in known {
            if !self.targets.thread_alive(thread)? {
                self.forget_thread(thread);
            }
        }
        debug!(count = self.threads.len(), "thread list updated");
        Ok(())
    }

    /// The threads the session currently knows about.
    #[must_use]
    pub fn threads(&self) -> &[ThreadId]
    {
        &self.threads
    }

    /// The thread register operations apply to by default.
    #[must_use]
    pub fn current_thread(&self) -> ThreadId
    {
        self.current_thread
    }

    /// Switch the current thread.
    pub fn set_current_thread(&mut self, thread: ThreadId)
    {
        self.current_thread = thread;
    }

    /// Drop a thread and its register cache.
    pub fn forget_thread(&mut self, thread: ThreadId)
    {
        self.caches.remove(&thread);
        self.threads.retain(|known| *known != thread);
        if self.current_thread == thread {
            self.current_thread = ThreadId::NULL;
        }
    }

    /// Drop every register cache and the data cache contents.
    ///
    /// Called internally whenever the inferior runs or the target stack
    /// changes; exposed for callers that know target state moved behind the
    /// session's back.
    pub fn invalidate_caches(&mut self)
    {
        if !self.caches.is_empty() {
            trace!(threads = self.caches.len(), "register caches invalidated");
        }
        self.caches.clear();
        if let Some(dcache) = self.dcache.as_mut() {
            dcache.clear();
        }
    }

    // Register access.

    /// Read a register, fetching it from the target if it is not cached.
    pub fn read_register(&mut self, thread: ThreadId, reg: RegisterId) -> Result<RegisterBytes>
    {
        self.ensure_usable()?;
        self.layout.validate(reg)?;
        let mut bytes = RegisterBytes::from_elem(0, self.layout.register_size(reg));
        self.cooked_read_into(thread, reg, &mut bytes)?;
        Ok(bytes)
    }

    /// Write a register through to the target.
    ///
    /// The write is elided when the cache already holds the same value.
    pub fn write_register(&mut self, thread: ThreadId, reg: RegisterId, bytes: &[u8]) -> Result<()>
    {
        self.ensure_usable()?;
        self.layout.validate(reg)?;
        let size = self.layout.register_size(reg);
        if bytes.len() != size {
            return Err(Exception::error(
                ErrorKind::InvalidArgument,
                format!(
                    "register {} takes {size} bytes, got {}",
                    self.arch.register_name(reg),
                    bytes.len()
                ),
            ));
        }
        self.cooked_write_from(thread, reg, bytes)
    }

    /// Read a register as an unsigned integer in the architecture's byte
    /// order.
    ///
    /// Registers wider than eight bytes cannot be read this way.
    pub fn read_register_unsigned(&mut self, thread: ThreadId, reg: RegisterId) -> Result<u64>
    {
        let bytes = self.read_register(thread, reg)?;
        extract_unsigned(&bytes, self.arch.byte_order())
    }

    /// Read a register as a sign-extended integer.
    pub fn read_register_signed(&mut self, thread: ThreadId, reg: RegisterId) -> Result<i64>
    {
        let bytes = self.read_register(thread, reg)?;
        extract_signed(&bytes, self.arch.byte_order())
    }

    /// Write an unsigned integer into a register in the architecture's byte
    /// order.
    pub fn write_register_unsigned(&mut self, thread: ThreadId, reg: RegisterId, value: u64) -> Result<()>
    {
        self.ensure_usable()?;
        self.layout.validate(reg)?;
        let mut bytes = RegisterBytes::from_elem(0, self.layout.register_size(reg));
        store_unsigned(&mut bytes, self.arch.byte_order(), value);
        self.cooked_write_from(thread, reg, &bytes)
    }

    /// Read `len` bytes of a register starting at byte `offset`.
    pub fn read_register_part(&mut self, thread: ThreadId, reg: RegisterId, offset: usize, len: usize)
    -> Result<RegisterBytes>
    {
        self.ensure_usable()?;
        self.layout.validate(reg)?;
        let end = self.part_bounds(reg, offset, len)?;
        let mut full = RegisterBytes::from_elem(0, self.layout.register_size(reg));
        self.cooked_read_into(thread, reg, &mut full)?;
        Ok(RegisterBytes::from_slice(&full[offset..end]))
    }

    /// Overwrite part of a register, preserving the bytes around it.
    pub fn write_register_part(&mut self, thread: ThreadId, reg: RegisterId, offset: usize, bytes: &[u8])
    -> Result<()>
    {
        self.ensure_usable()?;
        self.layout.validate(reg)?;
        let end = self.part_bounds(reg, offset, bytes.len())?;
        let size = self.layout.register_size(reg);
        if offset == 0 && bytes.len() == size {
            return self.cooked_write_from(thread, reg, bytes);
        }
        let mut full = RegisterBytes::from_elem(0, size);
        self.cooked_read_into(thread, reg, &mut full)?;
        full[offset..end].copy_from_slice(bytes);
        self.cooked_write_from(thread, reg, &full)
    }

    /// The cache status of a register, without fetching anything.
    #[must_use]
    pub fn register_status(&self, thread: ThreadId, reg: RegisterId) -> RegisterStatus
    {
        self.caches
            .get(&thread)
            .map_or(RegisterStatus::Unknown, |cache| cache.status(reg))
    }

    /// Snapshot the save group of a thread's registers.
    ///
    /// The snapshot reads every register in the group eagerly, so it survives
    /// cache invalidation and thread death. Restore it with
    /// [`Session::restore_registers`].
    pub fn save_registers(&mut self, thread: ThreadId) -> Result<Regcache>
    {
        self.ensure_usable()?;
        let arch = Arc::clone(&self.arch);
        let mut snapshot = Regcache::new_readonly(Arc::clone(&self.layout));
        snapshot.save_from(arch.as_ref(), |reg, buf| {
            self.cooked_read_into(thread, reg, buf).map(|()| true)
        })?;
        Ok(snapshot)
    }

    /// Write a snapshot's restore group back to a thread.
    ///
    /// Registers the snapshot never captured are skipped. Unchanged values
    /// are elided like any other write.
    pub fn restore_registers(&mut self, thread: ThreadId, snapshot: &Regcache) -> Result<()>
    {
        self.ensure_usable()?;
        if !snapshot.is_readonly() {
            return Err(Exception::internal("restoring registers from a live register cache"));
        }
        if !Arc::ptr_eq(snapshot.layout(), &self.layout) {
            return Err(Exception::internal("register snapshot belongs to a different architecture"));
        }
        let arch = Arc::clone(&self.arch);
        let mut buf = [0u8; MAX_REGISTER_SIZE];
        for index in 0..self.layout.register_count() {
            let reg = RegisterId(index);
            if !arch.register_in_group(reg, RegisterGroup::Restore) {
                continue;
            }
            if snapshot.status(reg) != RegisterStatus::Cached {
                continue;
            }
            let size = self.layout.register_size(reg);
            snapshot.collect_into(reg, &mut buf[..size])?;
            self.cooked_write_from(thread, reg, &buf[..size])?;
        }
        Ok(())
    }

    // Object transfer.

    /// Move at most one chunk of an object in a single target round trip.
    ///
    /// Reads of the memory object consult the image sections and the data
    /// cache before the target stack. `Complete(0)` on a read means the
    /// object ended at `offset`.
    pub fn read_object_partial(
        &mut self,
        object: TransferObject,
        annex: Option<&str>,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<TransferStatus>
    {
        self.ensure_usable()?;
        if buf.is_empty() {
            return Ok(TransferStatus::Complete(0));
        }
        if object == TransferObject::Memory {
            if self.trust_readonly {
                if let Some(n) = self.sections.read_readonly(offset, buf) {
                    trace!(offset = format_args!("{offset:#x}"), n, "read served from image sections");
                    return Ok(if n == buf.len() {
                        TransferStatus::Complete(n)
                    } else {
                        TransferStatus::Partial(n)
                    });
                }
            }
            if let Some(n) = self.dcache_read(offset, buf)? {
                return Ok(if n == buf.len() {
                    TransferStatus::Complete(n)
                } else {
                    TransferStatus::Partial(n)
                });
            }
        }
        self.targets.xfer_walk(object, annex, offset, TransferIo::Read(buf))
    }

    /// Write at most one chunk of an object in a single target round trip.
    ///
    /// Memory writes go straight to the target; any cached lines they touch
    /// are invalidated.
    pub fn write_object_partial(
        &mut self,
        object: TransferObject,
        annex: Option<&str>,
        offset: u64,
        bytes: &[u8],
    ) -> Result<TransferStatus>
    {
        self.ensure_usable()?;
        if bytes.is_empty() {
            return Ok(TransferStatus::Complete(0));
        }
        let status = self.targets.xfer_walk(object, annex, offset, TransferIo::Write(bytes))?;
        if object == TransferObject::Memory {
            let moved = status.bytes_moved();
            if moved > 0 {
                if let Some(dcache) = self.dcache.as_mut() {
                    dcache.invalidate_range(offset, moved);
                }
            }
        }
        Ok(status)
    }

    /// Read an object until the buffer is full or the object ends.
    ///
    /// Returns how many bytes were read. A failed chunk becomes the error it
    /// carries.
    pub fn read_object(&mut self, object: TransferObject, annex: Option<&str>, offset: u64, buf: &mut [u8])
    -> Result<usize>
    {
        let mut total = 0;
        while total < buf.len() {
            let Some(cursor) = offset.checked_add(total as u64) else {
                break;
            };
            match self.read_object_partial(object, annex, cursor, &mut buf[total..])? {
                TransferStatus::Complete(0) => break,
                TransferStatus::Complete(moved) => {
                    total += moved;
                    break;
                }
                TransferStatus::Partial(moved) => total += moved,
                TransferStatus::Failed(failure) => return Err(failure.into()),
            }
        }
        Ok(total)
    }

    /// Write an object until every byte is placed or the object ends.
    pub fn write_object(&mut self, object: TransferObject, annex: Option<&str>, offset: u64, bytes: &[u8])
    -> Result<usize>
    {
        let mut total = 0;
        while total < bytes.len() {
            let Some(cursor) = offset.checked_add(total as u64) else {
                break;
            };
            match self.write_object_partial(object, annex, cursor, &bytes[total..])? {
                TransferStatus::Complete(0) => break,
                TransferStatus::Complete(moved) => {
                    total += moved;
                    break;
                }
                TransferStatus::Partial(moved) => total += moved,
                TransferStatus::Failed(failure) => return Err(failure.into()),
            }
        }
        Ok(total)
    }

    /// Read a whole object into a fresh buffer.
    ///
    /// Meant for bounded objects like the auxiliary vector or feature
    /// descriptions, which report their end with an empty chunk. Reading an
    /// unbounded object like memory fails at its first hole instead.
    pub fn read_object_alloc(&mut self, object: TransferObject, annex: Option<&str>) -> Result<Vec<u8>>
    {
        let mut data = Vec::new();
        let mut chunk = vec![0u8; 4096];
        loop {
            let offset = data.len() as u64;
            let moved = self.read_object(object, annex, offset, &mut chunk)?;
            data.extend_from_slice(&chunk[..moved]);
            if moved < chunk.len() {
                break;
            }
        }
        Ok(data)
    }

    /// Fill `buf` from inferior memory at `addr`, or fail.
    pub fn read_memory_exact(&mut self, addr: Address, buf: &mut [u8]) -> Result<()>
    {
        let moved = self.read_object(TransferObject::Memory, None, addr.value(), buf)?;
        if moved < buf.len() {
            return Err(memory_error(addr.value().saturating_add(moved as u64)));
        }
        Ok(())
    }

    /// Write every byte of `bytes` to inferior memory at `addr`, or fail.
    pub fn write_memory_exact(&mut self, addr: Address, bytes: &[u8]) -> Result<()>
    {
        let moved = self.write_object(TransferObject::Memory, None, addr.value(), bytes)?;
        if moved < bytes.len() {
            return Err(memory_error(addr.value().saturating_add(moved as u64)));
        }
        Ok(())
    }

    /// Replace the image section table used for image-backed reads.
    pub fn set_section_table(&mut self, sections: SectionTable)
    {
        self.sections = sections;
    }

    /// The image section table.
    #[must_use]
    pub fn section_table(&self) -> &SectionTable
    {
        &self.sections
    }

    /// Turn image-backed reads of read-only sections on or off.
    pub fn set_trust_readonly_sections(&mut self, trust: bool)
    {
        self.trust_readonly = trust;
    }

    /// Turn the memory line cache on or off.
    ///
    /// Turning it off drops its contents; turning it on starts empty.
    pub fn set_data_cache(&mut self, enabled: bool)
    {
        if enabled {
            if self.dcache.is_none() {
                self.dcache = Some(DataCache::new(self.dcache_lines));
            }
        } else {
            self.dcache = None;
        }
    }

    // Protected regions and cleanups.

    /// Run `body` under a catcher with the given mask.
    ///
    /// Cleanups registered inside the region run innermost-first on every
    /// exit, successful or not. An exception the mask names is absorbed and
    /// returned as [`Caught::Failed`]; one it does not name keeps unwinding
    /// as `Err`. Internal consistency failures are never absorbed: they
    /// unwind through every region and poison the session on the way out.
    pub fn protect<T, F>(&mut self, mask: CatchMask, body: F) -> Result<Caught<T>>
    where
        F: FnOnce(&mut Session) -> Result<T>,
    {
        match self.protect_inner(mask, body) {
            Ok(caught) => Ok(caught),
            Err(exception) => {
                if exception.is_internal() {
                    self.poisoned = true;
                    error!(%exception, "internal failure escaped; session poisoned");
                }
                Err(exception)
            }
        }
    }

    /// Register work to run when the enclosing protected region exits.
    ///
    /// Outside any region the cleanup stays pending until a caller runs or
    /// discards it explicitly.
    pub fn register_cleanup<F>(&mut self, cleanup: F)
    where
        F: FnOnce(&mut Session) + 'static,
    {
        self.cleanups.register(cleanup);
    }

    /// A mark denoting the current top of the cleanup chain.
    #[must_use]
    pub fn cleanup_mark(&self) -> CleanupMark
    {
        self.cleanups.mark()
    }

    /// Run every cleanup registered since `mark`, newest first.
    ///
    /// Returns how many ran.
    pub fn run_cleanups(&mut self, mark: CleanupMark) -> usize
    {
        self.run_cleanups_to(mark)
    }

    /// Drop every cleanup registered since `mark` without running it.
    pub fn discard_cleanups(&mut self, mark: CleanupMark)
    {
        self.cleanups.discard_to(mark);
    }

    // Internal plumbing.

    fn ensure_usable(&self) -> Result<()>
    {
        if self.poisoned {
            return Err(Exception::internal("the session was poisoned by an earlier internal failure"));
        }
        Ok(())
    }

    /// Run `f` with the current thread temporarily switched to `thread`.
    fn with_thread<T>(&mut self, thread: ThreadId, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T>
    {
        let saved = mem::replace(&mut self.current_thread, thread);
        let result = f(self);
        self.current_thread = saved;
        result
    }

    /// Detach a thread's cache so target calls can run while it is borrowed.
    ///
    /// Callers put the cache back with `caches.insert` on every path.
    fn take_cache(&mut self, thread: ThreadId) -> Regcache
    {
        self.caches
            .remove(&thread)
            .unwrap_or_else(|| Regcache::new_live(Arc::clone(&self.layout), self.arch.as_ref()))
    }

    fn raw_read_into(&mut self, thread: ThreadId, reg: RegisterId, buf: &mut [u8]) -> Result<()>
    {
        self.layout.validate(reg)?;
        if !self.layout.is_raw(reg) {
            return Err(Exception::internal(format!("raw access to cooked register {}", reg.index())));
        }
        let mut cache = self.take_cache(thread);
        let mut fetched = Ok(());
        if cache.status(reg) == RegisterStatus::Unknown {
            fetched = self.with_thread(thread, |session| {
                session.targets.fetch_registers(thread, Some(reg), &mut cache)
            });
        }
        let outcome = match fetched {
            Ok(()) => match cache.status(reg) {
                RegisterStatus::Unknown => Err(Exception::error(
                    ErrorKind::TargetFailure,
                    format!(
                        "the `{}' target did not supply register {}",
                        self.targets.top_shortname(),
                        self.arch.register_name(reg)
                    ),
                )),
                _ => cache.collect_into(reg, buf),
            },
            Err(exception) => Err(exception),
        };
        self.caches.insert(thread, cache);
        outcome
    }

    fn raw_write_from(&mut self, thread: ThreadId, reg: RegisterId, bytes: &[u8]) -> Result<()>
    {
        self.layout.validate(reg)?;
        if !self.layout.is_raw(reg) {
            return Err(Exception::internal(format!("raw access to cooked register {}", reg.index())));
        }
        if bytes.len() != self.layout.register_size(reg) {
            return Err(Exception::internal(format!(
                "storing {} bytes into register {} of {} bytes",
                bytes.len(),
                reg.index(),
                self.layout.register_size(reg)
            )));
        }
        if self.arch.cannot_store(reg) {
            trace!(register = reg.index(), "store to unwritable register dropped");
            return Ok(());
        }
        let mut cache = self.take_cache(thread);
        if cache.equals(reg, bytes) {
            trace!(register = reg.index(), "write elided, value unchanged");
            self.caches.insert(thread, cache);
            return Ok(());
        }
        let stored = self.with_thread(thread, |session| {
            session.targets.prepare_to_store(thread)?;
            cache.record(reg, bytes)?;
            session.targets.store_registers(thread, Some(reg), &mut cache)
        });
        self.caches.insert(thread, cache);
        stored
    }

    fn cooked_read_into(&mut self, thread: ThreadId, reg: RegisterId, buf: &mut [u8]) -> Result<()>
    {
        self.layout.validate(reg)?;
        if self.layout.is_raw(reg) {
            return self.raw_read_into(thread, reg, buf);
        }
        let arch = Arc::clone(&self.arch);
        let mut raw = RawAccess { session: self, thread };
        arch.pseudo_register_read(&mut raw, reg, buf)
    }

    fn cooked_write_from(&mut self, thread: ThreadId, reg: RegisterId, bytes: &[u8]) -> Result<()>
    {
        self.layout.validate(reg)?;
        if self.layout.is_raw(reg) {
            return self.raw_write_from(thread, reg, bytes);
        }
        let arch = Arc::clone(&self.arch);
        let mut raw = RawAccess { session: self, thread };
        arch.pseudo_register_write(&mut raw, reg, bytes)
    }

    fn part_bounds(&self, reg: RegisterId, offset: usize, len: usize) -> Result<usize>
    {
        let size = self.layout.register_size(reg);
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(end),
            _ => Err(Exception::error(
                ErrorKind::InvalidArgument,
                format!(
                    "a {len} byte slice at offset {offset} does not fit register {} of {size} bytes",
                    self.arch.register_name(reg)
                ),
            )),
        }
    }

    fn dcache_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<Option<usize>>
    {
        let Session { targets, dcache, .. } = self;
        let Some(dcache) = dcache.as_mut() else {
            return Ok(None);
        };
        dcache.read(targets, offset, buf)
    }

    fn run_cleanups_to(&mut self, mark: CleanupMark) -> usize
    {
        let pending = self.cleanups.take_since(mark);
        let count = pending.len();
        for cleanup in pending.into_iter().rev() {
            cleanup(self);
        }
        count
    }

    fn protect_inner<T, F>(&mut self, mask: CatchMask, body: F) -> Result<Caught<T>>
    where
        F: FnOnce(&mut Session) -> Result<T>,
    {
        self.ensure_usable()?;
        let mark = self.cleanups.mark();
        self.catchers.push(mask, mark);
        match self.catchers.advance(CatcherAction::EnterProtectedRegion)? {
            Advance::Continue => {}
            _ => return Err(Exception::internal("catcher yielded a body before entering")),
        }
        let mut body = Some(body);
        let mut outcome: Option<Result<T>> = None;
        let frame = loop {
            match self.catchers.advance(CatcherAction::IterateSecondary)? {
                Advance::RunBody => {
                    let Some(run) = body.take() else {
                        return Err(Exception::internal("catcher requested the body twice"));
                    };
                    match run(self) {
                        Ok(value) => outcome = Some(Ok(value)),
                        Err(exception) => {
                            outcome = Some(Err(exception));
                            self.catchers.advance(CatcherAction::SignalException)?;
                            match self.catchers.advance(CatcherAction::Iterate)? {
                                Advance::Finished(frame) => break frame,
                                _ => return Err(Exception::internal("signalled catcher did not retire")),
                            }
                        }
                    }
                }
                Advance::Continue => match self.catchers.advance(CatcherAction::Iterate)? {
                    Advance::Finished(frame) => break frame,
                    _ => return Err(Exception::internal("completed catcher did not retire")),
                },
                Advance::Finished(_) => {
                    return Err(Exception::internal("catcher retired while its body was pending"));
                }
            }
        };
        let ran = self.run_cleanups_to(frame.cleanup_mark);
        if ran > 0 {
            debug!(count = ran, aborted = frame.aborted, "cleanups ran");
        }
        match outcome {
            Some(Ok(value)) if !frame.aborted => Ok(Caught::Ok(value)),
            Some(Err(exception)) if frame.aborted => {
                if exception.is_internal() {
                    return Err(exception);
                }
                match exception.category() {
                    Some(category) if frame.mask.accepts(category) => {
                        debug!(%exception, %category, "exception absorbed");
                        Ok(Caught::Failed {
                            category,
                            message: exception.to_string(),
                        })
                    }
                    _ => Err(exception),
                }
            }
            _ => Err(Exception::internal("protected region retired in an inconsistent state")),
        }
    }
}

impl fmt::Debug for Session
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Session")
            .field("arch", &self.arch.name())
            .field("targets", &self.targets)
            .field("threads", &self.threads)
            .field("current_thread", &self.current_thread)
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

fn memory_error(addr: u64) -> Exception
{
    Exception::error(ErrorKind::MemoryError, format!("Cannot access memory at address {addr:#x}"))
}

/// Raw register view handed to pseudo register composition.
///
/// Keeps arch code on the raw side of the cache: a cooked register that
/// names another cooked register in its composition is an arch bug and
/// surfaces as an internal failure, not a recursive call.
struct RawAccess<'a>
{
    session: &'a mut Session,
    thread: ThreadId,
}

impl RawRegisterAccess for RawAccess<'_>
{
    fn read_raw(&mut self, reg: RegisterId, buf: &mut [u8]) -> Result<()>
    {
        self.session.raw_read_into(self.thread, reg, buf)
    }

    fn write_raw(&mut self, reg: RegisterId, bytes: &[u8]) -> Result<()>
    {
        self.session.raw_write_from(self.thread, reg, bytes)
    }
}
