//! # Layered Targets
//!
//! A debug session rarely talks to one backend. An executable image supplies
//! read-only sections, a core dump supplies a memory snapshot, a live process
//! supplies everything. This module models each backend as a [`Target`] and
//! arranges the active ones in a stack ordered by [`Stratum`], so that a
//! request is answered by the most capable layer and falls through to the
//! ones beneath it.
//!
//! ## Lifecycle
//!
//! 1. Register a target: [`stack::TargetStack::register`]
//! 2. Push it onto the stack; any previous occupant of its stratum is closed
//! 3. Dispatch operations; the per-operation provider table routes each one
//! 4. Pop or unpush; the provider table is recomputed
//!
//! The bottom of the stack is always a [`dummy::DummyTarget`], which claims
//! nothing and exists so dispatch can rely on documented default behaviors
//! instead of an empty stack.

use crate::exception::{Exception, Result};
use crate::regcache::{RegisterSink, RegisterSource};
use crate::transfer::{TransferIo, TransferObject, XferChunk};
use crate::types::{ProcessId, RegisterId, ThreadId};

pub mod composite;
pub mod dummy;
pub mod stack;

pub use composite::{Composite, DefaultBehavior, Provider};
pub use dummy::DummyTarget;
pub use stack::TargetStack;

/// Layer of the target stack a target occupies.
///
/// Strata order the stack: a higher stratum sits above and shadows a lower
/// one for every operation both provide. At most one target per stratum is
/// active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stratum
{
    /// Reserved bottom layer; only the built-in dummy target lives here.
    Dummy,
    /// Executable and shared-library images.
    File,
    /// Core dumps and other dead process snapshots.
    Core,
    /// Live processes under direct control.
    Process,
    /// Thread-aware layers stacked on top of a process.
    Thread,
}

impl std::fmt::Display for Stratum
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let name = match self {
            Stratum::Dummy => "dummy",
            Stratum::File => "file",
            Stratum::Core => "core",
            Stratum::Process => "process",
            Stratum::Thread => "thread",
        };
        write!(f, "{name}")
    }
}

/// Stable handle to a registered target.
///
/// Handles stay valid for the life of the session, whether or not the target
/// is currently on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(pub(crate) usize);

impl TargetId
{
    /// Get the raw registry index.
    #[must_use]
    pub const fn raw(&self) -> usize
    {
        self.0
    }
}

/// Operations a target can claim to provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetOp
{
    Attach,
    Detach,
    Resume,
    Wait,
    FetchRegisters,
    StoreRegisters,
    PrepareToStore,
    Transfer,
    ThreadAlive,
    FindNewThreads,
}

impl TargetOp
{
    /// Number of dispatchable operations.
    pub const COUNT: usize = 10;

    /// Every operation, in table order.
    pub const ALL: [TargetOp; TargetOp::COUNT] = [
        TargetOp::Attach,
        TargetOp::Detach,
        TargetOp::Resume,
        TargetOp::Wait,
        TargetOp::FetchRegisters,
        TargetOp::StoreRegisters,
        TargetOp::PrepareToStore,
        TargetOp::Transfer,
        TargetOp::ThreadAlive,
        TargetOp::FindNewThreads,
    ];

    /// Index of this operation in provider tables.
    #[must_use]
    pub const fn index(self) -> usize
    {
        self as usize
    }
}

impl std::fmt::Display for TargetOp
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let name = match self {
            TargetOp::Attach => "attach",
            TargetOp::Detach => "detach",
            TargetOp::Resume => "resume",
            TargetOp::Wait => "wait",
            TargetOp::FetchRegisters => "fetch registers",
            TargetOp::StoreRegisters => "store registers",
            TargetOp::PrepareToStore => "prepare to store",
            TargetOp::Transfer => "transfer",
            TargetOp::ThreadAlive => "thread alive",
            TargetOp::FindNewThreads => "find new threads",
        };
        write!(f, "{name}")
    }
}

/// Set of operations a target provides, as a bitmask over [`TargetOp`].
///
/// ## Example
///
/// ```rust
/// use strata_core::target::{OpSet, TargetOp};
///
/// let ops = OpSet::EMPTY.with(TargetOp::Transfer).with(TargetOp::ThreadAlive);
/// assert!(ops.contains(TargetOp::Transfer));
/// assert!(!ops.contains(TargetOp::Resume));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpSet(u16);

impl OpSet
{
    /// The set providing no operations.
    pub const EMPTY: OpSet = OpSet(0);

    /// Return this set with `op` added.
    #[must_use]
    pub const fn with(self, op: TargetOp) -> Self
    {
        OpSet(self.0 | (1 << op.index()))
    }

    /// Whether `op` is in the set.
    #[must_use]
    pub const fn contains(self, op: TargetOp) -> bool
    {
        self.0 & (1 << op.index()) != 0
    }

    /// Add `op` in place.
    pub fn insert(&mut self, op: TargetOp)
    {
        self.0 |= 1 << op.index();
    }
}

/// Identity and claims of a target.
///
/// The liveness flags describe what the target vouches for while it is on
/// the stack; the stack ORs them across active targets to answer questions
/// like "does anything here have execution".
#[derive(Debug, Clone)]
pub struct TargetInfo
{
    shortname: &'static str,
    longname: &'static str,
    doc: &'static str,
    stratum: Stratum,
    has_all_memory: bool,
    has_memory: bool,
    has_stack: bool,
    has_registers: bool,
    has_execution: bool,
}

impl TargetInfo
{
    /// Start describing a target.
    #[must_use]
    pub const fn builder(shortname: &'static str, stratum: Stratum) -> TargetInfoBuilder
    {
        TargetInfoBuilder {
            info: TargetInfo {
                shortname,
                longname: shortname,
                doc: "",
                stratum,
                has_all_memory: false,
                has_memory: false,
                has_stack: false,
                has_registers: false,
                has_execution: false,
            },
        }
    }

    /// Short name used in messages, e.g. `"core"`.
    #[must_use]
    pub const fn shortname(&self) -> &'static str
    {
        self.shortname
    }

    /// Longer human-readable name.
    #[must_use]
    pub const fn longname(&self) -> &'static str
    {
        self.longname
    }

    /// One-paragraph description of the target.
    #[must_use]
    pub const fn doc(&self) -> &'static str
    {
        self.doc
    }

    /// Stratum this target occupies when pushed.
    #[must_use]
    pub const fn stratum(&self) -> Stratum
    {
        self.stratum
    }

    /// Whether the target can serve any readable address.
    #[must_use]
    pub const fn has_all_memory(&self) -> bool
    {
        self.has_all_memory
    }

    /// Whether the target serves some memory.
    #[must_use]
    pub const fn has_memory(&self) -> bool
    {
        self.has_memory
    }

    /// Whether the target has a call stack.
    #[must_use]
    pub const fn has_stack(&self) -> bool
    {
        self.has_stack
    }

    /// Whether the target has register state.
    #[must_use]
    pub const fn has_registers(&self) -> bool
    {
        self.has_registers
    }

    /// Whether the target can run.
    #[must_use]
    pub const fn has_execution(&self) -> bool
    {
        self.has_execution
    }
}

/// Builder for [`TargetInfo`].
///
/// ## Example
///
/// ```rust
/// use strata_core::target::{Stratum, TargetInfo};
///
/// let info = TargetInfo::builder("core", Stratum::Core)
///     .longname("Local core dump file")
///     .doc("Use a core file as a target.")
///     .memory(true)
///     .registers(true)
///     .stack(true)
///     .build();
/// assert_eq!(info.stratum(), Stratum::Core);
/// ```
#[derive(Debug, Clone)]
pub struct TargetInfoBuilder
{
    info: TargetInfo,
}

impl TargetInfoBuilder
{
    /// Set the long human-readable name.
    #[must_use]
    pub const fn longname(mut self, longname: &'static str) -> Self
    {
        self.info.longname = longname;
        self
    }

    /// Set the description paragraph.
    #[must_use]
    pub const fn doc(mut self, doc: &'static str) -> Self
    {
        self.info.doc = doc;
        self
    }

    /// Claim the target can serve any readable address.
    #[must_use]
    pub const fn all_memory(mut self, yes: bool) -> Self
    {
        self.info.has_all_memory = yes;
        self
    }

    /// Claim the target serves some memory.
    #[must_use]
    pub const fn memory(mut self, yes: bool) -> Self
    {
        self.info.has_memory = yes;
        self
    }

    /// Claim the target has a call stack.
    #[must_use]
    pub const fn stack(mut self, yes: bool) -> Self
    {
        self.info.has_stack = yes;
        self
    }

    /// Claim the target has register state.
    #[must_use]
    pub const fn registers(mut self, yes: bool) -> Self
    {
        self.info.has_registers = yes;
        self
    }

    /// Claim the target can run.
    #[must_use]
    pub const fn execution(mut self, yes: bool) -> Self
    {
        self.info.has_execution = yes;
        self
    }

    /// Finish the description.
    #[must_use]
    pub const fn build(self) -> TargetInfo
    {
        self.info
    }
}

/// How execution should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeRequest
{
    /// Thread to resume, or `None` for all threads.
    pub thread: Option<ThreadId>,
    /// Single-step instead of free-running.
    pub step: bool,
    /// Signal to deliver on resumption.
    pub signal: Option<i32>,
}

impl ResumeRequest
{
    /// Resume every thread, free-running, no signal.
    #[must_use]
    pub const fn continue_all() -> Self
    {
        ResumeRequest { thread: None, step: false, signal: None }
    }

    /// Single-step one thread.
    #[must_use]
    pub const fn step_thread(thread: ThreadId) -> Self
    {
        ResumeRequest { thread: Some(thread), step: true, signal: None }
    }

    /// Deliver `signal` on resumption.
    #[must_use]
    pub const fn with_signal(mut self, signal: i32) -> Self
    {
        self.signal = Some(signal);
        self
    }
}

/// Why the inferior stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus
{
    /// Stopped by a signal; still alive and inspectable.
    Stopped
    {
        /// The signal that stopped it.
        signal: i32
    },
    /// Exited normally with a status code.
    Exited
    {
        /// The exit status.
        code: i32
    },
    /// Killed by a signal.
    Signalled
    {
        /// The fatal signal.
        signal: i32
    },
}

/// A stop event reported by [`Target::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEvent
{
    /// Thread the event pertains to.
    pub thread: ThreadId,
    /// What happened.
    pub status: WaitStatus,
}

fn unimplemented_claim(target: &TargetInfo, op: TargetOp) -> Exception
{
    Exception::internal(format!(
        "target {} claims \"{op}\" but does not implement it",
        target.shortname()
    ))
}

/// A debugging backend.
///
/// Implementations declare which operations they provide through
/// [`capabilities`](Target::capabilities); dispatch never calls an operation
/// a target did not claim. The default method bodies cover the two common
/// cases: operations that are harmlessly optional succeed as no-ops, and
/// operations a target claimed but failed to override report an internal
/// inconsistency.
pub trait Target
{
    /// Identity and claims of this target.
    fn info(&self) -> &TargetInfo;

    /// The operations this target provides.
    fn capabilities(&self) -> OpSet;

    /// Open the target with user-supplied arguments, before it is pushed.
    fn open(&mut self, _args: &str) -> Result<()>
    {
        Ok(())
    }

    /// Release resources. Called when the target is displaced from its
    /// stratum or the session shuts down; must not fail.
    fn close(&mut self) {}

    /// Attach to a running process.
    fn attach(&mut self, _pid: ProcessId) -> Result<()>
    {
        Err(unimplemented_claim(self.info(), TargetOp::Attach))
    }

    /// Detach from the inferior, leaving it running.
    fn detach(&mut self) -> Result<()>
    {
        Ok(())
    }

    /// Set the inferior running.
    fn resume(&mut self, _request: &ResumeRequest) -> Result<()>
    {
        Err(unimplemented_claim(self.info(), TargetOp::Resume))
    }

    /// Block until the inferior stops and report why.
    fn wait(&mut self) -> Result<WaitEvent>
    {
        Err(unimplemented_claim(self.info(), TargetOp::Wait))
    }

    /// Read registers for `thread` into `sink`.
    ///
    /// `reg` of `None` means all registers this target knows. Registers the
    /// target cannot produce are simply not supplied.
    fn fetch_registers(&mut self, _thread: ThreadId, _reg: Option<RegisterId>, _sink: &mut dyn RegisterSink)
        -> Result<()>
    {
        Err(unimplemented_claim(self.info(), TargetOp::FetchRegisters))
    }

    /// Write registers for `thread`, pulling bytes from `source`.
    fn store_registers(&mut self, _thread: ThreadId, _reg: Option<RegisterId>, _source: &mut dyn RegisterSource)
        -> Result<()>
    {
        Err(unimplemented_claim(self.info(), TargetOp::StoreRegisters))
    }

    /// Make register state writable before a store, for backends that need
    /// to materialize it first.
    fn prepare_to_store(&mut self, _thread: ThreadId) -> Result<()>
    {
        Ok(())
    }

    /// Move bytes of one object at `offset`, in either direction.
    ///
    /// Returns how far this target got; the stack interprets
    /// [`XferChunk::Eof`] and [`XferChunk::Unsupported`] per object kind.
    fn transfer(&mut self, _object: TransferObject, _annex: Option<&str>, _offset: u64, _io: TransferIo<'_>)
        -> Result<XferChunk>
    {
        Ok(XferChunk::Unsupported)
    }

    /// Whether `thread` still exists in the inferior.
    fn thread_alive(&mut self, _thread: ThreadId) -> Result<bool>
    {
        Ok(false)
    }

    /// Discover threads the session has not seen yet.
    fn find_new_threads(&mut self) -> Result<Vec<ThreadId>>
    {
        Ok(Vec::new())
    }
}
