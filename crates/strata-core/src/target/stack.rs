//! # Target Stack
//!
//! Owns every registered target, tracks which ones are active, and routes
//! dispatched operations through the composite table. Mutations keep three
//! invariants: the active chain is strictly decreasing by stratum, the dummy
//! sentinel is always at the bottom, and the composite table is recomputed
//! before the mutation returns.

use tracing::debug;

use crate::exception::{ErrorKind, Exception, Result};
use crate::target::composite::{Composite, DefaultBehavior, Provider};
use crate::target::dummy::DummyTarget;
use crate::target::{ResumeRequest, Stratum, Target, TargetId, TargetInfo, TargetOp, WaitEvent};
use crate::regcache::{RegisterSink, RegisterSource};
use crate::transfer::{TransferError, TransferIo, TransferObject, TransferStatus, XferChunk};
use crate::types::{ProcessId, RegisterId, ThreadId};

/// The ordered chain of active targets plus the registry behind it.
///
/// `active` lists registry ids top to bottom. It always ends with the dummy
/// sentinel, so the composite resolver never sees an empty chain.
pub struct TargetStack
{
    targets: Vec<Box<dyn Target>>,
    active: Vec<TargetId>,
    composite: Composite,
}

impl std::fmt::Debug for TargetStack
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        let names: Vec<&str> = self
            .active
            .iter()
            .map(|id| self.targets[id.0].info().shortname())
            .collect();
        f.debug_struct("TargetStack")
            .field("registered", &self.targets.len())
            .field("active", &names)
            .finish()
    }
}

impl TargetStack
{
    /// Create a stack holding only the dummy sentinel.
    #[must_use]
    pub fn new() -> Self
    {
        let targets: Vec<Box<dyn Target>> = vec![Box::new(DummyTarget::new())];
        let active = vec![TargetId(0)];
        let composite = Composite::resolve(&targets, &active);
        TargetStack { targets, active, composite }
    }

    /// Add a target to the registry without activating it.
    pub fn register(&mut self, target: Box<dyn Target>) -> TargetId
    {
        let id = TargetId(self.targets.len());
        debug!(
            shortname = target.info().shortname(),
            stratum = %target.info().stratum(),
            id = id.0,
            "registered target"
        );
        self.targets.push(target);
        id
    }

    /// Current dispatch routing.
    #[must_use]
    pub const fn composite(&self) -> &Composite
    {
        &self.composite
    }

    /// The provider that would answer `op` right now.
    #[must_use]
    pub const fn provider(&self, op: TargetOp) -> Provider
    {
        self.composite.provider(op)
    }

    /// The target on top of the stack.
    #[must_use]
    pub fn top(&self) -> TargetId
    {
        self.composite.top()
    }

    /// Stratum of the top target.
    #[must_use]
    pub fn top_stratum(&self) -> Stratum
    {
        self.targets[self.top().0].info().stratum()
    }

    /// Short name of the top target, for messages.
    #[must_use]
    pub fn top_shortname(&self) -> &'static str
    {
        self.targets[self.top().0].info().shortname()
    }

    /// Identity of a registered target.
    pub fn info(&self, id: TargetId) -> Result<&TargetInfo>
    {
        self.checked(id).map(|target| target.info())
    }

    /// Whether `id` is somewhere on the active chain.
    #[must_use]
    pub fn is_active(&self, id: TargetId) -> bool
    {
        self.active.contains(&id)
    }

    /// Active ids, top to bottom, sentinel included.
    #[must_use]
    pub fn active(&self) -> &[TargetId]
    {
        &self.active
    }

    /// Number of active targets, sentinel included.
    #[must_use]
    pub fn depth(&self) -> usize
    {
        self.active.len()
    }

    /// Open a registered target with user-supplied arguments.
    pub fn open(&mut self, id: TargetId, args: &str) -> Result<()>
    {
        self.checked_mut(id)?.open(args)
    }

    /// Activate `id` at its stratum.
    ///
    /// An occupant already at that stratum is closed and then unlinked.
    /// Returns whether the pushed target became the new top of the stack.
    pub fn push(&mut self, id: TargetId) -> Result<bool>
    {
        let stratum = self.checked(id)?.info().stratum();
        if stratum == Stratum::Dummy {
            return Err(Exception::error(
                ErrorKind::InvalidArgument,
                "cannot push a target at the reserved bottom stratum",
            ));
        }

        if let Some(pos) = self
            .active
            .iter()
            .position(|t| self.targets[t.0].info().stratum() == stratum)
        {
            let displaced = self.active[pos];
            debug!(
                displaced = self.targets[displaced.0].info().shortname(),
                stratum = %stratum,
                "closing displaced target"
            );
            self.targets[displaced.0].close();
            self.active.remove(pos);
        }

        let pos = self
            .active
            .iter()
            .position(|t| self.targets[t.0].info().stratum() < stratum)
            .unwrap_or(self.active.len());
        self.active.insert(pos, id);
        self.refresh();
        Ok(pos == 0)
    }

    /// Close and unlink the top target.
    pub fn pop(&mut self) -> Result<TargetId>
    {
        if self.active.len() <= 1 {
            return Err(Exception::internal(
                "popping the target stack with nothing above the bottom sentinel",
            ));
        }
        let top = self.active[0];
        self.targets[top.0].close();
        self.active.remove(0);
        self.refresh();
        Ok(top)
    }

    /// Close and unlink `id` wherever it sits on the chain.
    pub fn unpush(&mut self, id: TargetId) -> Result<()>
    {
        if self.checked(id)?.info().stratum() == Stratum::Dummy {
            return Err(Exception::internal("unpushing the bottom sentinel target"));
        }
        let Some(pos) = self.active.iter().position(|t| *t == id) else {
            return Err(Exception::internal(format!(
                "unpushing target id {} that is not on the stack",
                id.0
            )));
        };
        self.targets[id.0].close();
        self.active.remove(pos);
        self.refresh();
        Ok(())
    }

    /// Dispatch an attach request.
    pub fn attach(&mut self, pid: ProcessId) -> Result<()>
    {
        match self.provider(TargetOp::Attach) {
            Provider::Target(id) => self.targets[id.0].attach(pid),
            Provider::Default(behavior) => Err(self.default_failure(TargetOp::Attach, behavior)),
        }
    }

    /// Dispatch a detach request. Detaching with no provider is a no-op.
    pub fn detach(&mut self) -> Result<()>
    {
        match self.provider(TargetOp::Detach) {
            Provider::Target(id) => self.targets[id.0].detach(),
            Provider::Default(_) => Ok(()),
        }
    }

    /// Dispatch a resume request.
    pub fn resume(&mut self, request: &ResumeRequest) -> Result<()>
    {
        match self.provider(TargetOp::Resume) {
            Provider::Target(id) => self.targets[id.0].resume(request),
            Provider::Default(behavior) => Err(self.default_failure(TargetOp::Resume, behavior)),
        }
    }

    /// Dispatch a wait request.
    pub fn wait(&mut self) -> Result<WaitEvent>
    {
        match self.provider(TargetOp::Wait) {
            Provider::Target(id) => self.targets[id.0].wait(),
            Provider::Default(behavior) => Err(self.default_failure(TargetOp::Wait, behavior)),
        }
    }

    /// Dispatch a register fetch into `sink`.
    pub fn fetch_registers(&mut self, thread: ThreadId, reg: Option<RegisterId>, sink: &mut dyn RegisterSink)
        -> Result<()>
    {
        match self.provider(TargetOp::FetchRegisters) {
            Provider::Target(id) => self.targets[id.0].fetch_registers(thread, reg, sink),
            Provider::Default(behavior) => Err(self.default_failure(TargetOp::FetchRegisters, behavior)),
        }
    }

    /// Dispatch a register store from `source`.
    pub fn store_registers(&mut self, thread: ThreadId, reg: Option<RegisterId>, source: &mut dyn RegisterSource)
        -> Result<()>
    {
        match self.provider(TargetOp::StoreRegisters) {
            Provider::Target(id) => self.targets[id.0].store_registers(thread, reg, source),
            Provider::Default(behavior) => Err(self.default_failure(TargetOp::StoreRegisters, behavior)),
        }
    }

    /// Dispatch a prepare-to-store request.
    pub fn prepare_to_store(&mut self, thread: ThreadId) -> Result<()>
    {
        match self.provider(TargetOp::PrepareToStore) {
            Provider::Target(id) => self.targets[id.0].prepare_to_store(thread),
            Provider::Default(behavior) => Err(self.default_failure(TargetOp::PrepareToStore, behavior)),
        }
    }

    /// Dispatch a thread liveness probe. With no provider, nothing is alive.
    pub fn thread_alive(&mut self, thread: ThreadId) -> Result<bool>
    {
        match self.provider(TargetOp::ThreadAlive) {
            Provider::Target(id) => self.targets[id.0].thread_alive(thread),
            Provider::Default(_) => Ok(false),
        }
    }

    /// Dispatch thread discovery. With no provider, nothing is found.
    pub fn find_new_threads(&mut self) -> Result<Vec<ThreadId>>
    {
        match self.provider(TargetOp::FindNewThreads) {
            Provider::Target(id) => self.targets[id.0].find_new_threads(),
            Provider::Default(_) => Ok(Vec::new()),
        }
    }

    /// Walk the active chain moving one chunk of `object` at `offset`.
    ///
    /// Unlike the single-provider operations, transfers consult every layer:
    /// a target that cannot help passes the request down. Memory requests
    /// treat end-of-data and unsupported alike and keep walking; for the
    /// other objects an end-of-data answer is authoritative and ends the
    /// object at this offset.
    pub fn xfer_walk(&mut self, object: TransferObject, annex: Option<&str>, offset: u64, mut io: TransferIo<'_>)
        -> Result<TransferStatus>
    {
        let len = io.len();
        if len == 0 {
            return Ok(TransferStatus::Complete(0));
        }

        for idx in 0..self.active.len() {
            let id = self.active[idx];
            if !self.targets[id.0].capabilities().contains(TargetOp::Transfer) {
                continue;
            }
            match self.targets[id.0].transfer(object, annex, offset, io.reborrow())? {
                XferChunk::Bytes(n) => {
                    if n == 0 || n > len {
                        return Err(Exception::internal(format!(
                            "target {} moved {n} bytes of a {len} byte transfer",
                            self.targets[id.0].info().shortname()
                        )));
                    }
                    let status = if n == len {
                        TransferStatus::Complete(n)
                    } else {
                        TransferStatus::Partial(n)
                    };
                    return Ok(status);
                }
                XferChunk::Eof => {
                    if object != TransferObject::Memory {
                        return Ok(TransferStatus::Complete(0));
                    }
                }
                XferChunk::Unsupported => {}
            }
        }

        let failure = if object == TransferObject::Memory {
            TransferError::Exhausted { object, offset }
        } else {
            TransferError::Unsupported(object)
        };
        Ok(TransferStatus::Failed(failure))
    }

    fn refresh(&mut self)
    {
        self.composite = Composite::resolve(&self.targets, &self.active);
        debug!(top = self.top_shortname(), depth = self.active.len(), "target stack changed");
    }

    fn default_failure(&self, op: TargetOp, behavior: DefaultBehavior) -> Exception
    {
        match behavior {
            DefaultBehavior::NoProcess => {
                Exception::error(ErrorKind::NoProcess, "You can't do that without a process to debug.")
            }
            _ => Exception::error(
                ErrorKind::Unsupported,
                format!("\"{op}\" is not supported by the `{}' target", self.top_shortname()),
            ),
        }
    }

    fn checked(&self, id: TargetId) -> Result<&dyn Target>
    {
        self.targets
            .get(id.0)
            .map(|target| &**target)
            .ok_or_else(|| Exception::internal(format!("unregistered target id {}", id.0)))
    }

    fn checked_mut(&mut self, id: TargetId) -> Result<&mut dyn Target>
    {
        let target = self
            .targets
            .get_mut(id.0)
            .ok_or_else(|| Exception::internal(format!("unregistered target id {}", id.0)))?;
        Ok(&mut **target)
    }
}

impl Default for TargetStack
{
    fn default() -> Self
    {
        TargetStack::new()
    }
}
