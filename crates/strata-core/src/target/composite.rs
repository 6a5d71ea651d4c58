//! # Composite Operation Table
//!
//! Dispatch never searches the stack at call time. Every mutation of the
//! stack recomputes one [`Composite`] table mapping each [`TargetOp`] to its
//! provider, so a dispatched operation is a single indexed load. The table
//! also snapshots the ORed liveness claims of the active targets.

use tracing::trace;

use crate::target::{Target, TargetId, TargetOp};

/// Who answers an operation when it is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider
{
    /// The highest active target that claims the operation.
    Target(TargetId),
    /// No active target claims it; the documented default applies.
    Default(DefaultBehavior),
}

/// Documented behavior of an operation nothing on the stack provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultBehavior
{
    /// Fail: the operation is not supported by the current target.
    Unsupported,
    /// Fail: the operation needs a process and there is none.
    NoProcess,
    /// Succeed silently without doing anything.
    Ignore,
    /// Report the thread as not alive.
    NotAlive,
    /// Transfers have no fallback provider; the walk reports exhaustion.
    NoTransfer,
}

/// The default for each operation, used when no active target claims it.
///
/// Operations that only make sense against a process fail with the
/// no-process message; operations that are advisory succeed as no-ops.
#[must_use]
pub(crate) const fn default_behavior(op: TargetOp) -> DefaultBehavior
{
    match op {
        TargetOp::Attach => DefaultBehavior::Unsupported,
        TargetOp::Detach | TargetOp::FindNewThreads => DefaultBehavior::Ignore,
        TargetOp::Resume
        | TargetOp::Wait
        | TargetOp::FetchRegisters
        | TargetOp::StoreRegisters
        | TargetOp::PrepareToStore => DefaultBehavior::NoProcess,
        TargetOp::Transfer => DefaultBehavior::NoTransfer,
        TargetOp::ThreadAlive => DefaultBehavior::NotAlive,
    }
}

/// Snapshot of dispatch routing for the current stack arrangement.
#[derive(Debug, Clone)]
pub struct Composite
{
    providers: [Provider; TargetOp::COUNT],
    top: TargetId,
    has_all_memory: bool,
    has_memory: bool,
    has_stack: bool,
    has_registers: bool,
    has_execution: bool,
}

impl Composite
{
    /// Recompute the table from the active stack, top first.
    ///
    /// `active` holds registry ids ordered top to bottom and is never empty;
    /// the dummy target sits at the end.
    pub(crate) fn resolve(registry: &[Box<dyn Target>], active: &[TargetId]) -> Composite
    {
        let providers = TargetOp::ALL.map(|op| {
            for id in active {
                if registry[id.0].capabilities().contains(op) {
                    trace!(op = %op, provider = registry[id.0].info().shortname(), "composite provider");
                    return Provider::Target(*id);
                }
            }
            Provider::Default(default_behavior(op))
        });

        let mut composite = Composite {
            providers,
            top: active[0],
            has_all_memory: false,
            has_memory: false,
            has_stack: false,
            has_registers: false,
            has_execution: false,
        };
        for id in active {
            let info = registry[id.0].info();
            composite.has_all_memory |= info.has_all_memory();
            composite.has_memory |= info.has_memory();
            composite.has_stack |= info.has_stack();
            composite.has_registers |= info.has_registers();
            composite.has_execution |= info.has_execution();
        }
        composite
    }

    /// The provider for `op`.
    #[must_use]
    pub const fn provider(&self, op: TargetOp) -> Provider
    {
        self.providers[op.index()]
    }

    /// The target currently on top of the stack.
    #[must_use]
    pub const fn top(&self) -> TargetId
    {
        self.top
    }

    /// Whether any active target can serve any readable address.
    #[must_use]
    pub const fn has_all_memory(&self) -> bool
    {
        self.has_all_memory
    }

    /// Whether any active target serves some memory.
    #[must_use]
    pub const fn has_memory(&self) -> bool
    {
        self.has_memory
    }

    /// Whether any active target has a call stack.
    #[must_use]
    pub const fn has_stack(&self) -> bool
    {
        self.has_stack
    }

    /// Whether any active target has register state.
    #[must_use]
    pub const fn has_registers(&self) -> bool
    {
        self.has_registers
    }

    /// Whether any active target can run.
    #[must_use]
    pub const fn has_execution(&self) -> bool
    {
        self.has_execution
    }
}
