//! Catcher frames and cleanup chains.
//!
//! A catcher frame is created on entry to a protected region and retired on
//! exit, normal or exceptional. Frames nest strictly LIFO and every state
//! transition is driven by one of four actions; an action that is invalid for
//! the frame's current state is itself an internal consistency failure, since
//! it means the protection machinery was misused.

use tracing::trace;

use super::{CatchMask, Exception, Result};

/// Lifecycle states of a catcher frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CatcherState
{
    /// Frame pushed, region not yet entered.
    Created,
    /// Inside the protected region.
    Running,
    /// Inside the region's single body run.
    RunningSecondary,
    /// An exception was signalled; the region is unwinding.
    Aborting,
}

/// Actions that drive a catcher frame through its states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CatcherAction
{
    /// Enter the protected region (valid only once, from `Created`).
    EnterProtectedRegion,
    /// Completion check; retires the frame.
    Iterate,
    /// Loop-body variant: requests the single body run, then reports it done.
    IterateSecondary,
    /// An exception was raised inside the region.
    SignalException,
}

/// What the state machine asks of the caller after an action.
#[derive(Debug)]
pub(crate) enum Advance
{
    /// Run the protected body now.
    RunBody,
    /// Nothing to do; the region continues.
    Continue,
    /// The frame was retired; the region is over.
    Finished(RetiredFrame),
}

/// A catcher frame after retirement.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetiredFrame
{
    /// Categories the region absorbs.
    pub mask: CatchMask,
    /// Cleanup chain position when the frame was created.
    pub cleanup_mark: CleanupMark,
    /// Whether the frame retired on the exception path.
    pub aborted: bool,
}

#[derive(Debug)]
struct CatcherFrame
{
    mask: CatchMask,
    state: CatcherState,
    cleanup_mark: CleanupMark,
}

/// LIFO stack of catcher frames, independent of the target stack.
#[derive(Debug, Default)]
pub(crate) struct CatcherStack
{
    frames: Vec<CatcherFrame>,
}

impl CatcherStack
{
    pub(crate) fn new() -> Self
    {
        Self::default()
    }

    /// Number of live frames.
    pub(crate) fn depth(&self) -> usize
    {
        self.frames.len()
    }

    /// Push a frame in the `Created` state.
    pub(crate) fn push(&mut self, mask: CatchMask, cleanup_mark: CleanupMark)
    {
        trace!("catcher frame created at depth {}", self.frames.len());
        self.frames.push(CatcherFrame {
            mask,
            state: CatcherState::Created,
            cleanup_mark,
        });
    }

    /// Apply an action to the innermost frame.
    ///
    /// Invalid (state, action) pairs are internal consistency failures.
    pub(crate) fn advance(&mut self, action: CatcherAction) -> Result<Advance>
    {
        let state = self
            .frames
            .last()
            .map(|frame| frame.state)
            .ok_or_else(|| Exception::internal("catcher action with no active catcher frame"))?;

        match (state, action) {
            (CatcherState::Created, CatcherAction::EnterProtectedRegion) => {
                self.set_state(CatcherState::Running)?;
                Ok(Advance::Continue)
            }
            (CatcherState::Running, CatcherAction::IterateSecondary) => {
                self.set_state(CatcherState::RunningSecondary)?;
                Ok(Advance::RunBody)
            }
            (CatcherState::RunningSecondary, CatcherAction::IterateSecondary) => Ok(Advance::Continue),
            (CatcherState::Running | CatcherState::RunningSecondary, CatcherAction::SignalException) => {
                self.set_state(CatcherState::Aborting)?;
                Ok(Advance::Continue)
            }
            (CatcherState::Running | CatcherState::RunningSecondary, CatcherAction::Iterate) => {
                Ok(Advance::Finished(self.retire(false)?))
            }
            (CatcherState::Aborting, CatcherAction::Iterate) => Ok(Advance::Finished(self.retire(true)?)),
            (state, action) => Err(Exception::internal(format!(
                "invalid catcher transition: {action:?} in state {state:?}"
            ))),
        }
    }

    fn set_state(&mut self, state: CatcherState) -> Result<()>
    {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| Exception::internal("catcher frame vanished mid-transition"))?;
        frame.state = state;
        Ok(())
    }

    fn retire(&mut self, aborted: bool) -> Result<RetiredFrame>
    {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Exception::internal("retiring catcher frame from an empty stack"))?;
        trace!("catcher frame retired (aborted: {aborted}) at depth {}", self.frames.len());
        Ok(RetiredFrame {
            mask: frame.mask,
            cleanup_mark: frame.cleanup_mark,
            aborted,
        })
    }
}

/// Position in a cleanup chain, captured before registering cleanups and used
/// to run or discard everything registered after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupMark(pub(crate) usize);

type CleanupFn<Ctx> = Box<dyn FnOnce(&mut Ctx)>;

/// LIFO chain of cleanup actions.
///
/// Cleanups restore context that an unwinding exception would otherwise
/// leave behind: a selected thread, a temporarily pushed target, a toggled
/// setting. They run innermost first, on the exceptional path and the normal
/// one alike, whenever control leaves the protected region they were
/// registered under.
///
/// The chain is generic over the context handed to each cleanup so that this
/// module stays free of dependencies on the rest of the core.
#[derive(Default)]
pub struct CleanupChain<Ctx>
{
    entries: Vec<CleanupFn<Ctx>>,
}

impl<Ctx> CleanupChain<Ctx>
{
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self
    {
        Self { entries: Vec::new() }
    }

    /// Current position, for later `take_since` / `discard_to` calls.
    #[must_use]
    pub fn mark(&self) -> CleanupMark
    {
        CleanupMark(self.entries.len())
    }

    /// Register a cleanup action.
    pub fn register<F>(&mut self, cleanup: F)
    where
        F: FnOnce(&mut Ctx) + 'static,
    {
        self.entries.push(Box::new(cleanup));
    }

    /// Remove and return every cleanup registered since `mark`, in
    /// registration order. Callers run them in reverse for innermost-first
    /// execution.
    pub fn take_since(&mut self, mark: CleanupMark) -> Vec<CleanupFn<Ctx>>
    {
        let at = mark.0.min(self.entries.len());
        self.entries.split_off(at)
    }

    /// Drop every cleanup registered since `mark` without running it.
    pub fn discard_to(&mut self, mark: CleanupMark)
    {
        let at = mark.0.min(self.entries.len());
        self.entries.truncate(at);
    }

    /// Number of registered cleanups.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

impl<Ctx> std::fmt::Debug for CleanupChain<Ctx>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("CleanupChain").field("entries", &self.entries.len()).finish()
    }
}
