//! # Dummy Target
//!
//! The permanent bottom of every target stack. It claims no operations and
//! no liveness, so provider resolution that reaches it falls through to the
//! documented defaults.

use crate::target::{OpSet, Stratum, Target, TargetInfo};

/// The target that is "active" when nothing real is.
#[derive(Debug)]
pub struct DummyTarget
{
    info: TargetInfo,
}

impl DummyTarget
{
    #[must_use]
    pub fn new() -> Self
    {
        DummyTarget {
            info: TargetInfo::builder("none", Stratum::Dummy)
                .longname("None")
                .doc("The empty target; no process is being debugged.")
                .build(),
        }
    }
}

impl Default for DummyTarget
{
    fn default() -> Self
    {
        DummyTarget::new()
    }
}

impl Target for DummyTarget
{
    fn info(&self) -> &TargetInfo
    {
        &self.info
    }

    fn capabilities(&self) -> OpSet
    {
        OpSet::EMPTY
    }
}
