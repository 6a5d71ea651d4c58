//! Common module for library exports

pub use crate::arch::{Arch, RawRegisterAccess};
pub use crate::exception::{CatchMask, Caught, CleanupMark, ErrorKind, Exception, ExceptionCategory, Result};
pub use crate::regcache::{Regcache, RegcacheLayout};
pub use crate::session::{Session, SessionConfig};
pub use crate::target::{
    DummyTarget, OpSet, Provider, ResumeRequest, Stratum, Target, TargetId, TargetInfo, TargetOp, TargetStack,
    WaitEvent, WaitStatus,
};
pub use crate::transfer::{
    DataCache, Section, SectionTable, TransferError, TransferIo, TransferObject, TransferStatus, XferChunk,
};
pub use crate::types::{
    Address, ByteOrder, ProcessId, RegisterBytes, RegisterClass, RegisterGroup, RegisterId, RegisterStatus, ThreadId,
};
