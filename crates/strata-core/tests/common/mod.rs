//! Shared fixtures: a scripted architecture and target for driving a
//! session without a live inferior.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use strata_core::arch::{Arch, RawRegisterAccess};
use strata_core::exception::{ErrorKind, Exception, Result};
use strata_core::regcache::{RegisterSink, RegisterSource};
use strata_core::session::{Session, SessionConfig};
use strata_core::target::{OpSet, ResumeRequest, Stratum, Target, TargetInfo, TargetOp, WaitEvent, WaitStatus};
use strata_core::transfer::{TransferIo, TransferObject, XferChunk};
use strata_core::types::{ByteOrder, ProcessId, RegisterClass, RegisterId, ThreadId};

static LOG_INIT: Once = Once::new();

/// Route tracing output through the shared bootstrap once per test binary.
pub fn init_test_logging()
{
    LOG_INIT.call_once(|| {
        let _ = strata_utils::init_logging_with_level(strata_utils::LogLevel::Warn, strata_utils::LogFormat::Pretty);
    });
}

/// Test architecture: eight 8-byte raw registers plus two cooked ones.
///
/// - Register 6 ("ghost") can be neither fetched nor stored; it reads as
///   zeros.
/// - Register 7 ("flags") is a status register that cannot be stored.
/// - Register 8 ("wide", 16 bytes) is the concatenation of r0 and r1.
/// - Register 9 ("lo", 4 bytes) is the low half of r2.
pub struct FakeArch;

pub const RAW_COUNT: usize = 8;
pub const REG_COUNT: usize = 10;
pub const GHOST: RegisterId = RegisterId(6);
pub const FLAGS: RegisterId = RegisterId(7);
pub const WIDE: RegisterId = RegisterId(8);
pub const LO: RegisterId = RegisterId(9);

const NAMES: [&str; REG_COUNT] = ["r0", "r1", "r2", "r3", "r4", "r5", "ghost", "flags", "wide", "lo"];

impl Arch for FakeArch
{
    fn name(&self) -> &str
    {
        "fake64"
    }

    fn byte_order(&self) -> ByteOrder
    {
        ByteOrder::Little
    }

    fn register_count(&self) -> usize
    {
        REG_COUNT
    }

    fn raw_register_count(&self) -> usize
    {
        RAW_COUNT
    }

    fn register_name(&self, reg: RegisterId) -> &str
    {
        NAMES.get(reg.index()).copied().unwrap_or("?")
    }

    fn register_size(&self, reg: RegisterId) -> usize
    {
        match reg {
            WIDE => 16,
            LO => 4,
            _ => 8,
        }
    }

    fn register_class(&self, reg: RegisterId) -> RegisterClass
    {
        if reg == FLAGS { RegisterClass::Status } else { RegisterClass::General }
    }

    fn cannot_fetch(&self, reg: RegisterId) -> bool
    {
        reg == GHOST
    }

    fn cannot_store(&self, reg: RegisterId) -> bool
    {
        reg == FLAGS || reg == GHOST
    }

    fn pseudo_register_read(&self, raw: &mut dyn RawRegisterAccess, reg: RegisterId, buf: &mut [u8]) -> Result<()>
    {
        match reg {
            WIDE => {
                raw.read_raw(RegisterId(0), &mut buf[..8])?;
                raw.read_raw(RegisterId(1), &mut buf[8..])
            }
            LO => {
                let mut whole = [0u8; 8];
                raw.read_raw(RegisterId(2), &mut whole)?;
                buf.copy_from_slice(&whole[..4]);
                Ok(())
            }
            _ => Err(Exception::internal(format!("unexpected cooked read of register {}", reg.index()))),
        }
    }

    fn pseudo_register_write(&self, raw: &mut dyn RawRegisterAccess, reg: RegisterId, bytes: &[u8]) -> Result<()>
    {
        match reg {
            WIDE => {
                raw.write_raw(RegisterId(0), &bytes[..8])?;
                raw.write_raw(RegisterId(1), &bytes[8..])
            }
            LO => {
                let mut whole = [0u8; 8];
                raw.read_raw(RegisterId(2), &mut whole)?;
                whole[..4].copy_from_slice(bytes);
                raw.write_raw(RegisterId(2), &whole)
            }
            _ => Err(Exception::internal(format!("unexpected cooked write of register {}", reg.index()))),
        }
    }
}

/// The register value a [`FakeTarget`] with `seed` supplies for `index`.
pub fn raw_value(seed: u64, index: usize) -> [u8; 8]
{
    (seed + index as u64).to_le_bytes()
}

/// Call tallies and captured traffic, shared with the test through `Rc`.
#[derive(Debug, Default)]
pub struct Counters
{
    pub opens: usize,
    pub closes: usize,
    pub attaches: usize,
    pub detaches: usize,
    pub resumes: usize,
    pub waits: usize,
    pub fetches: usize,
    pub prepares: usize,
    pub stores: usize,
    pub transfers: usize,
    pub open_args: Vec<String>,
    /// Register stores that reached the target, as (index, bytes).
    pub stored: Vec<(usize, Vec<u8>)>,
}

/// A fully scripted backend over [`FakeArch`] registers and byte blocks.
pub struct FakeTarget
{
    info: TargetInfo,
    caps: OpSet,
    counters: Rc<RefCell<Counters>>,
    seed: u64,
    extra_supply: Vec<usize>,
    fail_open: bool,
    fail_fetch: bool,
    mute_fetch: bool,
    miss_unsupported: bool,
    chunk_limit: Option<usize>,
    memory: Vec<(u64, Rc<RefCell<Vec<u8>>>)>,
    objects: Vec<(TransferObject, Option<String>, Vec<u8>)>,
    events: Vec<WaitEvent>,
    alive: Vec<ThreadId>,
    discovered: Vec<ThreadId>,
}

impl FakeTarget
{
    pub fn builder(shortname: &'static str, stratum: Stratum) -> FakeTargetBuilder
    {
        FakeTargetBuilder {
            shortname,
            stratum,
            ops: Vec::new(),
            memory_flag: false,
            registers_flag: false,
            stack_flag: false,
            execution_flag: false,
            seed: 0,
            extra_supply: Vec::new(),
            fail_open: false,
            fail_fetch: false,
            mute_fetch: false,
            miss_unsupported: false,
            chunk_limit: None,
            memory: Vec::new(),
            objects: Vec::new(),
            events: Vec::new(),
            alive: Vec::new(),
            discovered: Vec::new(),
        }
    }

    /// A handle onto this target's call tallies.
    pub fn counters(&self) -> Rc<RefCell<Counters>>
    {
        Rc::clone(&self.counters)
    }

    fn supply_one(&self, index: usize, sink: &mut dyn RegisterSink) -> Result<()>
    {
        sink.supply(RegisterId(index), &raw_value(self.seed, index))
    }
}

impl Target for FakeTarget
{
    fn info(&self) -> &TargetInfo
    {
        &self.info
    }

    fn capabilities(&self) -> OpSet
    {
        self.caps
    }

    fn open(&mut self, args: &str) -> Result<()>
    {
        let mut counters = self.counters.borrow_mut();
        counters.opens += 1;
        counters.open_args.push(args.to_string());
        if self.fail_open {
            return Err(Exception::error(ErrorKind::Generic, "scripted open failure"));
        }
        Ok(())
    }

    fn close(&mut self)
    {
        self.counters.borrow_mut().closes += 1;
    }

    fn attach(&mut self, _pid: ProcessId) -> Result<()>
    {
        self.counters.borrow_mut().attaches += 1;
        Ok(())
    }

    fn detach(&mut self) -> Result<()>
    {
        self.counters.borrow_mut().detaches += 1;
        Ok(())
    }

    fn resume(&mut self, _request: &ResumeRequest) -> Result<()>
    {
        self.counters.borrow_mut().resumes += 1;
        Ok(())
    }

    fn wait(&mut self) -> Result<WaitEvent>
    {
        self.counters.borrow_mut().waits += 1;
        if self.events.is_empty() {
            return Err(Exception::error(ErrorKind::TargetFailure, "no scripted wait events left"));
        }
        Ok(self.events.remove(0))
    }

    fn fetch_registers(&mut self, _thread: ThreadId, reg: Option<RegisterId>, sink: &mut dyn RegisterSink)
        -> Result<()>
    {
        self.counters.borrow_mut().fetches += 1;
        if self.fail_fetch {
            return Err(Exception::error(ErrorKind::TargetFailure, "scripted register fetch failure"));
        }
        if self.mute_fetch {
            return Ok(());
        }
        match reg {
            Some(reg) => self.supply_one(reg.index(), sink)?,
            None => {
                for index in (0..RAW_COUNT).filter(|&index| index != GHOST.index()) {
                    self.supply_one(index, sink)?;
                }
            }
        }
        for &index in &self.extra_supply {
            self.supply_one(index, sink)?;
        }
        Ok(())
    }

    fn store_registers(&mut self, _thread: ThreadId, reg: Option<RegisterId>, source: &mut dyn RegisterSource)
        -> Result<()>
    {
        let mut counters = self.counters.borrow_mut();
        counters.stores += 1;
        if let Some(reg) = reg {
            let mut buf = [0u8; 8];
            source.collect(reg, &mut buf)?;
            counters.stored.push((reg.index(), buf.to_vec()));
        }
        Ok(())
    }

    fn prepare_to_store(&mut self, _thread: ThreadId) -> Result<()>
    {
        self.counters.borrow_mut().prepares += 1;
        Ok(())
    }

    fn transfer(&mut self, object: TransferObject, annex: Option<&str>, offset: u64, io: TransferIo<'_>)
        -> Result<XferChunk>
    {
        self.counters.borrow_mut().transfers += 1;
        if object == TransferObject::Memory {
            for (base, block) in &self.memory {
                let mut block = block.borrow_mut();
                let len = block.len() as u64;
                if offset < *base || offset >= *base + len {
                    continue;
                }
                let start = (offset - base) as usize;
                let room = block.len() - start;
                return Ok(match io {
                    TransferIo::Read(buf) => {
                        let n = self.chunk_limit.unwrap_or(usize::MAX).min(buf.len()).min(room);
                        buf[..n].copy_from_slice(&block[start..start + n]);
                        XferChunk::Bytes(n)
                    }
                    TransferIo::Write(bytes) => {
                        let n = self.chunk_limit.unwrap_or(usize::MAX).min(bytes.len()).min(room);
                        block[start..start + n].copy_from_slice(&bytes[..n]);
                        XferChunk::Bytes(n)
                    }
                });
            }
            return Ok(if self.miss_unsupported { XferChunk::Unsupported } else { XferChunk::Eof });
        }
        for (kind, wanted_annex, data) in &self.objects {
            if *kind != object || wanted_annex.as_deref() != annex {
                continue;
            }
            let TransferIo::Read(buf) = io else {
                return Ok(XferChunk::Unsupported);
            };
            let start = offset as usize;
            if start >= data.len() {
                return Ok(XferChunk::Eof);
            }
            let n = self.chunk_limit.unwrap_or(usize::MAX).min(buf.len()).min(data.len() - start);
            buf[..n].copy_from_slice(&data[start..start + n]);
            return Ok(XferChunk::Bytes(n));
        }
        Ok(XferChunk::Unsupported)
    }

    fn thread_alive(&mut self, thread: ThreadId) -> Result<bool>
    {
        Ok(self.alive.contains(&thread))
    }

    fn find_new_threads(&mut self) -> Result<Vec<ThreadId>>
    {
        Ok(self.discovered.clone())
    }
}

pub struct FakeTargetBuilder
{
    shortname: &'static str,
    stratum: Stratum,
    ops: Vec<TargetOp>,
    memory_flag: bool,
    registers_flag: bool,
    stack_flag: bool,
    execution_flag: bool,
    seed: u64,
    extra_supply: Vec<usize>,
    fail_open: bool,
    fail_fetch: bool,
    mute_fetch: bool,
    miss_unsupported: bool,
    chunk_limit: Option<usize>,
    memory: Vec<(u64, Rc<RefCell<Vec<u8>>>)>,
    objects: Vec<(TransferObject, Option<String>, Vec<u8>)>,
    events: Vec<WaitEvent>,
    alive: Vec<ThreadId>,
    discovered: Vec<ThreadId>,
}

impl FakeTargetBuilder
{
    pub fn caps(mut self, ops: &[TargetOp]) -> Self
    {
        self.ops.extend_from_slice(ops);
        self
    }

    pub fn memory(mut self) -> Self
    {
        self.memory_flag = true;
        self
    }

    pub fn registers(mut self) -> Self
    {
        self.registers_flag = true;
        self
    }

    pub fn stack(mut self) -> Self
    {
        self.stack_flag = true;
        self
    }

    pub fn execution(mut self) -> Self
    {
        self.execution_flag = true;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self
    {
        self.seed = seed;
        self
    }

    /// Also supply these registers on every fetch, like a `g` packet that
    /// returns more than was asked for.
    pub fn extra_supply(mut self, indexes: &[usize]) -> Self
    {
        self.extra_supply.extend_from_slice(indexes);
        self
    }

    pub fn fail_open(mut self) -> Self
    {
        self.fail_open = true;
        self
    }

    pub fn fail_fetch(mut self) -> Self
    {
        self.fail_fetch = true;
        self
    }

    /// Fetches succeed but supply nothing.
    pub fn mute_fetch(mut self) -> Self
    {
        self.mute_fetch = true;
        self
    }

    /// Report misses as `Unsupported` instead of `Eof`.
    pub fn miss_unsupported(mut self) -> Self
    {
        self.miss_unsupported = true;
        self
    }

    /// Move at most `n` bytes per transfer round.
    pub fn chunk_limit(mut self, n: usize) -> Self
    {
        self.chunk_limit = Some(n);
        self
    }

    pub fn memory_block(mut self, base: u64, bytes: &[u8]) -> Self
    {
        self.memory.push((base, Rc::new(RefCell::new(bytes.to_vec()))));
        self
    }

    /// A memory block the test keeps a handle on, to assert what writes did.
    pub fn memory_block_shared(mut self, base: u64, block: Rc<RefCell<Vec<u8>>>) -> Self
    {
        self.memory.push((base, block));
        self
    }

    pub fn object(mut self, object: TransferObject, annex: Option<&str>, bytes: &[u8]) -> Self
    {
        self.objects.push((object, annex.map(str::to_string), bytes.to_vec()));
        self
    }

    pub fn wait_event(mut self, thread: u64, status: WaitStatus) -> Self
    {
        self.events.push(WaitEvent {
            thread: ThreadId(thread),
            status,
        });
        self
    }

    pub fn alive(mut self, threads: &[u64]) -> Self
    {
        self.alive.extend(threads.iter().copied().map(ThreadId));
        self
    }

    pub fn discovered(mut self, threads: &[u64]) -> Self
    {
        self.discovered.extend(threads.iter().copied().map(ThreadId));
        self
    }

    pub fn finish(self) -> FakeTarget
    {
        let mut caps = OpSet::EMPTY;
        for op in &self.ops {
            caps.insert(*op);
        }
        let mut info = TargetInfo::builder(self.shortname, self.stratum)
            .longname("Scripted test backend")
            .doc("Backend driven entirely by test fixtures.");
        if self.memory_flag {
            info = info.memory(true);
        }
        if self.registers_flag {
            info = info.registers(true);
        }
        if self.stack_flag {
            info = info.stack(true);
        }
        if self.execution_flag {
            info = info.execution(true);
        }
        FakeTarget {
            info: info.build(),
            caps,
            counters: Rc::new(RefCell::new(Counters::default())),
            seed: self.seed,
            extra_supply: self.extra_supply,
            fail_open: self.fail_open,
            fail_fetch: self.fail_fetch,
            mute_fetch: self.mute_fetch,
            miss_unsupported: self.miss_unsupported,
            chunk_limit: self.chunk_limit,
            memory: self.memory,
            objects: self.objects,
            events: self.events,
            alive: self.alive,
            discovered: self.discovered,
        }
    }
}

/// A session over [`FakeArch`] with the given configuration.
pub fn session_with_config(config: SessionConfig) -> Session
{
    init_test_logging();
    Session::new(std::sync::Arc::new(FakeArch), config).expect("session over the fake arch")
}

/// A session over [`FakeArch`] with default configuration.
pub fn new_session() -> Session
{
    session_with_config(SessionConfig::default())
}

/// A process-stratum target claiming every operation, with registers seeded
/// from `seed`.
pub fn process_builder(seed: u64) -> FakeTargetBuilder
{
    FakeTarget::builder("fake-proc", Stratum::Process)
        .caps(&TargetOp::ALL)
        .memory()
        .registers()
        .stack()
        .execution()
        .seed(seed)
}
