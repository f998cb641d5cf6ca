//! Tagged guest addresses as recorded in the dynamic trace.
//!
//! Every memory/branch record in the trace carries an `AddrEntry` naming the
//! storage the emulator touched: guest RAM, the tracked register file, I/O
//! space, and so on. The evaluator keys its abstract memory on these, so the
//! whole struct is `Copy + Eq + Hash`.

use std::fmt;

/// Which address space an `AddrEntry` lives in. The numeric values match the
/// `addr_kind` field of the on-disk trace format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AddrKind {
    /// Host virtual address (emulator-internal state)
    HAddr,
    /// Guest physical RAM
    MAddr,
    /// Guest I/O space
    IAddr,
    /// IR-local temporary storage
    LAddr,
    /// Guest general-purpose register
    GReg,
    /// Guest special-purpose state (flags, control registers, ...)
    GSpec,
    /// Unknown provenance
    Unk,
    /// Constant operand
    Const,
    /// Return value slot
    Ret,
}

impl AddrKind {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(AddrKind::HAddr),
            1 => Some(AddrKind::MAddr),
            2 => Some(AddrKind::IAddr),
            3 => Some(AddrKind::LAddr),
            4 => Some(AddrKind::GReg),
            5 => Some(AddrKind::GSpec),
            6 => Some(AddrKind::Unk),
            7 => Some(AddrKind::Const),
            8 => Some(AddrKind::Ret),
            _ => None,
        }
    }
}

/// Validity flag attached to each address record by the emulator.
/// On disk this is a signed 32-bit field; `Irrelevant` is recorded as -1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AddrFlag {
    /// The recorded operation does not contribute to the analyzed dataflow
    Irrelevant,
    None,
    Exception,
    Readlog,
    Funcarg,
}

impl AddrFlag {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            -1 => Some(AddrFlag::Irrelevant),
            0 => Some(AddrFlag::None),
            1 => Some(AddrFlag::Exception),
            2 => Some(AddrFlag::Readlog),
            3 => Some(AddrFlag::Funcarg),
            _ => None,
        }
    }
}

/// Size of the tracked general-purpose register file. `GReg` entries at or
/// beyond this index are bookkeeping accesses and never produce messages.
pub const NUM_TRACKED_REGS: u64 = 16;

const REG_NAMES: [&str; NUM_TRACKED_REGS as usize] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];

/// A tagged guest address: address space, value, byte offset, and flag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AddrEntry {
    pub kind: AddrKind,
    pub val: u64,
    pub off: u32,
    pub flag: AddrFlag,
}

impl AddrEntry {
    /// Whether loads/stores touching this address should produce messages.
    /// Irrelevant-flagged addresses and registers beyond the tracked file are
    /// suppressed.
    pub fn is_interesting(&self) -> bool {
        if self.flag == AddrFlag::Irrelevant {
            return false;
        }
        !(self.kind == AddrKind::GReg && self.val >= NUM_TRACKED_REGS)
    }

    /// Whether this address refers to guest RAM. Only RAM cells get stable
    /// symbolic names for uninitialized loads.
    pub fn is_ram(&self) -> bool {
        self.kind == AddrKind::MAddr
    }
}

impl fmt::Display for AddrEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            AddrKind::MAddr => write!(f, "{:#010x}", self.val)?,
            AddrKind::GReg => {
                if self.val < NUM_TRACKED_REGS {
                    write!(f, "{}", REG_NAMES[self.val as usize])?
                } else {
                    write!(f, "greg[{}]", self.val)?
                }
            },
            AddrKind::HAddr => write!(f, "host[{:#x}]", self.val)?,
            AddrKind::IAddr => write!(f, "io[{:#x}]", self.val)?,
            AddrKind::LAddr => write!(f, "local[{:#x}]", self.val)?,
            AddrKind::GSpec => write!(f, "gspec[{}]", self.val)?,
            AddrKind::Unk => write!(f, "unk")?,
            AddrKind::Const => write!(f, "const[{:#x}]", self.val)?,
            AddrKind::Ret => write!(f, "ret")?,
        }
        if self.off != 0 {
            write!(f, "+{}", self.off)?;
        }
        Ok(())
    }
}
