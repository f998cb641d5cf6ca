//! The memlog associator: aligns the flat dynamic trace stream with the IR's
//! control flow.
//!
//! The associator walks functions in the dynamic order they were called and,
//! inside each function, follows the basic-block successors dictated by the
//! recorded branch decisions. Each instruction pops zero or one record from
//! the head of the stream; a type mismatch or an exhausted stream is a fatal
//! alignment fault. Calls to IR-defined helpers recurse, bracketing the
//! helper's own alignment as a nested sub-memlog.

use crate::addr::AddrEntry;
use crate::memlog::{AddrOp, TraceEntry};
use either::Either;
use llvm_ir::instruction::Call;
use llvm_ir::{BasicBlock, Constant, Function, Instruction, Module, Name, Operand, Terminator};
use log::{debug, warn};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// One dynamic event, attached to the instruction that caused it. The first
/// three variants are raw trace records; the rest are synthesized during
/// association.
#[derive(Clone, Debug, PartialEq)]
pub enum MemlogOp<'m> {
    Addr(AddrOp, AddrEntry),
    Branch(u32),
    Select(u32),
    Memset(AddrEntry),
    Memcpy { src: AddrEntry, dst: AddrEntry },
    /// The bracketed alignment of an inlined helper call
    HelperFunc(MemlogList<'m>),
}

/// An instruction-or-terminator position within a block. The trace protocol
/// treats both uniformly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step<'m> {
    Inst(&'m Instruction),
    Term(&'m Terminator),
}

impl fmt::Display for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Step::Inst(inst) => write!(f, "{}", inst),
            Step::Term(term) => write!(f, "{}", term),
        }
    }
}

/// A basic block on the dynamic path, with each step paired with at most one
/// event.
#[derive(Clone, Debug)]
pub struct AssociatedBlock<'m> {
    pub func: &'m Function,
    pub block: &'m BasicBlock,
    pub steps: Vec<(Step<'m>, Option<MemlogOp<'m>>)>,
}

impl PartialEq for AssociatedBlock<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.func.name == other.func.name
            && self.block.name == other.block.name
            && self.steps == other.steps
    }
}

/// The dynamic execution path: blocks in execution order.
pub type MemlogList<'m> = Vec<AssociatedBlock<'m>>;

/// Result of association: the (filtered) dynamic path plus the total number
/// of steps aligned, including discarded and nested ones.
#[derive(Clone, Debug)]
pub struct Associated<'m> {
    pub blocks: MemlogList<'m>,
    pub inst_count: usize,
}

/// Fatal alignment faults: the trace and the IR disagree structurally, which
/// invalidates all subsequent interpretation.
#[derive(Error, Debug)]
pub enum AlignError {
    #[error("dynamic function list names {0:?}, which is not defined in the module")]
    UnknownFunction(String),

    #[error("{func} has no basic blocks")]
    EmptyFunction { func: String },

    #[error("{func} has no block named {block}")]
    MissingBlock { func: String, block: String },

    #[error("trace exhausted while aligning `{inst}` in block {block} of {func}")]
    TraceExhausted { func: String, block: String, inst: String },

    #[error("trace record {record:?} does not match `{inst}` in block {block} of {func}")]
    RecordMismatch {
        func: String,
        block: String,
        inst: String,
        record: TraceEntry,
    },

    #[error("block {block} of {func} ends in unsupported terminator `{term}`")]
    UnsupportedTerminator { func: String, block: String, term: String },
}

/// Align `trace` against `module`, walking the functions named by
/// `func_list` in order. Only blocks of functions in `interesting` are
/// emitted (`None` emits everything); discarded blocks still consume their
/// events so the cursor stays correct.
pub fn associate<'m>(
    module: &'m Module,
    func_list: &[String],
    trace: &[TraceEntry],
    interesting: Option<&HashSet<String>>,
) -> Result<Associated<'m>, AlignError> {
    let mut assoc = Associator { module, trace, pos: 0, inst_count: 0 };
    let mut blocks = Vec::new();
    for fname in func_list {
        let func = module
            .get_func_by_name(fname)
            .ok_or_else(|| AlignError::UnknownFunction(fname.clone()))?;
        let fblocks = assoc.function(func)?;
        if interesting.map_or(true, |set| set.contains(fname)) {
            blocks.extend(fblocks);
        } else {
            debug!("discarding {} aligned blocks of {}", fblocks.len(), fname);
        }
    }
    if assoc.pos < trace.len() {
        warn!(
            "{} trace records left over after aligning all {} listed functions",
            trace.len() - assoc.pos,
            func_list.len()
        );
    }
    Ok(Associated { blocks, inst_count: assoc.inst_count })
}

struct Associator<'m, 't> {
    module: &'m Module,
    trace: &'t [TraceEntry],
    pos: usize,
    inst_count: usize,
}

/// Context for alignment diagnostics: the function and block being walked.
#[derive(Clone, Copy)]
struct At<'m> {
    func: &'m Function,
    block: &'m BasicBlock,
}

impl<'m> At<'m> {
    fn exhausted(&self, inst: impl fmt::Display) -> AlignError {
        AlignError::TraceExhausted {
            func: self.func.name.clone(),
            block: self.block.name.to_string(),
            inst: inst.to_string(),
        }
    }

    fn mismatch(&self, inst: impl fmt::Display, record: TraceEntry) -> AlignError {
        AlignError::RecordMismatch {
            func: self.func.name.clone(),
            block: self.block.name.to_string(),
            inst: inst.to_string(),
            record,
        }
    }
}

impl<'m, 't> Associator<'m, 't> {
    fn pop(&mut self, at: At<'m>, inst: impl fmt::Display) -> Result<TraceEntry, AlignError> {
        match self.trace.get(self.pos) {
            Some(entry) => {
                self.pos += 1;
                Ok(*entry)
            },
            None => Err(at.exhausted(inst)),
        }
    }

    fn function(&mut self, func: &'m Function) -> Result<MemlogList<'m>, AlignError> {
        let mut out = Vec::new();
        let mut block = func
            .basic_blocks
            .first()
            .ok_or_else(|| AlignError::EmptyFunction { func: func.name.clone() })?;
        loop {
            let (steps, next) = self.block(At { func, block })?;
            out.push(AssociatedBlock { func, block, steps });
            match next {
                Some(name) => block = find_block(func, name)?,
                None => break,
            }
        }
        Ok(out)
    }

    /// Align one block. Returns the paired steps and the successor chosen by
    /// the trace, or `None` if the function terminates here.
    #[allow(clippy::type_complexity)]
    fn block(
        &mut self,
        at: At<'m>,
    ) -> Result<(Vec<(Step<'m>, Option<MemlogOp<'m>>)>, Option<&'m Name>), AlignError> {
        let mut steps = Vec::with_capacity(at.block.instrs.len() + 1);
        for inst in &at.block.instrs {
            let op = self.event_for_inst(at, inst)?;
            self.inst_count += 1;
            steps.push((Step::Inst(inst), op));
        }
        let (op, next) = self.event_for_term(at)?;
        self.inst_count += 1;
        steps.push((Step::Term(&at.block.term), op));
        Ok((steps, next))
    }

    fn event_for_inst(
        &mut self,
        at: At<'m>,
        inst: &'m Instruction,
    ) -> Result<Option<MemlogOp<'m>>, AlignError> {
        match inst {
            Instruction::Load(_) => match self.pop(at, inst)? {
                TraceEntry::Addr { op: AddrOp::Load, addr } => {
                    Ok(Some(MemlogOp::Addr(AddrOp::Load, addr)))
                },
                record => Err(at.mismatch(inst, record)),
            },
            Instruction::Store(s) if s.volatile => Ok(None),
            Instruction::Store(_) => match self.pop(at, inst)? {
                TraceEntry::Addr { op: AddrOp::Store, addr } => {
                    Ok(Some(MemlogOp::Addr(AddrOp::Store, addr)))
                },
                record => Err(at.mismatch(inst, record)),
            },
            Instruction::Select(_) => match self.pop(at, inst)? {
                TraceEntry::Select { value } => Ok(Some(MemlogOp::Select(value))),
                TraceEntry::Addr { op: AddrOp::SelectAddr, addr } => {
                    Ok(Some(MemlogOp::Addr(AddrOp::SelectAddr, addr)))
                },
                record => Err(at.mismatch(inst, record)),
            },
            Instruction::Call(call) => self.event_for_call(at, inst, call),
            _ => Ok(None),
        }
    }

    fn event_for_call(
        &mut self,
        at: At<'m>,
        inst: &'m Instruction,
        call: &'m Call,
    ) -> Result<Option<MemlogOp<'m>>, AlignError> {
        let name = match callee_name(call) {
            Some(name) => name,
            None => return Ok(None),
        };
        if name.starts_with("llvm.memset") {
            return match self.pop(at, inst)? {
                TraceEntry::Addr { op: AddrOp::Store, addr } => Ok(Some(MemlogOp::Memset(addr))),
                record => Err(at.mismatch(inst, record)),
            };
        }
        if name.starts_with("llvm.memcpy") {
            let src = match self.pop(at, inst)? {
                TraceEntry::Addr { op: AddrOp::Load, addr } => addr,
                record => return Err(at.mismatch(inst, record)),
            };
            let dst = match self.pop(at, inst)? {
                TraceEntry::Addr { op: AddrOp::Store, addr } => addr,
                record => return Err(at.mismatch(inst, record)),
            };
            return Ok(Some(MemlogOp::Memcpy { src, dst }));
        }
        match self.module.get_func_by_name(name) {
            Some(callee) => {
                let sub = self.function(callee)?;
                Ok(Some(MemlogOp::HelperFunc(sub)))
            },
            None => Ok(None),
        }
    }

    #[allow(clippy::type_complexity)]
    fn event_for_term(
        &mut self,
        at: At<'m>,
    ) -> Result<(Option<MemlogOp<'m>>, Option<&'m Name>), AlignError> {
        let term = &at.block.term;
        match term {
            Terminator::Ret(_) => Ok((None, None)),
            Terminator::Br(br) => {
                // unconditional branches are tagged in the stream too; older
                // traces record them as BranchAddr address entries
                let op = match self.pop(at, term)? {
                    TraceEntry::Branch { taken } => MemlogOp::Branch(taken),
                    TraceEntry::Addr { op: AddrOp::BranchAddr, addr } => {
                        MemlogOp::Addr(AddrOp::BranchAddr, addr)
                    },
                    record => return Err(at.mismatch(term, record)),
                };
                Ok((Some(op), Some(&br.dest)))
            },
            Terminator::CondBr(cbr) => match self.pop(at, term)? {
                TraceEntry::Branch { taken } => {
                    let next = if taken == 0 { &cbr.true_dest } else { &cbr.false_dest };
                    Ok((Some(MemlogOp::Branch(taken)), Some(next)))
                },
                record => Err(at.mismatch(term, record)),
            },
            // no trace record carries switch targets; fall through to the
            // default destination
            Terminator::Switch(sw) => Ok((None, Some(&sw.default_dest))),
            Terminator::Unreachable(_) => Ok((None, None)),
            term => Err(AlignError::UnsupportedTerminator {
                func: at.func.name.clone(),
                block: at.block.name.to_string(),
                term: term.to_string(),
            }),
        }
    }
}

fn find_block<'m>(func: &'m Function, name: &Name) -> Result<&'m BasicBlock, AlignError> {
    func.basic_blocks
        .iter()
        .find(|b| &b.name == name)
        .ok_or_else(|| AlignError::MissingBlock {
            func: func.name.clone(),
            block: name.to_string(),
        })
}

/// The textual name of a call's target, if it is a direct call.
pub fn callee_name(call: &Call) -> Option<&str> {
    match &call.function {
        Either::Right(Operand::ConstantOperand(cref)) => match cref.as_ref() {
            Constant::GlobalReference { name: Name::Name(name), .. } => Some(name.as_str()),
            _ => None,
        },
        _ => None,
    }
}
