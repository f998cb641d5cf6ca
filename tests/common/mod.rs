//! Shared helpers for building in-memory IR modules and trace events.
#![allow(dead_code)]

use either::Either;
use llvm_ir::constant::Constant;
use llvm_ir::function::{CallingConvention, Parameter};
use llvm_ir::instruction::{
    Add, Call, ExtractValue, ICmp, InsertValue, Load, Phi, Select, Store, Trunc,
};
use llvm_ir::module::{DLLStorageClass, DataLayout, Linkage, Visibility};
use llvm_ir::predicates::IntPredicate;
use llvm_ir::terminator::{Br, CondBr, Ret, Unreachable};
use llvm_ir::types::{TypeRef, Types};
use llvm_ir::{
    BasicBlock, ConstantRef, Function, Instruction, Module, Name, Operand, Terminator,
};
use symtrace::{AddrEntry, AddrFlag, AddrKind, AddrOp, TraceEntry};

pub fn init_logging() {
    // capture log messages with test harness
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn module_with(functions: Vec<Function>, types: Types) -> Module {
    Module {
        name: "test".into(),
        source_file_name: String::new(),
        data_layout: DataLayout::default(),
        target_triple: None,
        functions,
        func_declarations: vec![],
        global_vars: vec![],
        global_aliases: vec![],
        global_ifuncs: vec![],
        inline_assembly: String::new(),
        types,
    }
}

pub fn function(
    name: &str,
    parameters: Vec<Parameter>,
    return_type: TypeRef,
    basic_blocks: Vec<BasicBlock>,
) -> Function {
    Function {
        name: name.into(),
        parameters,
        is_var_arg: false,
        return_type,
        basic_blocks,
        function_attributes: vec![],
        return_attributes: vec![],
        linkage: Linkage::External,
        visibility: Visibility::Default,
        dll_storage_class: DLLStorageClass::Default,
        calling_convention: CallingConvention::C,
        section: None,
        comdat: None,
        alignment: 0,
        garbage_collector_name: None,
        personality_function: None,
        debugloc: None,
    }
}

pub fn param(name: &str, ty: TypeRef) -> Parameter {
    Parameter { name: Name::from(name), ty, attributes: vec![] }
}

pub fn block(name: &str, instrs: Vec<Instruction>, term: Terminator) -> BasicBlock {
    BasicBlock { name: Name::from(name), instrs, term }
}

// ---------------------------------------------------------------------------
// operands
// ---------------------------------------------------------------------------

pub fn local(name: &str, ty: TypeRef) -> Operand {
    Operand::LocalOperand { name: Name::from(name), ty }
}

pub fn const_int(bits: u32, value: u64) -> Operand {
    Operand::ConstantOperand(ConstantRef::new(Constant::Int { bits, value }))
}

pub fn undef(ty: TypeRef) -> Operand {
    Operand::ConstantOperand(ConstantRef::new(Constant::Undef(ty)))
}

/// A reference to the global (or function) `name` of value type `ty`; the
/// operand's own type is a pointer to `ty`.
pub fn global(name: &str, ty: TypeRef) -> Operand {
    Operand::ConstantOperand(ConstantRef::new(Constant::GlobalReference {
        name: Name::from(name),
        ty,
    }))
}

// ---------------------------------------------------------------------------
// instructions
// ---------------------------------------------------------------------------

pub fn load(dest: &str, address: Operand) -> Instruction {
    Instruction::Load(Load {
        address,
        dest: Name::from(dest),
        volatile: false,
        atomicity: None,
        alignment: 0,
        debugloc: None,
    })
}

pub fn store(address: Operand, value: Operand, volatile: bool) -> Instruction {
    Instruction::Store(Store {
        address,
        value,
        volatile,
        atomicity: None,
        alignment: 0,
        debugloc: None,
    })
}

pub fn add(dest: &str, operand0: Operand, operand1: Operand) -> Instruction {
    Instruction::Add(Add { operand0, operand1, dest: Name::from(dest), debugloc: None })
}

pub fn trunc(dest: &str, operand: Operand, to_type: TypeRef) -> Instruction {
    Instruction::Trunc(Trunc { operand, to_type, dest: Name::from(dest), debugloc: None })
}

pub fn icmp(dest: &str, predicate: IntPredicate, operand0: Operand, operand1: Operand) -> Instruction {
    Instruction::ICmp(ICmp {
        predicate,
        operand0,
        operand1,
        dest: Name::from(dest),
        debugloc: None,
    })
}

pub fn phi(dest: &str, to_type: TypeRef, incoming: Vec<(Operand, &str)>) -> Instruction {
    Instruction::Phi(Phi {
        incoming_values: incoming.into_iter().map(|(op, bb)| (op, Name::from(bb))).collect(),
        dest: Name::from(dest),
        to_type,
        debugloc: None,
    })
}

pub fn select(dest: &str, condition: Operand, true_value: Operand, false_value: Operand) -> Instruction {
    Instruction::Select(Select {
        condition,
        true_value,
        false_value,
        dest: Name::from(dest),
        debugloc: None,
    })
}

pub fn insert_value(dest: &str, aggregate: Operand, element: Operand, index: u32) -> Instruction {
    Instruction::InsertValue(InsertValue {
        aggregate,
        element,
        indices: vec![index],
        dest: Name::from(dest),
        debugloc: None,
    })
}

pub fn extract_value(dest: &str, aggregate: Operand, index: u32) -> Instruction {
    Instruction::ExtractValue(ExtractValue {
        aggregate,
        indices: vec![index],
        dest: Name::from(dest),
        debugloc: None,
    })
}

pub fn call(dest: Option<&str>, callee: &str, types: &Types, arguments: Vec<Operand>) -> Instruction {
    let fn_ty = types.func_type(types.void(), vec![], false);
    Instruction::Call(Call {
        function: Either::Right(Operand::ConstantOperand(ConstantRef::new(
            Constant::GlobalReference { name: Name::from(callee), ty: fn_ty },
        ))),
        arguments: arguments.into_iter().map(|a| (a, vec![])).collect(),
        return_attributes: vec![],
        dest: dest.map(Name::from),
        function_attributes: vec![],
        is_tail_call: false,
        calling_convention: CallingConvention::C,
        debugloc: None,
    })
}

// ---------------------------------------------------------------------------
// terminators
// ---------------------------------------------------------------------------

pub fn ret(return_operand: Option<Operand>) -> Terminator {
    Terminator::Ret(Ret { return_operand, debugloc: None })
}

pub fn br(dest: &str) -> Terminator {
    Terminator::Br(Br { dest: Name::from(dest), debugloc: None })
}

pub fn condbr(condition: Operand, true_dest: &str, false_dest: &str) -> Terminator {
    Terminator::CondBr(CondBr {
        condition,
        true_dest: Name::from(true_dest),
        false_dest: Name::from(false_dest),
        debugloc: None,
    })
}

pub fn unreachable() -> Terminator {
    Terminator::Unreachable(Unreachable { debugloc: None })
}

// ---------------------------------------------------------------------------
// trace events
// ---------------------------------------------------------------------------

pub fn maddr(val: u64) -> AddrEntry {
    AddrEntry { kind: AddrKind::MAddr, val, off: 0, flag: AddrFlag::None }
}

pub fn greg(val: u64) -> AddrEntry {
    AddrEntry { kind: AddrKind::GReg, val, off: 0, flag: AddrFlag::None }
}

pub fn load_ev(addr: AddrEntry) -> TraceEntry {
    TraceEntry::Addr { op: AddrOp::Load, addr }
}

pub fn store_ev(addr: AddrEntry) -> TraceEntry {
    TraceEntry::Addr { op: AddrOp::Store, addr }
}

pub fn branch_ev(taken: u32) -> TraceEntry {
    TraceEntry::Branch { taken }
}

pub fn select_ev(value: u32) -> TraceEntry {
    TraceEntry::Select { value }
}
