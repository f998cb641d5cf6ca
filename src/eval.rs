//! The symbolic evaluator: interprets associated blocks over an abstract
//! machine state, producing expressions, messages, and warnings.
//!
//! Each (instruction, event) pair is dispatched through an ordered chain of
//! strategies: helper-call update, then expression update, then
//! effect ("other") update; if none applies, a warning is recorded. All
//! strategies share the three-outcome [`Build`] type, so irrelevance
//! propagates as a value instead of an error.

use crate::addr::{AddrEntry, AddrFlag};
use crate::associate::{callee_name, AssociatedBlock, MemlogList, MemlogOp, Step};
use crate::build::{try_build, Build};
use crate::config::AnalyzerConfig;
use crate::expr::{expr_type, simplify, BinOp, CastOp, Expr, ExprT, Loc};
use crate::memlog::AddrOp;
use llvm_ir::function::FunctionAttribute;
use llvm_ir::instruction as instr;
use llvm_ir::terminator as term;
use llvm_ir::{BasicBlock, Constant, Function, Instruction, Module, Operand, Terminator, Type};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fmt;

/// The current value expression at a location and the guest IP that wrote it.
#[derive(Clone, Debug, PartialEq)]
pub struct LocInfo {
    pub expr: Expr,
    pub origin: Option<u64>,
}

/// An interesting event recorded during evaluation, visible to queries.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Memory {
        op: AddrOp,
        addr: String,
        value: Expr,
        /// The (IntToPtr-stripped) expression of the address computation, if
        /// it could be built
        origin: Option<Expr>,
    },
    Branch { cond: Expr, taken: bool },
    UnconditionalBranch,
    Warning(String),
}

impl Message {
    /// Render with the given expression elision depth. `Display` renders
    /// without elision.
    pub fn render(&self, max_depth: Option<usize>) -> String {
        match self {
            Message::Memory { op, addr, value, origin } => {
                let tag = match op {
                    AddrOp::Store => "Store",
                    _ => "Load",
                };
                let mut out = format!("{}: {} = {}", tag, addr, value.render(max_depth));
                if let Some(origin) = origin {
                    out.push_str(&format!(" (addr {})", origin.render(max_depth)));
                }
                out
            },
            Message::Branch { cond, taken } => format!(
                "Branch: {} -> {}",
                cond.render(max_depth),
                if *taken { "taken" } else { "not taken" }
            ),
            Message::UnconditionalBranch => "Unconditional branch".to_string(),
            Message::Warning(text) => format!("Warning{}", text),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render(None))
    }
}

/// The evaluator's full state. Created empty, mutated monotonically during a
/// run, read by queries afterwards; no entry is ever deleted.
pub struct SymbolicState<'m> {
    module: &'m Module,
    /// The abstract store
    pub info: HashMap<Loc, LocInfo>,
    /// Last completed basic block, for phi resolution
    previous_block: Option<&'m BasicBlock>,
    /// Current function context
    function: Option<&'m Function>,
    /// Stable free-variable names for uninitialized loads; never rebound
    var_names: HashMap<(ExprT, AddrEntry), String>,
    /// Most recent guest IP, updated by the volatile IP-slot stores
    current_ip: Option<u64>,
    pub(crate) warnings: Vec<(Option<u64>, String)>,
    pub(crate) messages: Vec<(Option<u64>, Message)>,
    pub(crate) messages_by_ip: HashMap<u64, Vec<Message>>,
    /// Set after a no-return call; cleared at the next block
    skip_rest: bool,
    /// The current block's return expression, if a `ret` has produced one
    ret_val: Option<Expr>,
    funcs_processed: usize,
    funcs_total: usize,
    options: AnalyzerConfig,
}

impl<'m> SymbolicState<'m> {
    pub fn new(module: &'m Module, options: AnalyzerConfig) -> Self {
        Self {
            module,
            info: HashMap::new(),
            previous_block: None,
            function: None,
            var_names: HashMap::new(),
            current_ip: None,
            warnings: Vec::new(),
            messages: Vec::new(),
            messages_by_ip: HashMap::new(),
            skip_rest: false,
            ret_val: None,
            funcs_processed: 0,
            funcs_total: 0,
            options,
        }
    }

    pub fn current_ip(&self) -> Option<u64> {
        self.current_ip
    }

    /// The free-variable names assigned so far, keyed by (type, address).
    pub fn var_names(&self) -> &HashMap<(ExprT, AddrEntry), String> {
        &self.var_names
    }

    /// Run the top-level call list, reporting progress per function at ~1%
    /// granularity. Returns the last block's return expression.
    pub fn run(&mut self, list: &MemlogList<'m>) -> Option<Expr> {
        self.funcs_total = count_functions(list);
        let granularity = (self.funcs_total / 100).max(1);
        let mut last_func: Option<&str> = None;
        for ab in list {
            if last_func != Some(ab.func.name.as_str()) {
                last_func = Some(ab.func.name.as_str());
                self.funcs_processed += 1;
                if self.options.progress_updates && self.funcs_processed % granularity == 0 {
                    info!(
                        "processed {}/{} functions ({}%)",
                        self.funcs_processed,
                        self.funcs_total,
                        self.funcs_processed * 100 / self.funcs_total
                    );
                }
            }
            self.run_block(ab);
        }
        self.ret_val.clone()
    }

    /// Run a (sub-)memlog without touching the progress counters. Helper
    /// recursion comes through here.
    fn run_blocks(&mut self, list: &MemlogList<'m>) -> Option<Expr> {
        for ab in list {
            self.run_block(ab);
        }
        self.ret_val.clone()
    }

    fn run_block(&mut self, ab: &AssociatedBlock<'m>) {
        self.function = Some(ab.func);
        self.skip_rest = false;
        self.ret_val = None;
        for (step, op) in &ab.steps {
            if self.skip_rest {
                continue;
            }
            self.process_step(step, op.as_ref());
        }
        self.previous_block = Some(ab.block);
    }

    fn at_debug_ip(&self) -> bool {
        self.options.debug_ip.is_some() && self.options.debug_ip == self.current_ip
    }

    fn process_step(&mut self, step: &Step<'m>, op: Option<&MemlogOp<'m>>) {
        if self.at_debug_ip() {
            debug!("ip {:#x}: {} with {:?}", self.current_ip.unwrap(), step, op);
        }
        let outcome = self
            .helper_call_update(step, op)
            .or_else(|| self.expr_update(step, op))
            .or_else(|| self.other_update(step, op));
        if outcome.is_fail() {
            self.warn(format!("Couldn't process inst '{}' with op {:?}", step, op));
        }
    }

    /// Record a warning and mirror it into the message stream.
    fn warn(&mut self, text: String) {
        warn!("{}", text);
        let ip = self.current_ip;
        self.warnings.push((ip, text.clone()));
        let rendered = match ip {
            Some(ip) => format!(" - ({:#x}) {}", ip, text),
            None => format!(" - (unknown) {}", text),
        };
        self.emit(Message::Warning(rendered));
    }

    fn emit(&mut self, msg: Message) {
        if self.at_debug_ip() {
            debug!("ip {:#x}: emitted {}", self.current_ip.unwrap(), msg);
        }
        if let Some(ip) = self.current_ip {
            self.messages_by_ip.entry(ip).or_default().push(msg.clone());
        }
        self.messages.push((self.current_ip, msg));
    }

    fn bind(&mut self, loc: Loc, expr: Expr) {
        self.info.insert(loc, LocInfo { expr, origin: self.current_ip });
    }

    fn cur_func_name(&self) -> String {
        self.function
            .expect("evaluating an instruction with no current function")
            .name
            .clone()
    }

    fn type_of_inst(&self, inst: &Instruction) -> ExprT {
        expr_type(&self.module.types.type_of(inst))
    }

    // ---------------------------------------------------------------------
    // helper-call update
    // ---------------------------------------------------------------------

    /// A call to an IR-defined helper, paired with its bracketed sub-memlog:
    /// bind the arguments into the callee, run the sub-memlog recursively,
    /// and bind the return value at the call site. `previous_block` is
    /// deliberately not restored; the first block after a helper return is
    /// never a phi target of the caller.
    fn helper_call_update(&mut self, step: &Step<'m>, op: Option<&MemlogOp<'m>>) -> Build<()> {
        let call = match step {
            Step::Inst(Instruction::Call(call)) => call,
            _ => return Build::fail("not a call"),
        };
        let sub = match op {
            Some(MemlogOp::HelperFunc(sub)) => sub,
            _ => return Build::fail("no helper sub-memlog"),
        };
        let name = match callee_name(call) {
            Some(name) => name,
            None => return Build::fail("indirect call"),
        };
        let callee = match self.module.get_func_by_name(name) {
            Some(callee) => callee,
            None => return Build::fail("callee not defined in module"),
        };
        let caller = self.function.expect("helper call with no current function");
        for (param, (arg, _)) in callee.parameters.iter().zip(call.arguments.iter()) {
            let loc = Loc::Id(callee.name.clone(), param.name.clone());
            match self.build_operand(arg) {
                Build::Done(e) => self.bind(loc, simplify(&e)),
                Build::Irrelevant => self.bind(loc, Expr::Irrelevant),
                Build::Fail(_) => {},
            }
        }
        let ret = self.run_blocks(sub);
        if let (Some(dest), Some(ret)) = (&call.dest, ret) {
            self.bind(Loc::Id(caller.name.clone(), dest.clone()), ret);
        }
        self.function = Some(caller);
        Build::Done(())
    }

    // ---------------------------------------------------------------------
    // expression update
    // ---------------------------------------------------------------------

    /// SSA-producing instructions: build the result expression and insert it
    /// at the instruction's identifier. A failed build leaves the store
    /// untouched.
    fn expr_update(&mut self, step: &Step<'m>, op: Option<&MemlogOp<'m>>) -> Build<()> {
        let inst = match step {
            Step::Inst(inst) => inst,
            Step::Term(_) => return Build::fail("terminator"),
        };
        let built = self.build_inst(inst, op);
        let dest = inst.try_get_result().cloned();
        match built {
            Build::Done(e) => {
                if let Some(dest) = dest {
                    let func = self.cur_func_name();
                    self.bind(Loc::Id(func, dest), simplify(&e));
                }
                Build::Done(())
            },
            Build::Irrelevant => {
                if let Some(dest) = dest {
                    let func = self.cur_func_name();
                    self.bind(Loc::Id(func, dest), Expr::Irrelevant);
                }
                Build::Irrelevant
            },
            Build::Fail(e) => Build::Fail(e),
        }
    }

    fn build_inst(&mut self, inst: &Instruction, op: Option<&MemlogOp<'m>>) -> Build<Expr> {
        match inst {
            Instruction::Add(i) => self.build_bin(BinOp::Add, inst, &i.operand0, &i.operand1),
            Instruction::FAdd(i) => self.build_bin(BinOp::Add, inst, &i.operand0, &i.operand1),
            Instruction::Sub(i) => self.build_bin(BinOp::Sub, inst, &i.operand0, &i.operand1),
            Instruction::FSub(i) => self.build_bin(BinOp::Sub, inst, &i.operand0, &i.operand1),
            Instruction::Mul(i) => self.build_bin(BinOp::Mul, inst, &i.operand0, &i.operand1),
            Instruction::FMul(i) => self.build_bin(BinOp::Mul, inst, &i.operand0, &i.operand1),
            Instruction::UDiv(i) => self.build_bin(BinOp::Div, inst, &i.operand0, &i.operand1),
            Instruction::SDiv(i) => self.build_bin(BinOp::Div, inst, &i.operand0, &i.operand1),
            Instruction::FDiv(i) => self.build_bin(BinOp::Div, inst, &i.operand0, &i.operand1),
            Instruction::URem(i) => self.build_bin(BinOp::Rem, inst, &i.operand0, &i.operand1),
            Instruction::SRem(i) => self.build_bin(BinOp::Rem, inst, &i.operand0, &i.operand1),
            Instruction::FRem(i) => self.build_bin(BinOp::Rem, inst, &i.operand0, &i.operand1),
            Instruction::Shl(i) => self.build_bin(BinOp::Shl, inst, &i.operand0, &i.operand1),
            Instruction::LShr(i) => self.build_bin(BinOp::Lshr, inst, &i.operand0, &i.operand1),
            Instruction::AShr(i) => self.build_bin(BinOp::Ashr, inst, &i.operand0, &i.operand1),
            Instruction::And(i) => self.build_bin(BinOp::And, inst, &i.operand0, &i.operand1),
            Instruction::Or(i) => self.build_bin(BinOp::Or, inst, &i.operand0, &i.operand1),
            Instruction::Xor(i) => self.build_bin(BinOp::Xor, inst, &i.operand0, &i.operand1),
            Instruction::Trunc(i) => self.build_cast(CastOp::Trunc, &i.operand, &i.to_type),
            Instruction::ZExt(i) => self.build_cast(CastOp::ZExt, &i.operand, &i.to_type),
            Instruction::SExt(i) => self.build_cast(CastOp::SExt, &i.operand, &i.to_type),
            Instruction::FPTrunc(i) => self.build_cast(CastOp::FPTrunc, &i.operand, &i.to_type),
            Instruction::FPExt(i) => self.build_cast(CastOp::FPExt, &i.operand, &i.to_type),
            Instruction::FPToSI(i) => self.build_cast(CastOp::FPToSI, &i.operand, &i.to_type),
            Instruction::FPToUI(i) => self.build_cast(CastOp::FPToUI, &i.operand, &i.to_type),
            Instruction::SIToFP(i) => self.build_cast(CastOp::SIToFP, &i.operand, &i.to_type),
            Instruction::UIToFP(i) => self.build_cast(CastOp::UIToFP, &i.operand, &i.to_type),
            Instruction::PtrToInt(i) => self.build_cast(CastOp::PtrToInt, &i.operand, &i.to_type),
            Instruction::IntToPtr(i) => self.build_cast(CastOp::IntToPtr, &i.operand, &i.to_type),
            Instruction::BitCast(i) => self.build_cast(CastOp::Bitcast, &i.operand, &i.to_type),
            Instruction::Phi(phi) => self.build_phi(phi),
            Instruction::GetElementPtr(_) => Build::Done(Expr::Gep),
            Instruction::InsertValue(iv) => self.build_insert_value(iv, inst),
            Instruction::ExtractValue(ev) => self.build_extract_value(ev, inst),
            Instruction::ICmp(cmp) => self.build_icmp(cmp),
            Instruction::Select(sel) => self.build_select(sel, op),
            Instruction::Load(load) => self.build_load(load, inst, op),
            Instruction::Call(call) => self.build_intrinsic_call(call, inst),
            _ => Build::fail("not an expression-producing instruction"),
        }
    }

    fn build_bin(
        &mut self,
        op: BinOp,
        inst: &Instruction,
        a: &Operand,
        b: &Operand,
    ) -> Build<Expr> {
        let t = self.type_of_inst(inst);
        let a = try_build!(self.build_operand(a));
        let b = try_build!(self.build_operand(b));
        Build::Done(Expr::Bin(op, t, Box::new(a), Box::new(b)))
    }

    fn build_cast(&mut self, op: CastOp, operand: &Operand, to_type: &Type) -> Build<Expr> {
        let t = expr_type(to_type);
        let inner = try_build!(self.build_operand(operand));
        Build::Done(Expr::Cast(op, t, Box::new(inner)))
    }

    fn build_phi(&mut self, phi: &instr::Phi) -> Build<Expr> {
        let prev = self.previous_block.expect("phi instruction with no previous block");
        match phi.incoming_values.iter().find(|(_, name)| *name == prev.name) {
            Some((operand, _)) => self.build_operand(operand),
            None => Build::fail(format!("no phi incoming value for block {}", prev.name)),
        }
    }

    fn build_insert_value(&mut self, iv: &instr::InsertValue, inst: &Instruction) -> Build<Expr> {
        if iv.indices.len() != 1 {
            return Build::fail("multi-index insertvalue");
        }
        let idx = iv.indices[0] as usize;
        let agg = try_build!(self.build_operand(&iv.aggregate));
        let element = try_build!(self.build_operand(&iv.element));
        match agg {
            Expr::Undefined => {
                let ty = self.module.types.type_of(inst);
                let num_fields = match ty.as_ref() {
                    Type::StructType { element_types, .. } => element_types.len(),
                    _ => return Build::fail("insertvalue into an undef non-struct"),
                };
                if idx >= num_fields {
                    return Build::fail("insertvalue index out of range");
                }
                let mut fields = vec![Expr::Undefined; num_fields];
                fields[idx] = element;
                Build::Done(Expr::Struct(expr_type(&ty), fields))
            },
            Expr::Struct(t, mut fields) => {
                if idx >= fields.len() {
                    return Build::fail("insertvalue index out of range");
                }
                fields[idx] = element;
                Build::Done(Expr::Struct(t, fields))
            },
            _ => Build::fail("insertvalue into a non-struct aggregate"),
        }
    }

    fn build_extract_value(
        &mut self,
        ev: &instr::ExtractValue,
        inst: &Instruction,
    ) -> Build<Expr> {
        if ev.indices.len() != 1 {
            return Build::fail("multi-index extractvalue");
        }
        let t = self.type_of_inst(inst);
        let agg = try_build!(self.build_operand(&ev.aggregate));
        Build::Done(Expr::Extract(t, ev.indices[0], Box::new(agg)))
    }

    fn build_icmp(&mut self, cmp: &instr::ICmp) -> Build<Expr> {
        let a = try_build!(self.build_operand(&cmp.operand0));
        let b = try_build!(self.build_operand(&cmp.operand1));
        Build::Done(Expr::ICmp(cmp.predicate, Box::new(a), Box::new(b)))
    }

    fn build_select(&mut self, sel: &instr::Select, op: Option<&MemlogOp<'m>>) -> Build<Expr> {
        let chosen = match op {
            Some(MemlogOp::Select(i)) => {
                if *i == 0 {
                    &sel.true_value
                } else {
                    &sel.false_value
                }
            },
            _ => return Build::fail("select without a select record"),
        };
        self.build_operand(chosen)
    }

    fn build_load(
        &mut self,
        load: &instr::Load,
        inst: &Instruction,
        op: Option<&MemlogOp<'m>>,
    ) -> Build<Expr> {
        let addr = match op {
            Some(MemlogOp::Addr(AddrOp::Load, addr)) => *addr,
            _ => return Build::fail("load without a load record"),
        };
        if addr.flag == AddrFlag::Irrelevant {
            return Build::Irrelevant;
        }
        let t = self.type_of_inst(inst);
        let expr = match self.info.get(&Loc::Mem(addr)) {
            Some(li) if li.expr == Expr::Irrelevant => return Build::Irrelevant,
            Some(li) => li.expr.clone(),
            None => {
                let name = self.fresh_name(t, &addr);
                Expr::Load(t, addr, name)
            },
        };
        if addr.is_interesting() {
            let origin = self.address_origin(&load.address);
            self.emit(Message::Memory {
                op: AddrOp::Load,
                addr: addr.to_string(),
                value: expr.clone(),
                origin,
            });
        }
        Build::Done(expr)
    }

    /// Stable textual name for an uninitialized load of a RAM cell; `None`
    /// for every other address kind. Once assigned, a name is never rebound.
    fn fresh_name(&mut self, t: ExprT, addr: &AddrEntry) -> Option<String> {
        if !addr.is_ram() {
            return None;
        }
        if let Some(name) = self.var_names.get(&(t, *addr)) {
            return Some(name.clone());
        }
        let name = format!("{}_{:04x}_{}", t, addr.val & 0xffff, self.var_names.len());
        self.var_names.insert((t, *addr), name.clone());
        Some(name)
    }

    /// The expression of a load/store address operand with an outer
    /// `inttoptr` stripped, for reporting where an access was aimed.
    fn address_origin(&mut self, address: &Operand) -> Option<Expr> {
        match self.build_operand(address) {
            Build::Done(Expr::Cast(CastOp::IntToPtr, _, inner)) => Some(simplify(&inner)),
            Build::Done(e) => Some(simplify(&e)),
            _ => None,
        }
    }

    fn build_intrinsic_call(&mut self, call: &instr::Call, inst: &Instruction) -> Build<Expr> {
        let name = match callee_name(call) {
            Some(name) => name,
            None => return Build::fail("indirect call"),
        };
        if !name.starts_with("llvm.") {
            return Build::fail("not an intrinsic call");
        }
        if call.dest.is_none() {
            return Build::fail("intrinsic call with no result");
        }
        let t = self.type_of_inst(inst);
        let mut args = Vec::with_capacity(call.arguments.len());
        for (arg, _) in &call.arguments {
            args.push(try_build!(self.build_operand(arg)));
        }
        Build::Done(Expr::Intrinsic(t, name.to_string(), args))
    }

    fn build_operand(&mut self, operand: &Operand) -> Build<Expr> {
        match operand {
            Operand::LocalOperand { name, ty } => {
                let func = self.cur_func_name();
                let loc = Loc::Id(func, name.clone());
                match self.info.get(&loc) {
                    Some(li) if li.expr == Expr::Irrelevant => Build::Irrelevant,
                    Some(li) => Build::Done(li.expr.clone()),
                    None => Build::Done(Expr::Input(expr_type(ty), loc)),
                }
            },
            Operand::ConstantOperand(cref) => self.build_constant(cref.as_ref()),
            Operand::MetadataOperand => Build::fail("metadata operand"),
        }
    }

    fn build_constant(&mut self, constant: &Constant) -> Build<Expr> {
        match constant {
            Constant::Int { value, .. } => Build::Done(Expr::ILit(*value)),
            Constant::Float(f) => match f {
                llvm_ir::constant::Float::Single(x) => Build::Done(Expr::FLit(f64::from(*x))),
                llvm_ir::constant::Float::Double(x) => Build::Done(Expr::FLit(*x)),
                _ => Build::fail("unsupported float width"),
            },
            Constant::Null(_) | Constant::AggregateZero(_) => Build::Done(Expr::ILit(0)),
            Constant::Undef(_) | Constant::Poison(_) => Build::Done(Expr::Undefined),
            Constant::IntToPtr(c) => {
                let inner = try_build!(self.build_constant(c.operand.as_ref()));
                Build::Done(Expr::Cast(CastOp::IntToPtr, ExprT::Ptr, Box::new(inner)))
            },
            Constant::PtrToInt(c) => {
                let inner = try_build!(self.build_constant(c.operand.as_ref()));
                let t = expr_type(&c.to_type);
                Build::Done(Expr::Cast(CastOp::PtrToInt, t, Box::new(inner)))
            },
            Constant::BitCast(c) => {
                let inner = try_build!(self.build_constant(c.operand.as_ref()));
                let t = expr_type(&c.to_type);
                Build::Done(Expr::Cast(CastOp::Bitcast, t, Box::new(inner)))
            },
            Constant::GetElementPtr(_) => Build::Done(Expr::Gep),
            _ => Build::fail("unsupported constant"),
        }
    }

    // ---------------------------------------------------------------------
    // other (effect) update
    // ---------------------------------------------------------------------

    /// Instructions with effects on the state but no SSA result.
    fn other_update(&mut self, step: &Step<'m>, op: Option<&MemlogOp<'m>>) -> Build<()> {
        match step {
            Step::Inst(inst) => match inst {
                Instruction::Alloca(_) => Build::Done(()),
                Instruction::Store(s) if s.volatile => self.volatile_store(s),
                Instruction::Store(s) => self.store(s, op),
                Instruction::Call(call) => self.call_effect(call, op),
                _ => Build::fail("no effect handler"),
            },
            Step::Term(term) => match term {
                Terminator::Ret(ret) => self.ret(ret),
                Terminator::Br(_) => {
                    self.emit(Message::UnconditionalBranch);
                    Build::Done(())
                },
                Terminator::CondBr(cbr) => self.cond_branch(cbr, op),
                Terminator::Switch(_) => Build::Done(()),
                Terminator::Unreachable(_) => {
                    self.warn("UNREACHABLE INSTRUCTION!".to_string());
                    Build::Done(())
                },
                _ => Build::fail("unsupported terminator"),
            },
        }
    }

    fn store(&mut self, store: &instr::Store, op: Option<&MemlogOp<'m>>) -> Build<()> {
        let addr = match op {
            Some(MemlogOp::Addr(AddrOp::Store, addr)) => *addr,
            _ => return Build::fail("store without a store record"),
        };
        match self.build_operand(&store.value) {
            Build::Done(e) => {
                let e = simplify(&e);
                if addr.is_interesting() {
                    let origin = self.address_origin(&store.address);
                    self.emit(Message::Memory {
                        op: AddrOp::Store,
                        addr: addr.to_string(),
                        value: e.clone(),
                        origin,
                    });
                }
                self.bind(Loc::Mem(addr), e);
                Build::Done(())
            },
            Build::Irrelevant => {
                // still binds: a store of an irrelevant value clears the cell
                self.bind(Loc::Mem(addr), Expr::Irrelevant);
                Build::Irrelevant
            },
            Build::Fail(e) => Build::Fail(e),
        }
    }

    /// Volatile stores are the emulator's IP bookkeeping: two fire per guest
    /// instruction and the committed IP is whichever lands last.
    fn volatile_store(&mut self, store: &instr::Store) -> Build<()> {
        match operand_int(&store.value) {
            Some(ip) => {
                self.current_ip = Some(ip);
                Build::Done(())
            },
            None => {
                self.warn("volatile store of a non-constant value".to_string());
                Build::Done(())
            },
        }
    }

    fn ret(&mut self, ret: &term::Ret) -> Build<()> {
        match &ret.return_operand {
            None => Build::Done(()),
            Some(operand) => match self.build_operand(operand) {
                Build::Done(e) => {
                    self.ret_val = Some(simplify(&e));
                    Build::Done(())
                },
                Build::Irrelevant => {
                    self.ret_val = Some(Expr::Irrelevant);
                    Build::Done(())
                },
                Build::Fail(e) => Build::Fail(e),
            },
        }
    }

    fn cond_branch(&mut self, cbr: &term::CondBr, op: Option<&MemlogOp<'m>>) -> Build<()> {
        let taken = match op {
            Some(MemlogOp::Branch(i)) => *i == 0,
            _ => return Build::fail("conditional branch without a branch record"),
        };
        match self.build_operand(&cbr.condition) {
            Build::Done(e) => {
                self.emit(Message::Branch { cond: simplify(&e), taken });
                Build::Done(())
            },
            Build::Irrelevant => Build::Irrelevant,
            Build::Fail(e) => Build::Fail(e),
        }
    }

    fn call_effect(&mut self, call: &instr::Call, op: Option<&MemlogOp<'m>>) -> Build<()> {
        let name = match callee_name(call) {
            Some(name) => name,
            None => return Build::fail("indirect call"),
        };
        if name == "log_dynval" {
            return Build::Done(());
        }
        if name.starts_with("llvm.memset") {
            return self.memset(call, op);
        }
        if name.starts_with("llvm.memcpy") {
            return self.memcpy(call, op);
        }
        if name == "cpu_loop_exit" || self.is_noreturn(call, name) {
            self.skip_rest = true;
            return Build::Done(());
        }
        Build::fail("call with no effect handler")
    }

    fn is_noreturn(&self, call: &instr::Call, name: &str) -> bool {
        if call.function_attributes.contains(&FunctionAttribute::NoReturn) {
            return true;
        }
        match self.module.get_func_by_name(name) {
            Some(f) => f.function_attributes.contains(&FunctionAttribute::NoReturn),
            None => false,
        }
    }

    fn memset(&mut self, call: &instr::Call, op: Option<&MemlogOp<'m>>) -> Build<()> {
        let addr = match op {
            Some(MemlogOp::Memset(addr)) => *addr,
            _ => return Build::fail("memset without a store record"),
        };
        let target_is_struct =
            call.arguments.first().map_or(false, |(o, _)| self.points_to_struct(o));
        match call.arguments.get(2).and_then(|(o, _)| operand_int(o)) {
            None => self.warn("couldn't extract memset length".to_string()),
            Some(len) if len > 16 || target_is_struct => {
                self.warn(format!("unhandled memset (length {}, struct target: {})", len, target_is_struct))
            },
            Some(_) => {},
        }
        let value = match call.arguments.get(1) {
            Some((operand, _)) => operand,
            None => return Build::fail("memset with no value operand"),
        };
        match self.build_operand(value) {
            Build::Done(e) => {
                self.bind(Loc::Mem(addr), simplify(&e));
                Build::Done(())
            },
            Build::Irrelevant => {
                self.bind(Loc::Mem(addr), Expr::Irrelevant);
                Build::Irrelevant
            },
            Build::Fail(e) => Build::Fail(e),
        }
    }

    fn memcpy(&mut self, call: &instr::Call, op: Option<&MemlogOp<'m>>) -> Build<()> {
        let (src, dst) = match op {
            Some(MemlogOp::Memcpy { src, dst }) => (*src, *dst),
            _ => return Build::fail("memcpy without load/store records"),
        };
        let target_is_struct =
            call.arguments.first().map_or(false, |(o, _)| self.points_to_struct(o));
        match call.arguments.get(2).and_then(|(o, _)| operand_int(o)) {
            None => self.warn("couldn't extract memcpy length".to_string()),
            Some(len) if len > 16 && !target_is_struct => {
                self.warn(format!("unhandled memcpy of length {}", len))
            },
            Some(_) => {},
        }
        if let Some(li) = self.info.get(&Loc::Mem(src)).cloned() {
            self.bind(Loc::Mem(dst), li.expr);
        }
        Build::Done(())
    }

    fn points_to_struct(&self, operand: &Operand) -> bool {
        match self.module.types.type_of(operand).as_ref() {
            Type::PointerType { pointee_type, .. } => matches!(
                pointee_type.as_ref(),
                Type::StructType { .. } | Type::NamedStructType { .. }
            ),
            _ => false,
        }
    }
}

fn operand_int(operand: &Operand) -> Option<u64> {
    match operand {
        Operand::ConstantOperand(cref) => match cref.as_ref() {
            Constant::Int { value, .. } => Some(*value),
            _ => None,
        },
        _ => None,
    }
}

fn count_functions(list: &MemlogList) -> usize {
    let mut total = 0;
    let mut last: Option<&str> = None;
    for ab in list {
        if last != Some(ab.func.name.as_str()) {
            last = Some(ab.func.name.as_str());
            total += 1;
        }
    }
    total
}
