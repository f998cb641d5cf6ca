//! The expression algebra built by the evaluator.
//!
//! Expressions are immutable value trees with structural equality. A fixed
//! canonicalization ruleset is applied bottom-up by [`simplify`]; nothing
//! here ever evaluates arithmetic concretely.

use crate::addr::AddrEntry;
use llvm_ir::predicates::IntPredicate;
use llvm_ir::{Name, Type};
use std::fmt;

/// The (deliberately lossy) type annotation carried by expression nodes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ExprT {
    Void,
    Ptr,
    Int8,
    Int32,
    Int64,
    Float,
    Double,
}

impl ExprT {
    /// Bit width for the integer types; `None` otherwise.
    pub fn bits(&self) -> Option<u32> {
        match self {
            ExprT::Int8 => Some(8),
            ExprT::Int32 => Some(32),
            ExprT::Int64 => Some(64),
            _ => None,
        }
    }
}

impl fmt::Display for ExprT {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExprT::Void => write!(f, "VoidT"),
            ExprT::Ptr => write!(f, "PtrT"),
            ExprT::Int8 => write!(f, "Int8T"),
            ExprT::Int32 => write!(f, "Int32T"),
            ExprT::Int64 => write!(f, "Int64T"),
            ExprT::Float => write!(f, "FloatT"),
            ExprT::Double => write!(f, "DoubleT"),
        }
    }
}

/// Translate an IR type into an [`ExprT`].
///
/// i64 renders as `Int32T`: downstream message formats were built around this
/// mapping, so it is preserved as-is.
pub fn expr_type(ty: &Type) -> ExprT {
    match ty {
        Type::IntegerType { bits: 8 } => ExprT::Int8,
        Type::IntegerType { bits: 32 } => ExprT::Int32,
        Type::IntegerType { bits: 64 } => ExprT::Int32,
        Type::IntegerType { .. } => ExprT::Int64,
        Type::PointerType { .. } => ExprT::Ptr,
        Type::FPType(fp) => match fp {
            llvm_ir::types::FPType::Single => ExprT::Float,
            llvm_ir::types::FPType::Double => ExprT::Double,
            _ => ExprT::Void,
        },
        _ => ExprT::Void,
    }
}

/// An abstract storage location: an SSA value inside a function, or a guest
/// memory cell. These key the evaluator's abstract store.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Loc {
    /// An SSA identifier within the named function
    Id(String, Name),
    /// A guest memory cell
    Mem(AddrEntry),
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Loc::Id(_, name) => write!(f, "{}", name),
            Loc::Mem(addr) => write!(f, "[{}]", addr),
        }
    }
}

/// Binary operators. Signedness and float/integer distinctions are collapsed
/// onto one constructor per arithmetic shape.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Lshr,
    Ashr,
    And,
    Or,
    Xor,
}

impl BinOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Lshr => ">>",
            BinOp::Ashr => "a>>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
        }
    }
}

/// Unary cast operators.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum CastOp {
    Trunc,
    ZExt,
    SExt,
    FPTrunc,
    FPExt,
    FPToSI,
    FPToUI,
    SIToFP,
    UIToFP,
    PtrToInt,
    IntToPtr,
    Bitcast,
}

impl CastOp {
    fn name(&self) -> &'static str {
        match self {
            CastOp::Trunc => "trunc",
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::FPTrunc => "fptrunc",
            CastOp::FPExt => "fpext",
            CastOp::FPToSI => "fptosi",
            CastOp::FPToUI => "fptoui",
            CastOp::SIToFP => "sitofp",
            CastOp::UIToFP => "uitofp",
            CastOp::PtrToInt => "ptrtoint",
            CastOp::IntToPtr => "inttoptr",
            CastOp::Bitcast => "bitcast",
        }
    }
}

/// A symbolic expression.
#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    Bin(BinOp, ExprT, Box<Expr>, Box<Expr>),
    Cast(CastOp, ExprT, Box<Expr>),
    Struct(ExprT, Vec<Expr>),
    Extract(ExprT, u32, Box<Expr>),
    ICmp(IntPredicate, Box<Expr>, Box<Expr>),
    Intrinsic(ExprT, String, Vec<Expr>),
    /// A value read from a guest address, with an optional stable symbolic
    /// name when the cell had no tracked contents
    Load(ExprT, AddrEntry, Option<String>),
    ILit(u64),
    FLit(f64),
    /// A free variable standing for an as-yet-unknown location
    Input(ExprT, Loc),
    /// Opaque pointer computation
    Gep,
    /// Neutral placeholder used when populating fresh aggregates
    Undefined,
    /// Propagating "don't care"; absorbs every arithmetic and cast
    Irrelevant,
}

const MAX_SIMPLIFY_PASSES: usize = 5;

/// Canonicalize `e` by running the rewrite pass to a fixed point, giving up
/// after [`MAX_SIMPLIFY_PASSES`] rounds.
pub fn simplify(e: &Expr) -> Expr {
    let mut cur = e.clone();
    for _ in 0..MAX_SIMPLIFY_PASSES {
        let next = simplify_once(&cur);
        if next == cur {
            break;
        }
        cur = next;
    }
    cur
}

/// Whether `n` is representable in `t` without truncation.
fn fits(n: u64, t: ExprT) -> bool {
    match t.bits() {
        Some(bits) if bits < 64 => n < (1u64 << bits),
        Some(_) => true,
        None => false,
    }
}

/// One bottom-up rewrite pass. No rule increases tree size.
fn simplify_once(e: &Expr) -> Expr {
    match e {
        Expr::Bin(op, t, a, b) => {
            let a = simplify_once(a);
            let b = simplify_once(b);
            match op {
                BinOp::Add if a == Expr::ILit(0) => b,
                BinOp::Add if b == Expr::ILit(0) => a,
                BinOp::Ashr if a == Expr::ILit(0) => Expr::ILit(0),
                _ => Expr::Bin(*op, *t, Box::new(a), Box::new(b)),
            }
        },
        Expr::Cast(op, t, inner) => {
            let inner = simplify_once(inner);
            match (op, &inner) {
                (CastOp::Trunc, Expr::Cast(CastOp::ZExt, _, e)) => (**e).clone(),
                (CastOp::Trunc, Expr::Cast(CastOp::SExt, _, e)) => (**e).clone(),
                (CastOp::Trunc, Expr::ILit(n)) if fits(*n, *t) => Expr::ILit(*n),
                (CastOp::ZExt, Expr::ILit(n)) => Expr::ILit(*n),
                (CastOp::SExt, Expr::ILit(n)) => Expr::ILit(*n),
                (CastOp::PtrToInt, Expr::Cast(CastOp::IntToPtr, _, e)) => (**e).clone(),
                (CastOp::IntToPtr, Expr::Cast(CastOp::PtrToInt, ExprT::Int64, e)) => {
                    (**e).clone()
                },
                _ => Expr::Cast(*op, *t, Box::new(inner)),
            }
        },
        Expr::Struct(t, fields) => {
            Expr::Struct(*t, fields.iter().map(simplify_once).collect())
        },
        Expr::Extract(t, idx, agg) => Expr::Extract(*t, *idx, Box::new(simplify_once(agg))),
        Expr::ICmp(pred, a, b) => {
            Expr::ICmp(*pred, Box::new(simplify_once(a)), Box::new(simplify_once(b)))
        },
        Expr::Intrinsic(t, name, args) => {
            Expr::Intrinsic(*t, name.clone(), args.iter().map(simplify_once).collect())
        },
        leaf => leaf.clone(),
    }
}

fn predicate_symbol(pred: &IntPredicate) -> &'static str {
    match pred {
        IntPredicate::EQ => "==",
        IntPredicate::NE => "!=",
        IntPredicate::UGT => "u>",
        IntPredicate::UGE => "u>=",
        IntPredicate::ULT => "u<",
        IntPredicate::ULE => "u<=",
        IntPredicate::SGT => "s>",
        IntPredicate::SGE => "s>=",
        IntPredicate::SLT => "s<",
        IntPredicate::SLE => "s<=",
    }
}

impl Expr {
    /// Render with subtrees deeper than `max_depth` elided as `...`.
    /// `None` renders the whole tree (same as `Display`).
    pub fn render(&self, max_depth: Option<usize>) -> String {
        Depth(self, max_depth.unwrap_or(usize::MAX)).to_string()
    }

    fn is_leaf(&self) -> bool {
        matches!(
            self,
            Expr::Load(..)
                | Expr::ILit(_)
                | Expr::FLit(_)
                | Expr::Input(..)
                | Expr::Gep
                | Expr::Undefined
                | Expr::Irrelevant
        )
    }

    fn fmt_depth(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
        if depth == 0 && !self.is_leaf() {
            return write!(f, "...");
        }
        let next = depth.saturating_sub(1);
        match self {
            Expr::Bin(op, _, a, b) => {
                write!(f, "(")?;
                a.fmt_depth(f, next)?;
                write!(f, " {} ", op.symbol())?;
                b.fmt_depth(f, next)?;
                write!(f, ")")
            },
            Expr::Cast(op, _, inner) => {
                write!(f, "{}(", op.name())?;
                inner.fmt_depth(f, next)?;
                write!(f, ")")
            },
            Expr::Struct(_, fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    field.fmt_depth(f, next)?;
                }
                write!(f, "}}")
            },
            Expr::Extract(_, idx, agg) => {
                agg.fmt_depth(f, next)?;
                write!(f, ".{}", idx)
            },
            Expr::ICmp(pred, a, b) => {
                write!(f, "(")?;
                a.fmt_depth(f, next)?;
                write!(f, " {} ", predicate_symbol(pred))?;
                b.fmt_depth(f, next)?;
                write!(f, ")")
            },
            Expr::Intrinsic(_, name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    arg.fmt_depth(f, next)?;
                }
                write!(f, ")")
            },
            Expr::Load(_, _, Some(name)) => write!(f, "{}", name),
            Expr::Load(_, addr, None) => write!(f, "load({})", addr),
            Expr::ILit(n) => {
                if *n >= 0x1000 {
                    write!(f, "{:#x}", n)
                } else {
                    write!(f, "{}", n)
                }
            },
            Expr::FLit(x) => write!(f, "{}", x),
            Expr::Input(_, loc) => write!(f, "{}", loc),
            Expr::Gep => write!(f, "gep"),
            Expr::Undefined => write!(f, "undef"),
            Expr::Irrelevant => write!(f, "irrelevant"),
        }
    }
}

struct Depth<'e>(&'e Expr, usize);

impl fmt::Display for Depth<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt_depth(f, self.1)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_depth(f, usize::MAX)
    }
}
