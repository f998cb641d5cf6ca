//! Simplifier, build-combinator, and rendering behavior.

use llvm_ir::Name;
use symtrace::{
    simplify, AddrEntry, AddrFlag, AddrKind, BinOp, Build, CastOp, Expr, ExprT, Loc,
};

fn input(name: &str) -> Expr {
    Expr::Input(ExprT::Int32, Loc::Id("f".into(), Name::from(name)))
}

fn add(a: Expr, b: Expr) -> Expr {
    Expr::Bin(BinOp::Add, ExprT::Int32, Box::new(a), Box::new(b))
}

fn cast(op: CastOp, t: ExprT, inner: Expr) -> Expr {
    Expr::Cast(op, t, Box::new(inner))
}

#[test]
fn add_zero_disappears_on_either_side() {
    let x = input("x");
    assert_eq!(simplify(&add(x.clone(), Expr::ILit(0))), x);
    assert_eq!(simplify(&add(Expr::ILit(0), x.clone())), x);
}

#[test]
fn add_nonzero_is_kept() {
    let e = add(input("x"), Expr::ILit(1));
    assert_eq!(simplify(&e), e);
}

#[test]
fn ashr_of_zero_is_zero() {
    let e = Expr::Bin(
        BinOp::Ashr,
        ExprT::Int32,
        Box::new(Expr::ILit(0)),
        Box::new(input("n")),
    );
    assert_eq!(simplify(&e), Expr::ILit(0));
}

#[test]
fn trunc_of_extension_collapses() {
    let x = input("x");
    let e = cast(CastOp::Trunc, ExprT::Int8, cast(CastOp::ZExt, ExprT::Int32, x.clone()));
    assert_eq!(simplify(&e), x);
    let e = cast(CastOp::Trunc, ExprT::Int8, cast(CastOp::SExt, ExprT::Int32, x.clone()));
    assert_eq!(simplify(&e), x);
}

#[test]
fn trunc_of_small_literal_becomes_literal() {
    let e = cast(CastOp::Trunc, ExprT::Int8, Expr::ILit(200));
    assert_eq!(simplify(&e), Expr::ILit(200));
}

#[test]
fn trunc_of_large_literal_is_preserved() {
    // 300 does not fit in 8 bits; the cast must survive, not truncate
    let e = cast(CastOp::Trunc, ExprT::Int8, Expr::ILit(300));
    assert_eq!(simplify(&e), e);
}

#[test]
fn extensions_of_literals_become_literals() {
    assert_eq!(
        simplify(&cast(CastOp::ZExt, ExprT::Int64, Expr::ILit(42))),
        Expr::ILit(42)
    );
    assert_eq!(
        simplify(&cast(CastOp::SExt, ExprT::Int64, Expr::ILit(42))),
        Expr::ILit(42)
    );
}

#[test]
fn ptr_int_round_trips_collapse() {
    let x = input("p");
    let e = cast(
        CastOp::PtrToInt,
        ExprT::Int32,
        cast(CastOp::IntToPtr, ExprT::Ptr, x.clone()),
    );
    assert_eq!(simplify(&e), x);

    // the inverse round trip only collapses through a 64-bit integer
    let e = cast(
        CastOp::IntToPtr,
        ExprT::Ptr,
        cast(CastOp::PtrToInt, ExprT::Int64, x.clone()),
    );
    assert_eq!(simplify(&e), x);
    let kept = cast(
        CastOp::IntToPtr,
        ExprT::Ptr,
        cast(CastOp::PtrToInt, ExprT::Int32, x.clone()),
    );
    assert_eq!(simplify(&kept), kept);
}

#[test]
fn simplification_is_idempotent() {
    let e = add(
        cast(CastOp::Trunc, ExprT::Int8, cast(CastOp::ZExt, ExprT::Int32, input("x"))),
        Expr::ILit(0),
    );
    let once = simplify(&e);
    assert_eq!(simplify(&once), once);
    assert_eq!(once, input("x"));
}

#[test]
fn rules_fire_under_other_constructors() {
    let e = Expr::Intrinsic(
        ExprT::Int32,
        "llvm.bswap.i32".into(),
        vec![add(input("x"), Expr::ILit(0))],
    );
    assert_eq!(
        simplify(&e),
        Expr::Intrinsic(ExprT::Int32, "llvm.bswap.i32".into(), vec![input("x")])
    );
}

// ---------------------------------------------------------------------------
// the ordered-alternative combinator
// ---------------------------------------------------------------------------

#[test]
fn done_is_kept() {
    let r = Build::Done(1).or_else(|| Build::Done(2));
    assert_eq!(r, Build::Done(1));
}

#[test]
fn irrelevant_is_a_decision() {
    let r = Build::<i32>::Irrelevant.or_else(|| Build::Done(2));
    assert_eq!(r, Build::Irrelevant);
}

#[test]
fn failure_falls_through() {
    let r = Build::<i32>::fail("nope").or_else(|| Build::Done(2));
    assert_eq!(r, Build::Done(2));
    let r = Build::<i32>::fail("nope").or_else(|| Build::Irrelevant);
    assert_eq!(r, Build::Irrelevant);
}

#[test]
fn first_failure_survives() {
    let r = Build::<i32>::fail("first").or_else(|| Build::fail("second"));
    assert_eq!(r, Build::Fail("first".into()));
}

#[test]
fn alternative_is_lazy() {
    let r = Build::Done(1).or_else(|| panic!("must not be evaluated"));
    assert_eq!(r, Build::Done(1));
}

// ---------------------------------------------------------------------------
// rendering
// ---------------------------------------------------------------------------

#[test]
fn expressions_render_algebraically() {
    let e = add(input("a"), Expr::ILit(3));
    assert_eq!(e.to_string(), "(%a + 3)");
    let e = cast(CastOp::Trunc, ExprT::Int8, input("a"));
    assert_eq!(e.to_string(), "trunc(%a)");
}

#[test]
fn large_literals_render_as_hex() {
    assert_eq!(Expr::ILit(0xDEAD8).to_string(), "0xdead8");
    assert_eq!(Expr::ILit(42).to_string(), "42");
}

#[test]
fn deep_subtrees_can_be_elided() {
    let e = add(add(input("a"), input("b")), Expr::ILit(1));
    assert_eq!(e.render(Some(1)), "(... + 1)");
    assert_eq!(e.render(None), "((%a + %b) + 1)");
}

#[test]
fn ram_addresses_render_as_padded_hex() {
    let a = AddrEntry { kind: AddrKind::MAddr, val: 0x401000, off: 0, flag: AddrFlag::None };
    assert_eq!(a.to_string(), "0x00401000");
}

#[test]
fn registers_render_by_name() {
    let a = AddrEntry { kind: AddrKind::GReg, val: 3, off: 0, flag: AddrFlag::None };
    assert_eq!(a.to_string(), "rbx");
    let a = AddrEntry { kind: AddrKind::GReg, val: 20, off: 4, flag: AddrFlag::None };
    assert_eq!(a.to_string(), "greg[20]+4");
}
