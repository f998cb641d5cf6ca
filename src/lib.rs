//! `symtrace` replays a dynamic memory/branch trace recorded by a
//! whole-system emulator against the LLVM IR of the translated guest code,
//! building algebraic expressions that describe how each memory cell and
//! register came to hold its value.
//!
//! The pipeline has two stages. The [memlog associator](associate::associate)
//! aligns the flat trace stream with the IR's control flow, pairing each
//! instruction on the dynamic path with at most one trace event. The
//! [symbolic evaluator](eval::SymbolicState) then interprets the aligned
//! blocks over an abstract store, emitting per-IP messages and warnings that
//! can be queried afterwards.
//!
//! The IR itself is parsed by the `llvm-ir` crate; producing the trace and
//! serving queries over the network are the driver's business, not this
//! library's.

pub mod addr;
pub mod associate;
pub mod build;
pub mod config;
pub mod eval;
pub mod expr;
pub mod logging;
pub mod memlog;
pub mod query;

pub use addr::{AddrEntry, AddrFlag, AddrKind};
pub use associate::{associate, AlignError, Associated, AssociatedBlock, MemlogList, MemlogOp, Step};
pub use build::Build;
pub use config::AnalyzerConfig;
pub use eval::{LocInfo, Message, SymbolicState};
pub use expr::{simplify, BinOp, CastOp, Expr, ExprT, Loc};
pub use memlog::{parse_trace, AddrOp, TraceEntry, TraceParseError};
pub use query::{watch_ip, MessagesResponse, RenderOptions};

use llvm_ir::Module;
use log::{debug, info};
use thiserror::Error;

/// Fatal analysis errors: either the trace file is malformed, or it does not
/// structurally match the IR.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] TraceParseError),

    #[error(transparent)]
    Align(#[from] AlignError),
}

/// Run the full pipeline: align `trace` against `module` following
/// `func_list` (the functions in dynamic call order), then evaluate the
/// aligned blocks. The returned state answers message and warning queries.
pub fn analyze_trace<'m>(
    module: &'m Module,
    trace: &[TraceEntry],
    func_list: &[String],
    config: AnalyzerConfig,
) -> Result<SymbolicState<'m>, Error> {
    let interesting = config.interesting_funcs.clone();
    let associated = associate(module, func_list, trace, interesting.as_ref())?;
    info!(
        "aligned {} instructions; {} blocks on the analyzed path",
        associated.inst_count,
        associated.blocks.len()
    );
    let mut state = SymbolicState::new(module, config);
    let ret = state.run(&associated.blocks);
    debug!("top-level return expression: {:?}", ret);
    Ok(state)
}

/// As [`analyze_trace`], but parsing the raw trace bytes first.
pub fn analyze_trace_bytes<'m>(
    module: &'m Module,
    bytes: &[u8],
    func_list: &[String],
    config: AnalyzerConfig,
) -> Result<SymbolicState<'m>, Error> {
    let trace = parse_trace(bytes)?;
    analyze_trace(module, &trace, func_list, config)
}
