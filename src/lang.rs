//! The reference snippet language: a Java-flavoured subset with a parser,
//! a checker implementing [`SymbolOracle`] and a tree-walking interpreter.

pub mod ast;
mod builtins;
mod check;
mod env;
pub mod interp;
mod parser;
pub mod types;
pub mod value;

use std::io::{self, Write};

use crate::config::ExecutionMode;
use crate::engine::Engine;
use crate::exec::{ExecutionBackend, StopHandle, WorkerExecutor, WORKER_STACK_SIZE};
use crate::oracle::{CompileReport, CompileRequest, Parsed, SymbolOracle};

use ast::Fragment;
use interp::Interpreter;

pub use parser::parse_fragment;

/// Parses and checks snippets of the reference language.
#[derive(Debug, Clone, Copy, Default)]
pub struct LangOracle;

impl SymbolOracle for LangOracle {
    type Unit = Fragment;

    fn parse(&self, source: &str) -> Parsed<Fragment> {
        match parse_fragment(source) {
            Ok(unit) => {
                let kind = check::preliminary_kind(&unit.item);
                Parsed::Unit { unit, kind }
            }
            Err(diag) => Parsed::Erroneous {
                diagnostics: vec![diag],
            },
        }
    }

    fn compile(&self, request: &CompileRequest<'_, Fragment>) -> CompileReport {
        check::compile(request)
    }
}

pub type Backend = Box<dyn ExecutionBackend<Unit = Fragment>>;

/// An engine over the reference language.
pub type Session = Engine<LangOracle, Backend>;

/// Start a session whose program output goes to `out`.
///
/// Local sessions run user code on the calling thread, whose stack may be
/// as small as 2 MiB, and so recurse less deeply than worker sessions.
pub fn session<W>(mode: ExecutionMode, out: W) -> io::Result<Session>
where
    W: Write + Send + 'static,
{
    let backend: Backend = match mode {
        ExecutionMode::Local => Box::new(Interpreter::new(Box::new(out), StopHandle::new())),
        ExecutionMode::Worker => Box::new(WorkerExecutor::spawn(move |stop| {
            Interpreter::new(Box::new(out), stop).with_stack_budget(WORKER_STACK_SIZE / 2)
        })?),
    };
    Ok(Engine::new(LangOracle, backend))
}
