//! The execution backend as seen by the engine.

mod worker;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::names::{join_descriptors, SnippetId};
use crate::snippet::Snippet;

pub use worker::{WorkerExecutor, WORKER_STACK_SIZE};

/// Cooperative cancellation flag shared between the engine and whatever
/// thread is running user code.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// How a declaration is linked into the running program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Ready,
    /// Installed but not usable; touching it fails with an unresolved
    /// reference listing `blockers` (empty when blocked by errors).
    Blocked { blockers: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub class: Option<String>,
    pub method: Option<String>,
    pub snippet: SnippetId,
    pub line: usize,
}

/// `at Shape.area (#3:2)`, `at f (#2:1)`, `at (#5:1)`.
impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("at ")?;
        match (&self.class, &self.method) {
            (Some(c), Some(m)) => write!(f, "{}.{} ", c, m)?,
            (None, Some(m)) => write!(f, "{} ", m)?,
            (Some(c), None) => write!(f, "{} ", c)?,
            (None, None) => {}
        }
        write!(f, "({}:{})", self.snippet.tag(), self.line)
    }
}

/// An exception that escaped a snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvalException {
    pub class_name: String,
    pub message: Option<String>,
    pub frames: Vec<StackFrame>,
}

impl fmt::Display for EvalException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{}: {}", self.class_name, m),
            None => f.write_str(&self.class_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnresolvedUse {
    Call,
    Read,
    Instantiate,
}

/// Raised when running code touches a declaration that is installed but
/// blocked on missing definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedReference {
    pub snippet: SnippetId,
    pub declaration: String,
    pub usage: UnresolvedUse,
    pub blockers: Vec<String>,
}

impl fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, consequence) = match self.usage {
            UnresolvedUse::Call => ("call", "cannot be invoked"),
            UnresolvedUse::Read => ("use", "cannot be accessed"),
            UnresolvedUse::Instantiate => ("use", "cannot be instantiated or its methods invoked"),
        };
        write!(
            f,
            "attempted to {} {} which {} until ",
            verb, self.declaration, consequence
        )?;
        match self.blockers.len() {
            0 => f.write_str("this error is corrected"),
            1 => write!(f, "{} is declared", self.blockers[0]),
            _ => write!(f, "{} are declared", join_descriptors(&self.blockers)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExecFailure {
    Exception(EvalException),
    Unresolved(UnresolvedReference),
    Stopped,
    Terminated { exit_code: i32 },
}

impl fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecFailure::Exception(e) => write!(f, "Exception {}", e),
            ExecFailure::Unresolved(u) => fmt::Display::fmt(u, f),
            ExecFailure::Stopped => f.write_str("execution stopped"),
            ExecFailure::Terminated { exit_code } => {
                write!(f, "execution terminated with exit code {}", exit_code)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    Completed { value: Option<String> },
    Failed(ExecFailure),
}

/// Loads compiled units and runs them.
pub trait ExecutionBackend {
    type Unit;

    /// Install or re-link a declaration.
    fn define(&mut self, snippet: &Snippet, unit: &Self::Unit, access: Access);

    fn remove(&mut self, snippet: &Snippet, unit: &Self::Unit);

    fn run(&mut self, snippet: &Snippet, unit: &Self::Unit) -> ExecOutcome;

    /// Current rendered value of a variable snippet.
    fn var_value(&mut self, snippet: &Snippet) -> ExecOutcome;

    fn stop_handle(&self) -> StopHandle;
}

impl<B: ExecutionBackend + ?Sized> ExecutionBackend for Box<B> {
    type Unit = B::Unit;

    fn define(&mut self, snippet: &Snippet, unit: &Self::Unit, access: Access) {
        (**self).define(snippet, unit, access)
    }

    fn remove(&mut self, snippet: &Snippet, unit: &Self::Unit) {
        (**self).remove(snippet, unit)
    }

    fn run(&mut self, snippet: &Snippet, unit: &Self::Unit) -> ExecOutcome {
        (**self).run(snippet, unit)
    }

    fn var_value(&mut self, snippet: &Snippet) -> ExecOutcome {
        (**self).var_value(snippet)
    }

    fn stop_handle(&self) -> StopHandle {
        (**self).stop_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unresolved(blockers: &[&str]) -> UnresolvedReference {
        UnresolvedReference {
            snippet: SnippetId(2),
            declaration: "method n()".into(),
            usage: UnresolvedUse::Call,
            blockers: blockers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn unresolved_messages() {
        assert_eq!(
            unresolved(&["method p()"]).to_string(),
            "attempted to call method n() which cannot be invoked until method p() is declared"
        );
        assert_eq!(
            unresolved(&["class A", "method p()"]).to_string(),
            "attempted to call method n() which cannot be invoked until class A, and method p() are declared"
        );
        assert_eq!(
            unresolved(&[]).to_string(),
            "attempted to call method n() which cannot be invoked until this error is corrected"
        );
    }

    #[test]
    fn frames_render_with_snippet_tags() {
        let frame = StackFrame {
            class: Some("Shape".into()),
            method: Some("area".into()),
            snippet: SnippetId(3),
            line: 2,
        };
        assert_eq!(frame.to_string(), "at Shape.area (#3:2)");
        let top = StackFrame {
            class: None,
            method: None,
            snippet: SnippetId(5),
            line: 1,
        };
        assert_eq!(top.to_string(), "at (#5:1)");
    }

    #[test]
    fn stop_handle_is_shared() {
        let a = StopHandle::new();
        let b = a.clone();
        b.stop();
        assert!(a.is_stopped());
        a.reset();
        assert!(!b.is_stopped());
    }
}
