//! Tree-walking interpreter over checked fragments; the default
//! [`ExecutionBackend`].

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::error::line_of;
use crate::exec::{
    Access, EvalException, ExecFailure, ExecOutcome, ExecutionBackend, StackFrame, StopHandle,
    UnresolvedReference, UnresolvedUse,
};
use crate::lang::ast::*;
use crate::lang::builtins::{self, Fault};
use crate::lang::env::static_import_class;
use crate::lang::types::library_class;
use crate::lang::value::{coerce, default_for, quote, Object, ObjectKind, Value, MESSAGE_FIELD};
use crate::names::SnippetId;
use crate::snippet::{Snippet, SnippetKind};

/// Nested user calls allowed before `StackOverflowError` is thrown.
pub const MAX_CALL_DEPTH: usize = 1_000;

/// Native stack a run may consume below its entry point. Sized for a
/// default 2 MiB thread; hosts with bigger stacks raise it with
/// [`Interpreter::with_stack_budget`].
pub const DEFAULT_STACK_BUDGET: usize = 1024 * 1024;

/// Approximate address of the current stack top.
#[inline(never)]
fn stack_address() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

/// Shared in-memory sink for program output.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer(Arc<Mutex<Vec<u8>>>);

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, leaving the buffer empty.
    pub fn take(&self) -> String {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&std::mem::take(&mut *buf)).into_owned()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Global {
    snippet: SnippetId,
    type_name: String,
    value: Value,
    access: Access,
    descriptor: String,
}

#[derive(Clone)]
struct MethodEntry {
    snippet: SnippetId,
    decl: Arc<MethodDecl>,
    source: Arc<str>,
    access: Access,
    descriptor: String,
}

#[derive(Clone)]
struct TypeEntry {
    snippet: SnippetId,
    decl: Arc<TypeDecl>,
    source: Arc<str>,
    access: Access,
    descriptor: String,
}

struct Frame {
    class: Option<String>,
    method: Option<String>,
    snippet: SnippetId,
    source: Arc<str>,
    /// Start of the statement being executed.
    offset: usize,
}

/// Non-local exits, propagated through `Err`.
enum Unwind {
    Return(Value),
    Break,
    Continue,
    Throw(Rc<Object>),
    Stopped,
    Exit(i32),
    Unresolved(UnresolvedReference),
}

type Flow<T> = Result<T, Unwind>;

struct Local {
    type_name: String,
    value: Value,
}

/// Locals and receiver of one method body or top-level snippet.
struct Activation {
    scopes: Vec<HashMap<String, Local>>,
    this: Option<Rc<Object>>,
    class: Option<Arc<TypeDecl>>,
}

impl Activation {
    fn new(class: Option<Arc<TypeDecl>>, this: Option<Rc<Object>>) -> Self {
        Activation {
            scopes: vec![HashMap::new()],
            this,
            class,
        }
    }

    fn lookup(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Local> {
        self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name))
    }

    fn declare(&mut self, name: &str, type_name: &str, value: Value) {
        let value = coerce(value, type_name);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                Local {
                    type_name: type_name.to_string(),
                    value,
                },
            );
        }
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }
}

fn check_access(
    access: &Access,
    snippet: SnippetId,
    descriptor: &str,
    usage: UnresolvedUse,
) -> Flow<()> {
    match access {
        Access::Ready => Ok(()),
        Access::Blocked { blockers } => Err(Unwind::Unresolved(UnresolvedReference {
            snippet,
            declaration: descriptor.to_string(),
            usage,
            blockers: blockers.clone(),
        })),
    }
}

fn compare(op: BinOp, ord: Ordering) -> bool {
    match op {
        BinOp::Lt => ord.is_lt(),
        BinOp::Le => ord.is_le(),
        BinOp::Gt => ord.is_gt(),
        BinOp::Ge => ord.is_ge(),
        _ => false,
    }
}

fn inferred_type_name(value: &Value) -> &'static str {
    match value {
        Value::Int(_) => "int",
        Value::Long(_) => "long",
        Value::Double(_) => "double",
        Value::Bool(_) => "boolean",
        _ => "",
    }
}

fn is_static_field(decl: &TypeDecl, f: &VarDecl) -> bool {
    f.modifiers.has(Modifier::Static) || decl.kind == TypeKind::Interface
}

pub struct Interpreter {
    globals: HashMap<String, Global>,
    methods: HashMap<String, Vec<MethodEntry>>,
    types: HashMap<String, TypeEntry>,
    imports: Vec<(SnippetId, ImportDecl)>,
    /// Static fields and enum constants, per class, created on first use.
    statics: HashMap<String, Rc<Object>>,
    out: Box<dyn Write + Send>,
    stop: StopHandle,
    frames: Vec<Frame>,
    stack_base: usize,
    stack_budget: usize,
    next_identity: u32,
    started: Instant,
    terminated: Option<i32>,
}

impl Interpreter {
    pub fn new(out: Box<dyn Write + Send>, stop: StopHandle) -> Self {
        Interpreter {
            globals: HashMap::new(),
            methods: HashMap::new(),
            types: HashMap::new(),
            imports: Vec::new(),
            statics: HashMap::new(),
            out,
            stop,
            frames: Vec::new(),
            stack_base: stack_address(),
            stack_budget: DEFAULT_STACK_BUDGET,
            next_identity: 0,
            started: Instant::now(),
            terminated: None,
        }
    }

    pub fn with_stack_budget(mut self, bytes: usize) -> Self {
        self.stack_budget = bytes;
        self
    }

    fn stack_exhausted(&self) -> bool {
        self.frames.len() >= MAX_CALL_DEPTH
            || self.stack_base.abs_diff(stack_address()) > self.stack_budget
    }

    // ── Top level ─────────────────────────────────────────────────────────

    fn run_item(&mut self, snippet: &Snippet, unit: &Fragment) -> Flow<Option<String>> {
        let mut act = Activation::new(None, None);
        match (&unit.item, &snippet.kind) {
            (Item::Var(v), SnippetKind::Var { type_name, .. }) => {
                let value = match &v.init {
                    Some(init) => self.eval(init, &mut act)?,
                    None => default_for(type_name),
                };
                let value = self.store_global(snippet, value);
                Ok(Some(self.render(&value)?))
            }
            (Item::Expr(e), kind) => {
                let value = self.eval(e, &mut act)?;
                match kind {
                    SnippetKind::Var { .. } => {
                        let value = self.store_global(snippet, value);
                        Ok(Some(self.render(&value)?))
                    }
                    SnippetKind::Expression { .. } => Ok(Some(self.render(&value)?)),
                    _ => Ok(None),
                }
            }
            (Item::Stmt(s), _) => {
                self.exec(s, &mut act)?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn store_global(&mut self, snippet: &Snippet, value: Value) -> Value {
        let (name, type_name) = match &snippet.kind {
            SnippetKind::Var {
                name, type_name, ..
            } => (name.to_string(), type_name.to_string()),
            _ => return value,
        };
        let value = coerce(value, &type_name);
        match self.globals.get_mut(&name) {
            Some(g) if g.snippet == snippet.id => g.value = value.clone(),
            _ => {
                self.globals.insert(
                    name,
                    Global {
                        snippet: snippet.id,
                        type_name,
                        value: value.clone(),
                        access: Access::Ready,
                        descriptor: snippet.descriptor(),
                    },
                );
            }
        }
        value
    }

    fn failure(&mut self, unwind: Unwind) -> Option<ExecFailure> {
        match unwind {
            Unwind::Throw(obj) => Some(ExecFailure::Exception(self.exception(&obj))),
            Unwind::Stopped => Some(ExecFailure::Stopped),
            Unwind::Exit(exit_code) => {
                self.terminated = Some(exit_code);
                Some(ExecFailure::Terminated { exit_code })
            }
            Unwind::Unresolved(u) => Some(ExecFailure::Unresolved(u)),
            Unwind::Return(_) | Unwind::Break | Unwind::Continue => None,
        }
    }

    fn exception(&self, obj: &Object) -> EvalException {
        EvalException {
            class_name: self.exception_class_name(&obj.class),
            message: obj.message(),
            frames: obj.trace.clone(),
        }
    }

    fn exception_class_name(&self, class: &str) -> String {
        if self.types.contains_key(class) {
            return class.to_string();
        }
        library_class(class).map_or_else(|| class.to_string(), |c| c.qualified())
    }

    // ── Objects ───────────────────────────────────────────────────────────

    fn alloc(&mut self, class: &str, kind: ObjectKind) -> Rc<Object> {
        self.next_identity += 1;
        let trace = if self.class_is(class, "Throwable") {
            self.capture_trace()
        } else {
            Vec::new()
        };
        Rc::new(Object {
            class: class.to_string(),
            kind,
            identity: self.next_identity.wrapping_mul(0x9E37_79B1) >> 4,
            fields: RefCell::new(Vec::new()),
            trace,
        })
    }

    fn capture_trace(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .rev()
            .map(|f| StackFrame {
                class: f.class.clone(),
                method: f.method.clone(),
                snippet: f.snippet,
                line: line_of(&f.source, f.offset),
            })
            .collect()
    }

    fn new_throwable(&mut self, class: &str, message: Option<String>) -> Rc<Object> {
        let obj = self.alloc(class, ObjectKind::Plain);
        let message = message.map_or(Value::Null, |m| Value::str(&m));
        obj.declare(MESSAGE_FIELD, "String", message);
        obj
    }

    fn fault(&mut self, class: &str, message: Option<&str>) -> Unwind {
        Unwind::Throw(self.new_throwable(class, message.map(str::to_string)))
    }

    fn raise(&mut self, fault: Fault) -> Unwind {
        Unwind::Throw(self.new_throwable(fault.class, fault.message))
    }

    /// Is `class` the same as, or a subtype of, `target`? Both are simple names.
    fn class_is(&self, class: &str, target: &str) -> bool {
        if target == "Object" {
            return true;
        }
        let mut stack = vec![class.to_string()];
        let mut seen = HashSet::new();
        while let Some(c) = stack.pop() {
            if c == target {
                return true;
            }
            if !seen.insert(c.clone()) {
                continue;
            }
            if let Some(t) = self.types.get(&c) {
                stack.extend(t.decl.supertypes().map(|s| s.simple_name().to_string()));
            } else if let Some(sup) = library_class(&c).and_then(|l| l.superclass) {
                stack.push(sup.to_string());
            }
        }
        matches!(
            (class, target),
            ("String", "CharSequence" | "Comparable")
                | ("Integer" | "Long" | "Double", "Number" | "Comparable")
        )
    }

    fn fits(&self, value: &Value, type_name: &str, exact: bool) -> bool {
        let simple = type_name.rsplit('.').next().unwrap_or(type_name);
        match (simple, value) {
            ("Object", _) => !matches!(value, Value::Void),
            ("int", Value::Int(_))
            | ("long", Value::Long(_))
            | ("double", Value::Double(_))
            | ("boolean", Value::Bool(_)) => true,
            ("long", Value::Int(_)) | ("double", Value::Int(_) | Value::Long(_)) => !exact,
            ("int" | "long" | "double" | "boolean", _) => false,
            (_, Value::Null) => true,
            (_, Value::Void) => false,
            (t, v) => self.class_is(v.class_name(), t),
        }
    }

    fn applicable(&self, params: &[Param], args: &[Value], exact: bool) -> bool {
        params.len() == args.len()
            && params
                .iter()
                .zip(args)
                .all(|(p, a)| self.fits(a, &p.ty.name, exact))
    }

    /// Most specific applicable candidate: exact parameter matches first,
    /// then the first one reachable by widening.
    fn pick<T>(&self, mut candidates: Vec<(T, Arc<MethodDecl>)>, args: &[Value]) -> Option<(T, Arc<MethodDecl>)> {
        let best = candidates
            .iter()
            .position(|(_, m)| self.applicable(&m.params, args, true))
            .or_else(|| {
                candidates
                    .iter()
                    .position(|(_, m)| self.applicable(&m.params, args, false))
            })?;
        Some(candidates.swap_remove(best))
    }

    /// Concrete methods named `name` on `class` and its supertypes, nearest first.
    fn find_method(&self, class: &str, name: &str, args: &[Value]) -> Option<(TypeEntry, Arc<MethodDecl>)> {
        let mut candidates = Vec::new();
        let mut stack = vec![class.to_string()];
        let mut seen = HashSet::new();
        while let Some(c) = stack.pop() {
            if !seen.insert(c.clone()) {
                continue;
            }
            let Some(entry) = self.types.get(&c) else {
                continue;
            };
            for m in entry.decl.methods() {
                if m.name == name && m.body.is_some() {
                    candidates.push((entry.clone(), m.clone()));
                }
            }
            let sups: Vec<String> = entry
                .decl
                .supertypes()
                .map(|s| s.simple_name().to_string())
                .collect();
            stack.extend(sups.into_iter().rev());
        }
        self.pick(candidates, args)
    }

    fn top_method(&self, name: &str, args: &[Value]) -> Option<MethodEntry> {
        let candidates = self
            .methods
            .get(name)?
            .iter()
            .map(|e| (e.clone(), e.decl.clone()))
            .collect();
        self.pick(candidates, args).map(|(e, _)| e)
    }

    /// Owner of a static field or enum constant visible from `class`.
    fn static_owner(&self, class: &str, name: &str) -> Option<String> {
        let mut current = Some(class.to_string());
        while let Some(c) = current {
            let t = self.types.get(&c)?;
            let decl = &t.decl;
            if decl.constants.iter().any(|(k, _)| k == name)
                || decl
                    .fields()
                    .any(|f| f.name == name && is_static_field(decl, f))
            {
                return Some(c);
            }
            current = decl.extends.first().map(|s| s.simple_name().to_string());
        }
        None
    }

    fn statics_of(&mut self, class: &str) -> Flow<Rc<Object>> {
        if let Some(holder) = self.statics.get(class) {
            return Ok(holder.clone());
        }
        let Some(entry) = self.types.get(class).cloned() else {
            return Err(self.fault("NoClassDefFoundError", Some(class)));
        };
        check_access(
            &entry.access,
            entry.snippet,
            &entry.descriptor,
            UnresolvedUse::Instantiate,
        )?;
        let holder = Rc::new(Object {
            class: class.to_string(),
            kind: ObjectKind::Plain,
            identity: 0,
            fields: RefCell::new(Vec::new()),
            trace: Vec::new(),
        });
        self.statics.insert(class.to_string(), holder.clone());
        let decl = entry.decl.clone();
        for f in decl.fields().filter(|f| is_static_field(&decl, f)) {
            holder.declare(&f.name, &f.ty.name, default_for(&f.ty.name));
        }
        for (ordinal, (name, _)) in decl.constants.iter().enumerate() {
            let constant = self.alloc(
                class,
                ObjectKind::Enum {
                    name: name.clone(),
                    ordinal: ordinal as i32,
                },
            );
            self.construct(&constant, &entry, Vec::new())?;
            holder.declare(name, class, Value::Object(constant));
        }
        let frame = Frame {
            class: Some(class.to_string()),
            method: Some("<clinit>".to_string()),
            snippet: entry.snippet,
            source: entry.source.clone(),
            offset: decl.span.0,
        };
        self.with_frame(frame, |s| {
            let mut act = Activation::new(Some(decl.clone()), None);
            for f in decl.fields().filter(|f| is_static_field(&decl, f)) {
                if let Some(init) = &f.init {
                    s.mark(f.span.0);
                    let value = s.eval(init, &mut act)?;
                    holder.set(&f.name, value);
                }
            }
            Ok(())
        })?;
        Ok(self.statics.get(class).cloned().unwrap_or(holder))
    }

    fn instantiate(&mut self, class: &str, args: Vec<Value>) -> Flow<Value> {
        if let Some(entry) = self.types.get(class).cloned() {
            check_access(
                &entry.access,
                entry.snippet,
                &entry.descriptor,
                UnresolvedUse::Instantiate,
            )?;
            let kind = if entry.decl.kind == TypeKind::Record {
                ObjectKind::Record
            } else {
                ObjectKind::Plain
            };
            let obj = self.alloc(class, kind);
            self.construct(&obj, &entry, args)?;
            return Ok(Value::Object(obj));
        }
        if class == "String" {
            return Ok(match args.into_iter().next() {
                Some(Value::Str(s)) => Value::Str(s),
                _ => Value::str(""),
            });
        }
        if self.class_is(class, "Throwable") {
            let message = match args.first() {
                Some(Value::Str(s)) => Some(s.to_string()),
                _ => None,
            };
            return Ok(Value::Object(self.new_throwable(class, message)));
        }
        Ok(Value::Object(self.alloc(class, ObjectKind::Plain)))
    }

    /// Run the constructor chain of `entry` on a freshly allocated object.
    fn construct(&mut self, obj: &Rc<Object>, entry: &TypeEntry, args: Vec<Value>) -> Flow<()> {
        let decl = entry.decl.clone();
        for f in decl.fields().filter(|f| !is_static_field(&decl, f)) {
            obj.declare(&f.name, &f.ty.name, default_for(&f.ty.name));
        }
        if decl.kind == TypeKind::Record {
            for (c, a) in decl.components.iter().zip(args) {
                obj.declare(&c.name, &c.ty.name, a);
            }
            return Ok(());
        }
        let ctor = decl
            .constructors()
            .find(|c| {
                c.params.len() == args.len()
                    && c.params.iter().zip(&args).all(|(p, a)| self.fits(a, &p.ty.name, false))
            });
        let frame = Frame {
            class: Some(decl.name.clone()),
            method: Some("<init>".to_string()),
            snippet: entry.snippet,
            source: entry.source.clone(),
            offset: ctor.map_or(decl.span.0, |c| c.span.0),
        };
        self.with_frame(frame, |s| {
            let mut act = Activation::new(Some(decl.clone()), Some(obj.clone()));
            if let Some(c) = ctor {
                for (p, a) in c.params.iter().zip(args) {
                    act.declare(&p.name, &p.ty.name, a);
                }
            }
            let stmts = ctor.map_or(&[][..], |c| c.body.stmts.as_slice());
            let (super_args, rest) = match stmts.split_first() {
                Some((Stmt::SuperCall { args, span }, rest)) => {
                    s.mark(span.0);
                    (s.eval_args(args, &mut act)?, rest)
                }
                _ => (Vec::new(), stmts),
            };
            s.construct_super(obj, &decl, super_args)?;
            for f in decl.fields().filter(|f| !is_static_field(&decl, f)) {
                if let Some(init) = &f.init {
                    s.mark(f.span.0);
                    let value = s.eval(init, &mut act)?;
                    obj.set(&f.name, value);
                }
            }
            match s.exec_block(rest, &mut act) {
                Ok(()) | Err(Unwind::Return(_)) => Ok(()),
                Err(e) => Err(e),
            }
        })
    }

    fn construct_super(&mut self, obj: &Rc<Object>, decl: &TypeDecl, args: Vec<Value>) -> Flow<()> {
        if decl.kind != TypeKind::Class {
            return Ok(());
        }
        let Some(sup) = decl.extends.first() else {
            return Ok(());
        };
        let name = sup.simple_name();
        if let Some(entry) = self.types.get(name).cloned() {
            return self.construct(obj, &entry, args);
        }
        if self.class_is(name, "Throwable") {
            let message = match args.into_iter().next() {
                Some(Value::Str(s)) => Value::Str(s),
                _ => Value::Null,
            };
            obj.declare(MESSAGE_FIELD, "String", message);
        }
        Ok(())
    }

    // ── Calls ─────────────────────────────────────────────────────────────

    fn check_stop(&self) -> Flow<()> {
        if self.stop.is_stopped() {
            Err(Unwind::Stopped)
        } else {
            Ok(())
        }
    }

    fn mark(&mut self, offset: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.offset = offset;
        }
    }

    fn with_frame<T>(&mut self, frame: Frame, f: impl FnOnce(&mut Self) -> Flow<T>) -> Flow<T> {
        self.check_stop()?;
        if self.stack_exhausted() {
            return Err(self.fault("StackOverflowError", None));
        }
        self.frames.push(frame);
        let result = f(self);
        self.frames.pop();
        result
    }

    fn invoke(
        &mut self,
        frame: Frame,
        class: Option<Arc<TypeDecl>>,
        this: Option<Rc<Object>>,
        decl: &MethodDecl,
        args: Vec<Value>,
    ) -> Flow<Value> {
        let Some(body) = &decl.body else {
            return Err(self.fault("AbstractMethodError", Some(&decl.name)));
        };
        let mut act = Activation::new(class, this);
        for (p, a) in decl.params.iter().zip(args) {
            act.declare(&p.name, &p.ty.name, a);
        }
        match self.with_frame(frame, |s| s.exec_block(&body.stmts, &mut act)) {
            Ok(()) => Ok(Value::Void),
            Err(Unwind::Return(v)) => Ok(coerce(v, &decl.ret.name)),
            Err(e) => Err(e),
        }
    }

    fn invoke_member(
        &mut self,
        owner: &TypeEntry,
        m: &MethodDecl,
        this: Option<Rc<Object>>,
        args: Vec<Value>,
    ) -> Flow<Value> {
        check_access(
            &owner.access,
            owner.snippet,
            &owner.descriptor,
            UnresolvedUse::Instantiate,
        )?;
        let frame = Frame {
            class: Some(owner.decl.name.clone()),
            method: Some(m.name.clone()),
            snippet: owner.snippet,
            source: owner.source.clone(),
            offset: m.span.0,
        };
        let this = if m.is_static() { None } else { this };
        self.invoke(frame, Some(owner.decl.clone()), this, m, args)
    }

    fn invoke_top(&mut self, entry: MethodEntry, args: Vec<Value>) -> Flow<Value> {
        check_access(
            &entry.access,
            entry.snippet,
            &entry.descriptor,
            UnresolvedUse::Call,
        )?;
        let frame = Frame {
            class: None,
            method: Some(entry.decl.name.clone()),
            snippet: entry.snippet,
            source: entry.source.clone(),
            offset: entry.decl.span.0,
        };
        self.invoke(frame, None, None, &entry.decl, args)
    }

    fn eval_args(&mut self, args: &[Expr], act: &mut Activation) -> Flow<Vec<Value>> {
        args.iter().map(|a| self.eval(a, act)).collect()
    }

    fn call(
        &mut self,
        target: Option<&Expr>,
        name: &str,
        args: &[Expr],
        act: &mut Activation,
    ) -> Flow<Value> {
        if let Some(target) = target {
            if let Some(class) = self.type_qualifier(target, act) {
                let args = self.eval_args(args, act)?;
                return self.call_static(&class, name, args);
            }
            let receiver = self.eval(target, act)?;
            let args = self.eval_args(args, act)?;
            return self.call_method(receiver, name, args);
        }
        let args = self.eval_args(args, act)?;
        if let Some(class) = act.class.clone() {
            let dispatch = act.this.as_ref().map_or(class.name.as_str(), |t| t.class.as_str());
            let found = self
                .find_method(dispatch, name, &args)
                .or_else(|| self.find_method(&class.name, name, &args));
            if let Some((owner, m)) = found {
                return self.invoke_member(&owner, &m, act.this.clone(), args);
            }
        }
        if let Some(entry) = self.top_method(name, &args) {
            return self.invoke_top(entry, args);
        }
        if let Some(class) = static_import_class(self.imports.iter().map(|(_, i)| i), name) {
            return self.call_static(class, name, args);
        }
        let message = format!("no method {} is available", name);
        Err(self.fault("IllegalStateException", Some(&message)))
    }

    fn call_static(&mut self, class: &str, name: &str, args: Vec<Value>) -> Flow<Value> {
        if let Some(entry) = self.types.get(class).cloned() {
            check_access(
                &entry.access,
                entry.snippet,
                &entry.descriptor,
                UnresolvedUse::Instantiate,
            )?;
            if let Some((owner, m)) = self.find_method(class, name, &args) {
                return self.invoke_member(&owner, &m, None, args);
            }
            let message = format!("{}.{}", class, name);
            return Err(self.fault("NoSuchMethodError", Some(&message)));
        }
        match (class, name) {
            ("System", "exit") => Err(Unwind::Exit(
                args.first().and_then(Value::as_int).unwrap_or(0),
            )),
            ("String", "valueOf") => {
                let text = match args.first() {
                    Some(v) => self.stringify(v)?,
                    None => "null".to_string(),
                };
                Ok(Value::str(&text))
            }
            _ => match builtins::call_static(class, name, &args, self.started) {
                Some(Ok(v)) => Ok(v),
                Some(Err(fault)) => Err(self.raise(fault)),
                None => {
                    let message = format!("{}.{}", class, name);
                    Err(self.fault("NoSuchMethodError", Some(&message)))
                }
            },
        }
    }

    fn call_method(&mut self, receiver: Value, name: &str, args: Vec<Value>) -> Flow<Value> {
        let obj = match &receiver {
            Value::Null => return Err(self.fault("NullPointerException", None)),
            Value::Str(s) => {
                return match builtins::string_method(s, name, &args) {
                    Some(Ok(v)) => Ok(v),
                    Some(Err(fault)) => Err(self.raise(fault)),
                    None => self.object_method(&receiver, name, &args),
                };
            }
            Value::Object(o) => o.clone(),
            _ => return self.object_method(&receiver, name, &args),
        };
        if let ObjectKind::Stream { .. } = obj.kind {
            return self.print(name, &args);
        }
        if let Some((owner, m)) = self.find_method(&obj.class, name, &args) {
            return self.invoke_member(&owner, &m, Some(obj), args);
        }
        if args.is_empty() {
            match &obj.kind {
                ObjectKind::Record => {
                    if let Some(v) = obj.get(name) {
                        return Ok(v);
                    }
                }
                ObjectKind::Enum {
                    name: constant,
                    ordinal,
                } => match name {
                    "name" => return Ok(Value::str(constant)),
                    "ordinal" => return Ok(Value::Int(*ordinal)),
                    _ => {}
                },
                _ => {}
            }
            if name == "getMessage" && self.class_is(&obj.class, "Throwable") {
                return Ok(obj.get(MESSAGE_FIELD).unwrap_or(Value::Null));
            }
        }
        self.object_method(&receiver, name, &args)
    }

    /// Methods every value has: `toString`, `equals`, `hashCode`.
    fn object_method(&mut self, receiver: &Value, name: &str, args: &[Value]) -> Flow<Value> {
        match (name, args) {
            ("toString", []) => Ok(Value::str(&self.stringify(receiver)?)),
            ("equals", [other]) => Ok(Value::Bool(self.equal(receiver, other))),
            ("hashCode", []) => Ok(Value::Int(match receiver {
                Value::Object(o) => o.identity as i32,
                other => builtins::primitive_hash(other),
            })),
            _ => {
                let message = format!("{}.{}", receiver.class_name(), name);
                Err(self.fault("NoSuchMethodError", Some(&message)))
            }
        }
    }

    fn print(&mut self, name: &str, args: &[Value]) -> Flow<Value> {
        let mut text = match args.first() {
            Some(v) => self.stringify(v)?,
            None => String::new(),
        };
        if name == "println" {
            text.push('\n');
        }
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            warn!(error = %e, "failed to write program output");
        }
        Ok(Value::Void)
    }

    // ── Values ────────────────────────────────────────────────────────────

    /// The string a value converts to in concatenation and `println`.
    fn stringify(&mut self, value: &Value) -> Flow<String> {
        let Value::Object(obj) = value else {
            return Ok(value.to_string());
        };
        if let Some((owner, m)) = self.find_method(&obj.class, "toString", &[]) {
            let result = self.invoke_member(&owner, &m, Some(obj.clone()), Vec::new())?;
            return Ok(result.to_string());
        }
        Ok(match &obj.kind {
            ObjectKind::Enum { name, .. } => name.clone(),
            ObjectKind::Record => {
                let fields: Vec<(String, Value)> = obj
                    .fields
                    .borrow()
                    .iter()
                    .map(|f| (f.name.clone(), f.value.clone()))
                    .collect();
                let mut parts = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    parts.push(format!("{}={}", name, self.stringify(&value)?));
                }
                format!("{}[{}]", obj.class, parts.join(", "))
            }
            ObjectKind::Stream { .. } => format!("java.io.PrintStream@{:x}", obj.identity),
            ObjectKind::Plain if self.class_is(&obj.class, "Throwable") => {
                let class = self.exception_class_name(&obj.class);
                match obj.message() {
                    Some(m) => format!("{}: {}", class, m),
                    None => class,
                }
            }
            ObjectKind::Plain => value.to_string(),
        })
    }

    /// Feedback rendering: strings are quoted.
    fn render(&mut self, value: &Value) -> Flow<String> {
        match value {
            Value::Str(s) => Ok(quote(s)),
            other => self.stringify(other),
        }
    }

    fn equal(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Object(x), Value::Object(y))
                if x.kind == ObjectKind::Record && y.kind == ObjectKind::Record =>
            {
                x.class == y.class && {
                    let xs = x.fields.borrow();
                    let ys = y.fields.borrow();
                    xs.len() == ys.len()
                        && xs.iter().zip(ys.iter()).all(|(f, g)| self.equal(&f.value, &g.value))
                }
            }
            _ => same(a, b),
        }
    }

    // ── Names ─────────────────────────────────────────────────────────────

    fn is_value_name(&self, name: &str, act: &Activation) -> bool {
        act.lookup(name).is_some()
            || act.this.as_ref().map_or(false, |t| t.get(name).is_some())
            || act
                .class
                .as_ref()
                .map_or(false, |c| self.static_owner(&c.name, name).is_some())
            || self.globals.contains_key(name)
    }

    /// `Math` in `Math.max(...)`: a name that denotes a class, not a value.
    fn type_qualifier(&self, target: &Expr, act: &Activation) -> Option<String> {
        let Expr::Name { name, .. } = target else {
            return None;
        };
        if self.is_value_name(name, act) {
            return None;
        }
        (self.types.contains_key(name) || library_class(name).is_some()).then(|| name.clone())
    }

    fn read_name(&mut self, name: &str, act: &Activation) -> Flow<Value> {
        if let Some(local) = act.lookup(name) {
            return Ok(local.value.clone());
        }
        if let Some(v) = act.this.as_ref().and_then(|t| t.get(name)) {
            return Ok(v);
        }
        if let Some(class) = &act.class {
            if let Some(owner) = self.static_owner(&class.name, name) {
                let holder = self.statics_of(&owner)?;
                return Ok(holder.get(name).unwrap_or(Value::Null));
            }
        }
        if let Some(g) = self.globals.get(name) {
            check_access(&g.access, g.snippet, &g.descriptor, UnresolvedUse::Read)?;
            return Ok(g.value.clone());
        }
        let message = format!("no variable {} is available", name);
        Err(self.fault("IllegalStateException", Some(&message)))
    }

    fn read_field(&mut self, target: &Expr, name: &str, act: &mut Activation) -> Flow<Value> {
        if let Some(class) = self.type_qualifier(target, act) {
            if self.types.contains_key(&class) {
                let owner = self.static_owner(&class, name).unwrap_or(class);
                let holder = self.statics_of(&owner)?;
                return Ok(holder.get(name).unwrap_or(Value::Null));
            }
            if class == "System" && (name == "out" || name == "err") {
                let stream = self.alloc("PrintStream", ObjectKind::Stream { err: name == "err" });
                return Ok(Value::Object(stream));
            }
            if let Some(v) = builtins::static_field(&class, name) {
                return Ok(v);
            }
            let message = format!("{}.{}", class, name);
            return Err(self.fault("NoSuchFieldError", Some(&message)));
        }
        match self.eval(target, act)? {
            Value::Object(o) => Ok(o.get(name).unwrap_or(Value::Null)),
            _ => Err(self.fault("NullPointerException", None)),
        }
    }

    /// Store into a variable or field; returns the stored (converted) value.
    fn assign(&mut self, target: &Expr, value: Value, act: &mut Activation) -> Flow<Value> {
        match target {
            Expr::Name { name, .. } => {
                if let Some(local) = act.lookup_mut(name) {
                    local.value = coerce(value, &local.type_name);
                    return Ok(local.value.clone());
                }
                if let Some(this) = &act.this {
                    if this.set(name, value.clone()) {
                        return Ok(this.get(name).unwrap_or(value));
                    }
                }
                if let Some(class) = act.class.clone() {
                    if let Some(owner) = self.static_owner(&class.name, name) {
                        let holder = self.statics_of(&owner)?;
                        holder.set(name, value.clone());
                        return Ok(holder.get(name).unwrap_or(value));
                    }
                }
                if let Some(g) = self.globals.get_mut(name.as_str()) {
                    check_access(&g.access, g.snippet, &g.descriptor, UnresolvedUse::Read)?;
                    g.value = coerce(value, &g.type_name);
                    return Ok(g.value.clone());
                }
                let message = format!("no variable {} is available", name);
                Err(self.fault("IllegalStateException", Some(&message)))
            }
            Expr::Field { target, name, .. } => {
                if let Some(class) = self.type_qualifier(target, act) {
                    let owner = self.static_owner(&class, name).unwrap_or(class);
                    let holder = self.statics_of(&owner)?;
                    holder.set(name, value.clone());
                    return Ok(holder.get(name).unwrap_or(value));
                }
                match self.eval(target, act)? {
                    Value::Object(o) => {
                        o.set(name, value.clone());
                        Ok(o.get(name).unwrap_or(value))
                    }
                    _ => Err(self.fault("NullPointerException", None)),
                }
            }
            _ => Ok(value),
        }
    }

    // ── Statements ────────────────────────────────────────────────────────

    fn exec_block(&mut self, stmts: &[Stmt], act: &mut Activation) -> Flow<()> {
        act.push();
        let result = stmts.iter().try_for_each(|s| self.exec(s, act));
        act.pop();
        result
    }

    fn exec_nested(&mut self, stmt: &Stmt, act: &mut Activation) -> Flow<()> {
        act.push();
        let result = self.exec(stmt, act);
        act.pop();
        result
    }

    fn truth(&mut self, cond: &Expr, act: &mut Activation) -> Flow<bool> {
        Ok(self.eval(cond, act)?.as_bool().unwrap_or(false))
    }

    /// Run a loop body; `Ok(false)` means the loop was broken out of.
    fn loop_body(&mut self, body: &Stmt, act: &mut Activation) -> Flow<bool> {
        match self.exec_nested(body, act) {
            Ok(()) | Err(Unwind::Continue) => Ok(true),
            Err(Unwind::Break) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn exec(&mut self, stmt: &Stmt, act: &mut Activation) -> Flow<()> {
        self.mark(stmt.span().0);
        match stmt {
            Stmt::Block(b) => self.exec_block(&b.stmts, act),
            Stmt::Local(v) => {
                let value = match &v.init {
                    Some(init) => self.eval(init, act)?,
                    None => default_for(&v.ty.name),
                };
                let type_name = if v.ty.is_var() {
                    inferred_type_name(&value)
                } else {
                    v.ty.name.as_str()
                };
                act.declare(&v.name, type_name, value);
                Ok(())
            }
            Stmt::Expr(e) => self.eval(e, act).map(drop),
            Stmt::If {
                cond, then, els, ..
            } => {
                if self.truth(cond, act)? {
                    self.exec_nested(then, act)
                } else if let Some(els) = els {
                    self.exec_nested(els, act)
                } else {
                    Ok(())
                }
            }
            Stmt::While { cond, body, .. } => {
                loop {
                    self.check_stop()?;
                    if !self.truth(cond, act)? || !self.loop_body(body, act)? {
                        break;
                    }
                }
                Ok(())
            }
            Stmt::DoWhile { body, cond, .. } => {
                loop {
                    self.check_stop()?;
                    if !self.loop_body(body, act)? || !self.truth(cond, act)? {
                        break;
                    }
                }
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                act.push();
                let result = self.exec_for(init.as_deref(), cond.as_ref(), update, body, act);
                act.pop();
                result
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(e) => self.eval(e, act)?,
                    None => Value::Void,
                };
                Err(Unwind::Return(value))
            }
            Stmt::Throw { value, .. } => match self.eval(value, act)? {
                Value::Object(obj) => Err(Unwind::Throw(obj)),
                _ => Err(self.fault("NullPointerException", None)),
            },
            Stmt::Try {
                body,
                catches,
                finally,
                ..
            } => {
                let mut result = self.exec_block(&body.stmts, act);
                if let Err(Unwind::Throw(obj)) = &result {
                    let obj = obj.clone();
                    let handler = catches.iter().find(|c| {
                        c.types
                            .iter()
                            .any(|t| self.class_is(&obj.class, t.simple_name()))
                    });
                    if let Some(handler) = handler {
                        act.push();
                        act.declare(&handler.name, "Object", Value::Object(obj));
                        result = self.exec_block(&handler.body.stmts, act);
                        act.pop();
                    }
                }
                if let Some(finally) = finally {
                    self.exec_block(&finally.stmts, act)?;
                }
                result
            }
            // Consumed by `construct`.
            Stmt::SuperCall { .. } => Ok(()),
            Stmt::Break(_) => Err(Unwind::Break),
            Stmt::Continue(_) => Err(Unwind::Continue),
            Stmt::Empty(_) => Ok(()),
        }
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        update: &[Expr],
        body: &Stmt,
        act: &mut Activation,
    ) -> Flow<()> {
        if let Some(init) = init {
            self.exec(init, act)?;
        }
        loop {
            self.check_stop()?;
            if let Some(cond) = cond {
                if !self.truth(cond, act)? {
                    break;
                }
            }
            if !self.loop_body(body, act)? {
                break;
            }
            for u in update {
                self.eval(u, act)?;
            }
        }
        Ok(())
    }

    // ── Expressions ───────────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr, act: &mut Activation) -> Flow<Value> {
        match expr {
            Expr::Int { value, long, .. } => Ok(if *long {
                Value::Long(*value)
            } else {
                Value::Int(*value as i32)
            }),
            Expr::Double { value, .. } => Ok(Value::Double(*value)),
            Expr::Str { value, .. } => Ok(Value::str(value)),
            Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
            Expr::Null(_) => Ok(Value::Null),
            Expr::This(_) => Ok(act.this.clone().map_or(Value::Null, Value::Object)),
            Expr::Name { name, .. } => self.read_name(name, act),
            Expr::Field { target, name, .. } => self.read_field(target, name, act),
            Expr::Call {
                target, name, args, ..
            } => self.call(target.as_deref(), name, args, act),
            Expr::New { ty, args, .. } => {
                let args = self.eval_args(args, act)?;
                self.instantiate(ty.simple_name(), args)
            }
            Expr::Unary { op, expr, .. } => {
                let value = self.eval(expr, act)?;
                Ok(match (op, value) {
                    (UnaryOp::Neg, Value::Int(n)) => Value::Int(n.wrapping_neg()),
                    (UnaryOp::Neg, Value::Long(n)) => Value::Long(n.wrapping_neg()),
                    (UnaryOp::Neg, Value::Double(d)) => Value::Double(-d),
                    (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
                    (_, other) => other,
                })
            }
            Expr::Binary {
                op: BinOp::And,
                lhs,
                rhs,
            } => Ok(Value::Bool(self.truth(lhs, act)? && self.truth(rhs, act)?)),
            Expr::Binary {
                op: BinOp::Or,
                lhs,
                rhs,
            } => Ok(Value::Bool(self.truth(lhs, act)? || self.truth(rhs, act)?)),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs, act)?;
                let r = self.eval(rhs, act)?;
                self.binary(*op, l, r)
            }
            Expr::Assign { op, target, value } => {
                let value = self.eval(value, act)?;
                let value = match op {
                    None => value,
                    Some(op) => {
                        let current = self.eval(target, act)?;
                        self.binary(*op, current, value)?
                    }
                };
                self.assign(target, value, act)
            }
            Expr::IncDec {
                target,
                increment,
                prefix,
                ..
            } => {
                let current = self.eval(target, act)?;
                let step = Value::Int(if *increment { 1 } else { -1 });
                let next = self.binary(BinOp::Add, current.clone(), step)?;
                let stored = self.assign(target, next, act)?;
                Ok(if *prefix { stored } else { current })
            }
            Expr::Cond { cond, then, els } => {
                if self.truth(cond, act)? {
                    self.eval(then, act)
                } else {
                    self.eval(els, act)
                }
            }
            Expr::InstanceOf { expr, ty } => {
                let value = self.eval(expr, act)?;
                let is = !value.is_null() && self.class_is(value.class_name(), ty.simple_name());
                Ok(Value::Bool(is))
            }
        }
    }

    fn binary(&mut self, op: BinOp, l: Value, r: Value) -> Flow<Value> {
        match op {
            BinOp::Add if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) => {
                let text = format!("{}{}", self.stringify(&l)?, self.stringify(&r)?);
                Ok(Value::str(&text))
            }
            BinOp::Eq => Ok(Value::Bool(same(&l, &r))),
            BinOp::Ne => Ok(Value::Bool(!same(&l, &r))),
            BinOp::And => Ok(Value::Bool(l.as_bool() == Some(true) && r.as_bool() == Some(true))),
            BinOp::Or => Ok(Value::Bool(l.as_bool() == Some(true) || r.as_bool() == Some(true))),
            _ => self.arithmetic(op, &l, &r),
        }
    }

    fn arithmetic(&mut self, op: BinOp, l: &Value, r: &Value) -> Flow<Value> {
        if let (Value::Int(a), Value::Int(b)) = (l, r) {
            let (a, b) = (*a, *b);
            return Ok(match op {
                BinOp::Add => Value::Int(a.wrapping_add(b)),
                BinOp::Sub => Value::Int(a.wrapping_sub(b)),
                BinOp::Mul => Value::Int(a.wrapping_mul(b)),
                BinOp::Div | BinOp::Rem if b == 0 => {
                    return Err(self.fault("ArithmeticException", Some("/ by zero")))
                }
                BinOp::Div => Value::Int(a.wrapping_div(b)),
                BinOp::Rem => Value::Int(a.wrapping_rem(b)),
                cmp => Value::Bool(compare(cmp, a.cmp(&b))),
            });
        }
        if let (Some(a), Some(b)) = (l.as_long(), r.as_long()) {
            return Ok(match op {
                BinOp::Add => Value::Long(a.wrapping_add(b)),
                BinOp::Sub => Value::Long(a.wrapping_sub(b)),
                BinOp::Mul => Value::Long(a.wrapping_mul(b)),
                BinOp::Div | BinOp::Rem if b == 0 => {
                    return Err(self.fault("ArithmeticException", Some("/ by zero")))
                }
                BinOp::Div => Value::Long(a.wrapping_div(b)),
                BinOp::Rem => Value::Long(a.wrapping_rem(b)),
                cmp => Value::Bool(compare(cmp, a.cmp(&b))),
            });
        }
        let (Some(a), Some(b)) = (l.as_double(), r.as_double()) else {
            return Err(self.fault("NullPointerException", None));
        };
        Ok(match op {
            BinOp::Add => Value::Double(a + b),
            BinOp::Sub => Value::Double(a - b),
            BinOp::Mul => Value::Double(a * b),
            BinOp::Div => Value::Double(a / b),
            BinOp::Rem => Value::Double(a % b),
            cmp => Value::Bool(a.partial_cmp(&b).map_or(false, |ord| compare(cmp, ord))),
        })
    }
}

/// `==`: numeric comparison after promotion, identity for objects.
fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
        (Value::Int(x), Value::Int(y)) => x == y,
        _ => match (a.as_long(), b.as_long()) {
            (Some(x), Some(y)) => x == y,
            _ => match (a.as_double(), b.as_double()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        },
    }
}

impl ExecutionBackend for Interpreter {
    type Unit = Fragment;

    fn define(&mut self, snippet: &Snippet, unit: &Fragment, access: Access) {
        debug!(snippet = %snippet.id, ready = (access == Access::Ready), "define");
        let descriptor = snippet.descriptor();
        match &unit.item {
            Item::Type(decl) => {
                let replaced = self.types.get(&decl.name).map(|t| t.snippet) != Some(snippet.id);
                if replaced {
                    self.statics.remove(&decl.name);
                }
                self.types.insert(
                    decl.name.clone(),
                    TypeEntry {
                        snippet: snippet.id,
                        decl: decl.clone(),
                        source: unit.source.clone(),
                        access,
                        descriptor,
                    },
                );
            }
            Item::Method(decl) => {
                let params = decl.param_type_names();
                let entries = self.methods.entry(decl.name.clone()).or_default();
                entries.retain(|e| e.snippet != snippet.id && e.decl.param_type_names() != params);
                entries.push(MethodEntry {
                    snippet: snippet.id,
                    decl: decl.clone(),
                    source: unit.source.clone(),
                    access,
                    descriptor,
                });
            }
            Item::Import(decl) => {
                self.imports.retain(|(id, _)| *id != snippet.id);
                self.imports.push((snippet.id, decl.clone()));
            }
            Item::Var(_) | Item::Expr(_) => {
                let SnippetKind::Var {
                    name, type_name, ..
                } = &snippet.kind
                else {
                    return;
                };
                match self.globals.get_mut(name.0.as_str()) {
                    Some(g) if g.snippet == snippet.id && g.type_name == type_name.0 => {
                        g.access = access
                    }
                    _ => {
                        self.globals.insert(
                            name.to_string(),
                            Global {
                                snippet: snippet.id,
                                type_name: type_name.to_string(),
                                value: default_for(type_name),
                                access,
                                descriptor,
                            },
                        );
                    }
                }
            }
            Item::Stmt(_) => {}
        }
    }

    fn remove(&mut self, snippet: &Snippet, unit: &Fragment) {
        debug!(snippet = %snippet.id, "remove");
        match &unit.item {
            Item::Type(decl) => {
                if self.types.get(&decl.name).map(|t| t.snippet) == Some(snippet.id) {
                    self.types.remove(&decl.name);
                    self.statics.remove(&decl.name);
                }
            }
            Item::Method(decl) => {
                if let Some(entries) = self.methods.get_mut(&decl.name) {
                    entries.retain(|e| e.snippet != snippet.id);
                }
            }
            Item::Import(_) => self.imports.retain(|(id, _)| *id != snippet.id),
            Item::Var(_) | Item::Expr(_) => {
                if let Some(name) = snippet.name() {
                    if self.globals.get(name).map(|g| g.snippet) == Some(snippet.id) {
                        self.globals.remove(name);
                    }
                }
            }
            Item::Stmt(_) => {}
        }
    }

    fn run(&mut self, snippet: &Snippet, unit: &Fragment) -> ExecOutcome {
        if let Some(exit_code) = self.terminated {
            return ExecOutcome::Failed(ExecFailure::Terminated { exit_code });
        }
        trace!(snippet = %snippet.id, "run");
        self.stack_base = stack_address();
        self.stop.reset();
        self.frames.clear();
        self.frames.push(Frame {
            class: None,
            method: None,
            snippet: snippet.id,
            source: unit.source.clone(),
            offset: 0,
        });
        let result = self.run_item(snippet, unit);
        self.frames.clear();
        match result {
            Ok(value) => ExecOutcome::Completed { value },
            Err(unwind) => match self.failure(unwind) {
                Some(failure) => ExecOutcome::Failed(failure),
                None => ExecOutcome::Completed { value: None },
            },
        }
    }

    fn var_value(&mut self, snippet: &Snippet) -> ExecOutcome {
        if let Some(exit_code) = self.terminated {
            return ExecOutcome::Failed(ExecFailure::Terminated { exit_code });
        }
        let value = snippet
            .name()
            .and_then(|name| self.globals.get(name))
            .filter(|g| g.snippet == snippet.id)
            .map(|g| g.value.clone());
        let Some(value) = value else {
            return ExecOutcome::Completed { value: None };
        };
        self.stack_base = stack_address();
        match self.render(&value) {
            Ok(text) => ExecOutcome::Completed { value: Some(text) },
            Err(unwind) => match self.failure(unwind) {
                Some(failure) => ExecOutcome::Failed(failure),
                None => ExecOutcome::Completed { value: None },
            },
        }
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::events::SnippetEvent;
    use crate::lang::LangOracle;

    fn engine() -> (Engine<LangOracle, Interpreter>, OutputBuffer) {
        let out = OutputBuffer::new();
        let interp = Interpreter::new(Box::new(out.clone()), StopHandle::new());
        (Engine::new(LangOracle, interp), out)
    }

    fn value(events: &[SnippetEvent]) -> Option<String> {
        events[0].value.clone()
    }

    fn eval(engine: &mut Engine<LangOracle, Interpreter>, src: &str) -> Vec<SnippetEvent> {
        engine.eval(src).expect("engine open")
    }

    #[test]
    fn arithmetic_and_strings() {
        let (mut e, _) = engine();
        assert_eq!(value(&eval(&mut e, "1 + 2 * 3")).as_deref(), Some("7"));
        assert_eq!(value(&eval(&mut e, "7 / 2.0")).as_deref(), Some("3.5"));
        assert_eq!(value(&eval(&mut e, "\"a\" + 1 + 2")).as_deref(), Some("\"a12\""));
        assert_eq!(value(&eval(&mut e, "Integer.MAX_VALUE + 1")).as_deref(), Some("-2147483648"));
        assert_eq!(value(&eval(&mut e, "10L * 3")).as_deref(), Some("30"));
        assert_eq!(value(&eval(&mut e, "Math.max(3, 8)")).as_deref(), Some("8"));
    }

    #[test]
    fn variables_keep_declared_types() {
        let (mut e, _) = engine();
        assert_eq!(value(&eval(&mut e, "double d = 3")).as_deref(), Some("3.0"));
        assert_eq!(value(&eval(&mut e, "d += 1")).as_deref(), Some("4.0"));
        assert_eq!(value(&eval(&mut e, "int i")).as_deref(), Some("0"));
        assert_eq!(value(&eval(&mut e, "i++")).as_deref(), Some("0"));
        assert_eq!(value(&eval(&mut e, "i")).as_deref(), Some("1"));
    }

    #[test]
    fn methods_loops_and_output() {
        let (mut e, out) = engine();
        eval(&mut e, "int fib(int n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }");
        assert_eq!(value(&eval(&mut e, "fib(15)")).as_deref(), Some("610"));
        eval(&mut e, "for (int i = 0; i < 3; i++) { if (i == 1) continue; System.out.println(i); }");
        assert_eq!(out.take(), "0\n2\n");
        eval(&mut e, "int k = 0");
        eval(&mut e, "while (true) { k++; if (k > 4) break; }");
        assert_eq!(value(&eval(&mut e, "k")).as_deref(), Some("5"));
        eval(&mut e, "System.out.print(\"x\" + fib(5))");
        assert_eq!(out.take(), "x5");
    }

    #[test]
    fn classes_fields_and_dispatch() {
        let (mut e, _) = engine();
        eval(&mut e, "interface Shape { double area(); }");
        eval(&mut e, "class Sq implements Shape { double s; Sq(double s) { this.s = s; } public double area() { return s * s; } public String toString() { return \"Sq(\" + s + \")\"; } }");
        assert_eq!(value(&eval(&mut e, "Shape q = new Sq(3)")).as_deref(), Some("Sq(3.0)"));
        assert_eq!(value(&eval(&mut e, "q.area()")).as_deref(), Some("9.0"));
        assert_eq!(value(&eval(&mut e, "q instanceof Sq")).as_deref(), Some("true"));
    }

    #[test]
    fn records_and_enums() {
        let (mut e, _) = engine();
        eval(&mut e, "record Point(int x, int y) {}");
        assert_eq!(value(&eval(&mut e, "new Point(1, 2)")).as_deref(), Some("Point[x=1, y=2]"));
        assert_eq!(value(&eval(&mut e, "new Point(1, 2).y()")).as_deref(), Some("2"));
        assert_eq!(value(&eval(&mut e, "new Point(1, 2).equals(new Point(1, 2))")).as_deref(), Some("true"));
        eval(&mut e, "enum Color { RED, GREEN }");
        assert_eq!(value(&eval(&mut e, "Color.GREEN")).as_deref(), Some("GREEN"));
        assert_eq!(value(&eval(&mut e, "Color.GREEN.ordinal()")).as_deref(), Some("1"));
        assert_eq!(value(&eval(&mut e, "Color.RED == Color.RED")).as_deref(), Some("true"));
    }

    #[test]
    fn static_state_persists_between_calls() {
        let (mut e, _) = engine();
        eval(&mut e, "class Counter { static int n = 10; static int next() { return ++n; } }");
        eval(&mut e, "Counter.next()");
        assert_eq!(value(&eval(&mut e, "Counter.next()")).as_deref(), Some("12"));
        assert_eq!(value(&eval(&mut e, "Counter.n")).as_deref(), Some("12"));
    }

    #[test]
    fn exceptions_carry_frames() {
        let (mut e, _) = engine();
        eval(&mut e, "int div(int a, int b) {\n  return a / b;\n}");
        let events = eval(&mut e, "div(1, 0)");
        let Some(ExecFailure::Exception(ex)) = &events[0].exception else {
            panic!("expected an exception, got {:?}", events[0].exception);
        };
        assert_eq!(ex.class_name, "java.lang.ArithmeticException");
        assert_eq!(ex.message.as_deref(), Some("/ by zero"));
        let frames: Vec<String> = ex.frames.iter().map(ToString::to_string).collect();
        assert_eq!(frames, vec!["at div (#1:2)", "at (#2:1)"]);
    }

    #[test]
    fn user_exceptions_are_caught_by_supertype() {
        let (mut e, out) = engine();
        eval(&mut e, "class Oops extends IllegalStateException { Oops(String m) { super(m); } }");
        eval(&mut e, "try { throw new Oops(\"bad\"); } catch (RuntimeException x) { System.out.println(x.getMessage()); } finally { System.out.println(\"done\"); }");
        assert_eq!(out.take(), "bad\ndone\n");
        let events = eval(&mut e, "throw new Oops(\"worse\");");
        let Some(ExecFailure::Exception(ex)) = &events[0].exception else {
            panic!("expected an exception");
        };
        assert_eq!(ex.to_string(), "Oops: worse");
    }

    #[test]
    fn null_receivers_throw() {
        let (mut e, _) = engine();
        eval(&mut e, "String s = null");
        let events = eval(&mut e, "s.length()");
        assert!(matches!(
            &events[0].exception,
            Some(ExecFailure::Exception(ex)) if ex.class_name == "java.lang.NullPointerException"
        ));
    }

    #[test]
    fn exit_terminates() {
        let (mut e, _) = engine();
        let events = eval(&mut e, "System.exit(4)");
        assert_eq!(
            events[0].exception,
            Some(ExecFailure::Terminated { exit_code: 4 })
        );
        assert!(e.is_closed());
    }

    #[test]
    fn stack_budget_bounds_recursion() {
        let out = OutputBuffer::new();
        let interp =
            Interpreter::new(Box::new(out), StopHandle::new()).with_stack_budget(256 * 1024);
        let mut e = Engine::new(LangOracle, interp);
        eval(&mut e, "int depth(int n) { return n <= 0 ? 0 : 1 + depth(n - 1); }");
        assert_eq!(value(&eval(&mut e, "depth(5)")).as_deref(), Some("5"));
        let events = eval(&mut e, "depth(100000)");
        assert!(matches!(
            &events[0].exception,
            Some(ExecFailure::Exception(ex)) if ex.class_name == "java.lang.StackOverflowError"
        ));
        assert_eq!(value(&eval(&mut e, "depth(3)")).as_deref(), Some("3"));
    }

    #[test]
    fn output_buffer_take_empties() {
        let mut out = OutputBuffer::new();
        out.write_all(b"hi").unwrap();
        assert_eq!(out.take(), "hi");
        assert_eq!(out.take(), "");
    }
}
