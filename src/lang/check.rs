//! Static checking of one unit against the live environment.
//!
//! Produces the engine's [`CompileReport`]: what the unit defines and
//! references, which references are unresolved (and in which scope), the
//! hard diagnostics, the canonical signature and the final classification.

use std::collections::{HashMap, HashSet};

use crate::error::{Diag, Span};
use crate::lang::ast::*;
use crate::lang::env::Env;
use crate::lang::types::{
    instance_methods, is_throwable_library, library_qualified, is_library_package, promote,
    static_field, static_methods, LibraryClass, LibraryMethod, Type,
};
use crate::names::{SnippetId, SymbolRef, TypeName};
use crate::oracle::{CompileReport, CompileRequest, Scope, Unresolved};
use crate::snippet::{SnippetKind, SubKind};

pub(crate) fn compile(request: &CompileRequest<'_, Fragment>) -> CompileReport {
    let mut checker = Checker::new(request);
    let fragment = request.unit;
    let (kind, signature) = match &fragment.item {
        Item::Import(i) => checker.import(i),
        Item::Type(decl) => checker.type_decl(decl),
        Item::Method(m) => checker.top_method(m),
        Item::Var(v) => checker.top_var(v),
        Item::Stmt(s) => {
            let mut ctx = Ctx::top_level();
            checker.stmt(s, &mut ctx);
            (SnippetKind::Statement, String::new())
        }
        Item::Expr(e) => checker.top_expr(e, request.id),
    };
    let mut references = checker.references;
    if !kind.is_declaration() {
        references.clear();
    }
    CompileReport {
        defines: defines_of(&kind, &fragment.item),
        kind,
        references,
        unresolved: checker.unresolved,
        diagnostics: checker.diagnostics,
        signature,
    }
}

/// The classification a unit has before it is checked.
pub(crate) fn preliminary_kind(item: &Item) -> SnippetKind {
    match item {
        Item::Import(i) => SnippetKind::Import {
            target: i.target(),
            is_static: i.is_static,
            on_demand: i.on_demand,
        },
        Item::Type(decl) => SnippetKind::TypeDecl {
            name: decl.name.as_str().into(),
            sub: type_sub_kind(decl.kind),
        },
        Item::Method(m) => method_kind(m),
        Item::Var(v) => SnippetKind::Var {
            name: v.name.as_str().into(),
            type_name: v.ty.name.as_str().into(),
            sub: var_sub_kind(v),
        },
        Item::Expr(_) => SnippetKind::Expression {
            name: "".into(),
            type_name: "".into(),
            sub: SubKind::TempVarExpression,
        },
        Item::Stmt(_) => SnippetKind::Statement,
    }
}

fn type_sub_kind(kind: TypeKind) -> SubKind {
    match kind {
        TypeKind::Class => SubKind::Class,
        TypeKind::Interface => SubKind::Interface,
        TypeKind::Enum => SubKind::Enum,
        TypeKind::Annotation => SubKind::Annotation,
        TypeKind::Record => SubKind::Record,
    }
}

fn var_sub_kind(v: &VarDecl) -> SubKind {
    if v.init.is_some() {
        SubKind::VarDeclarationWithInitializer
    } else {
        SubKind::VarDeclaration
    }
}

fn method_kind(m: &MethodDecl) -> SnippetKind {
    SnippetKind::Method {
        name: m.name.as_str().into(),
        params: m.param_type_names().into_iter().map(TypeName::from).collect(),
        return_type: m.ret.name.as_str().into(),
    }
}

fn defines_of(kind: &SnippetKind, item: &Item) -> Vec<SymbolRef> {
    match (kind, item) {
        (SnippetKind::TypeDecl { name, .. }, _) => vec![SymbolRef::ty(name)],
        (SnippetKind::Method { name, params, .. }, _) => vec![SymbolRef::method(name, params)],
        (SnippetKind::Var { name, .. }, _) => vec![SymbolRef::variable(name)],
        (SnippetKind::Import { .. }, Item::Import(i)) => import_defines(i),
        _ => Vec::new(),
    }
}

/// Library names an import brings into scope, so that snippets waiting on
/// them are revisited when it arrives.
fn import_defines(i: &ImportDecl) -> Vec<SymbolRef> {
    if i.is_static {
        let (class, member) = if i.on_demand {
            (i.path.as_str(), None)
        } else {
            match i.path.rsplit_once('.') {
                Some((c, m)) => (c, Some(m)),
                None => return Vec::new(),
            }
        };
        let Some(lib) = library_qualified(class) else {
            return Vec::new();
        };
        static_methods(lib.name)
            .iter()
            .filter(|m| member.map_or(true, |n| n == m.name))
            .map(|m| SymbolRef::method(m.name, m.params))
            .collect()
    } else if i.on_demand {
        crate::lang::types::library_package(&i.path)
            .map(|c| SymbolRef::ty(c.name))
            .collect()
    } else {
        library_qualified(&i.path)
            .map(|c| vec![SymbolRef::ty(c.name)])
            .unwrap_or_default()
    }
}

// ── Signatures ────────────────────────────────────────────────────────────

fn params_signature(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| p.ty.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn method_signature(m: &MethodDecl) -> String {
    let mut s = String::new();
    for (modifier, _) in &m.modifiers.0 {
        if matches!(modifier, Modifier::Static | Modifier::Abstract | Modifier::Default) {
            s.push_str(modifier.as_str());
            s.push(' ');
        }
    }
    s.push_str(&format!("{} {}({})", m.ret.name, m.name, params_signature(&m.params)));
    s
}

fn type_signature(decl: &TypeDecl) -> String {
    let names = |ts: &[TypeRef]| ts.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(",");
    let mut s = format!("{} {}", decl.kind.keyword(), decl.name);
    if decl.kind == TypeKind::Record {
        s.push_str(&format!("({})", params_signature(&decl.components)));
    }
    if !decl.extends.is_empty() {
        s.push_str(&format!(" extends {}", names(&decl.extends)));
    }
    if !decl.implements.is_empty() {
        s.push_str(&format!(" implements {}", names(&decl.implements)));
    }
    s.push_str(" {");
    let constants: Vec<&str> = decl.constants.iter().map(|(c, _)| c.as_str()).collect();
    if !constants.is_empty() {
        s.push_str(&format!(" {};", constants.join(",")));
    }
    for member in &decl.members {
        s.push(' ');
        match member {
            Member::Field(f) => {
                if f.modifiers.has(Modifier::Static) {
                    s.push_str("static ");
                }
                s.push_str(&format!("{} {};", f.ty.name, f.name));
            }
            Member::Method(m) => {
                s.push_str(&method_signature(m));
                s.push(';');
            }
            Member::Constructor(c) => {
                s.push_str(&format!("{}({});", c.name, params_signature(&c.params)));
            }
        }
    }
    s.push_str(" }");
    s
}

// ── Control flow ──────────────────────────────────────────────────────────

fn block_completes(stmts: &[Stmt]) -> bool {
    stmts.last().map_or(true, stmt_completes)
}

fn stmt_completes(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } | Stmt::Throw { .. } => false,
        Stmt::Block(b) => block_completes(&b.stmts),
        Stmt::If {
            then, els: Some(e), ..
        } => stmt_completes(then) || stmt_completes(e),
        Stmt::While {
            cond: Expr::Bool { value: true, .. },
            body,
            ..
        } => breaks_out(body),
        Stmt::For {
            cond: None, body, ..
        } => breaks_out(body),
        Stmt::DoWhile { body, .. } => stmt_completes(body) || breaks_out(body),
        Stmt::Try {
            body,
            catches,
            finally,
            ..
        } => {
            finally.as_ref().map_or(true, |f| block_completes(&f.stmts))
                && (block_completes(&body.stmts)
                    || catches.iter().any(|c| block_completes(&c.body.stmts)))
        }
        _ => true,
    }
}

/// Does `stmt` contain a `break` that exits the loop it is the body of?
fn breaks_out(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Break(_) => true,
        Stmt::Block(b) => b.stmts.iter().any(breaks_out),
        Stmt::If { then, els, .. } => breaks_out(then) || els.as_deref().map_or(false, breaks_out),
        Stmt::Try {
            body,
            catches,
            finally,
            ..
        } => {
            body.stmts.iter().any(breaks_out)
                || catches.iter().any(|c| c.body.stmts.iter().any(breaks_out))
                || finally.as_ref().map_or(false, |f| f.stmts.iter().any(breaks_out))
        }
        _ => false,
    }
}

// ── Checking context ──────────────────────────────────────────────────────

struct Ctx<'a> {
    scopes: Vec<HashMap<String, Type>>,
    class: Option<&'a TypeDecl>,
    is_static: bool,
    in_ctor: bool,
    /// `None` outside any method: top-level statements and initializers.
    ret: Option<Type>,
    loops: usize,
    /// The top-level variable whose initializer is being checked.
    initializing: Option<&'a str>,
}

impl<'a> Ctx<'a> {
    fn top_level() -> Self {
        Ctx {
            scopes: vec![HashMap::new()],
            class: None,
            is_static: false,
            in_ctor: false,
            ret: None,
            loops: 0,
            initializing: None,
        }
    }

    fn member(class: Option<&'a TypeDecl>, is_static: bool, ret: Option<Type>) -> Self {
        Ctx {
            class,
            is_static,
            ret,
            ..Ctx::top_level()
        }
    }

    fn local(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    /// Returns false when the name is already a local in this body.
    fn declare(&mut self, name: &str, ty: Type) -> bool {
        if self.local(name).is_some() {
            return false;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
        true
    }

    fn push(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }
}

/// What a dotted prefix like `Math` or `Shape` names.
enum Qualifier<'a> {
    User(&'a TypeDecl),
    Library(&'static LibraryClass),
    Missing,
}

struct Checker<'a> {
    env: Env<'a>,
    own: Vec<SymbolRef>,
    corral: bool,
    scope: Scope,
    references: Vec<SymbolRef>,
    unresolved: Vec<Unresolved>,
    diagnostics: Vec<Diag>,
}

impl<'a> Checker<'a> {
    fn new(request: &CompileRequest<'a, Fragment>) -> Self {
        let item = &request.unit.item;
        Checker {
            env: Env::new(request),
            own: defines_of(&preliminary_kind(item), item),
            corral: matches!(item, Item::Type(_) | Item::Method(_) | Item::Var(_)),
            scope: Scope::Body,
            references: Vec::new(),
            unresolved: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, code: &str, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diag::error(code, span, message));
    }

    fn reference(&mut self, symbol: SymbolRef) {
        if !self.own.iter().any(|o| o.provides(&symbol)) {
            self.references.push(symbol);
        }
    }

    /// A name nothing defines. Declarations are corralled; anything else
    /// fails to compile.
    fn unresolved(&mut self, symbol: SymbolRef, span: Span) {
        if !self.corral {
            self.error(
                "cant.resolve.location",
                span,
                format!("cannot find symbol\n  symbol:   {}", symbol),
            );
            return;
        }
        self.references.push(symbol.clone());
        match self.unresolved.iter_mut().find(|u| u.symbol == symbol) {
            Some(existing) => {
                if self.scope == Scope::Shape {
                    existing.scope = Scope::Shape;
                }
            }
            None => self.unresolved.push(Unresolved {
                symbol,
                scope: self.scope,
            }),
        }
    }

    fn with_scope<T>(&mut self, scope: Scope, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = self.scope;
        self.scope = scope;
        let out = f(self);
        self.scope = saved;
        out
    }

    fn warn_top_level_modifiers(&mut self, modifiers: &Modifiers) {
        for (m, span) in &modifiers.0 {
            if matches!(
                m,
                Modifier::Public | Modifier::Protected | Modifier::Private | Modifier::Static
            ) {
                self.diagnostics.push(Diag::warning(
                    "modifier.ignored",
                    *span,
                    format!(
                        "Modifier '{}' not permitted in top-level declarations, ignored",
                        m.as_str()
                    ),
                ));
            }
        }
    }

    // ── Types ─────────────────────────────────────────────────────────────

    fn resolve_type(&mut self, ty: &TypeRef) -> Type {
        if let Some(t) = Type::builtin(&ty.name) {
            return t;
        }
        if ty.name.contains('.') {
            if let Some(lib) = library_qualified(&ty.name) {
                return Type::Class(lib.name.to_string());
            }
        }
        self.named_type(ty.simple_name(), ty.span)
    }

    fn named_type(&mut self, name: &str, span: Span) -> Type {
        if let Some(t) = self.env.user_type(name) {
            let defined = t.defined;
            let symbol = SymbolRef::ty(name);
            if defined {
                self.reference(symbol);
                return Type::Class(name.to_string());
            }
            self.unresolved(symbol, span);
            return Type::Unknown;
        }
        if let Some(lib) = self.env.library_type(name) {
            return Type::Class(lib.name.to_string());
        }
        self.unresolved(SymbolRef::ty(name), span);
        Type::Unknown
    }

    /// Resolve a type name without recording anything.
    fn quiet_type(&self, name: &str) -> Type {
        if let Some(t) = Type::builtin(name) {
            return t;
        }
        let simple = name.rsplit('.').next().unwrap_or(name);
        if self.env.user_type(simple).is_some() || self.env.library_type(simple).is_some() {
            Type::Class(simple.to_string())
        } else if library_qualified(name).is_some() {
            Type::Class(simple.to_string())
        } else {
            Type::Unknown
        }
    }

    fn assignable(&self, from: &Type, to: &Type) -> bool {
        match (from, to) {
            (Type::Unknown, _) | (_, Type::Unknown) => true,
            (a, b) if a == b => true,
            (Type::Int, Type::Long | Type::Double) | (Type::Long, Type::Double) => true,
            (Type::Null, Type::Str | Type::Class(_)) => true,
            (Type::Str, Type::Class(c)) => {
                matches!(c.as_str(), "Object" | "CharSequence" | "Comparable")
            }
            (p, Type::Class(c)) if p.is_primitive() => {
                c == "Object"
                    || p.boxed() == Some(c.as_str())
                    || (c == "Number" && p.is_numeric())
                    || (c == "Comparable" && p.is_numeric())
            }
            (Type::Class(c), p) if p.is_primitive() => Type::unboxed(c)
                .map_or(false, |u| self.assignable(&u, p)),
            (Type::Class(a), Type::Class(b)) => self.env.is_subclass(a, b),
            _ => false,
        }
    }

    fn expect_assignable(&mut self, from: &Type, to: &Type, span: Span) {
        if *from == Type::Void {
            self.error("void.not.allowed", span, "'void' type not allowed here");
        } else if !self.assignable(from, to) {
            self.error(
                "prob.found.req",
                span,
                format!("incompatible types: {} cannot be converted to {}", from, to),
            );
        }
    }

    fn require_value(&mut self, ty: &Type, span: Span) {
        if *ty == Type::Void {
            self.error("void.not.allowed", span, "'void' type not allowed here");
        }
    }

    fn applicable(&self, params: &[Type], args: &[Type]) -> bool {
        params.len() == args.len() && args.iter().zip(params).all(|(a, p)| self.assignable(a, p))
    }

    fn param_types(&self, params: &[Param]) -> Vec<Type> {
        params.iter().map(|p| self.quiet_type(&p.ty.name)).collect()
    }

    fn arg_names(args: &[Type]) -> Vec<String> {
        args.iter().map(|t| t.to_string()).collect()
    }

    // ── Items ─────────────────────────────────────────────────────────────

    fn import(&mut self, i: &ImportDecl) -> (SnippetKind, String) {
        let kind = preliminary_kind(&Item::Import(i.clone()));
        let signature = match &kind {
            SnippetKind::Import {
                target, is_static, ..
            } => format!("import {}{}", if *is_static { "static " } else { "" }, target),
            _ => String::new(),
        };
        let class_path = if i.is_static && !i.on_demand {
            i.path.rsplit_once('.').map(|(c, _)| c).unwrap_or(&i.path)
        } else {
            i.path.as_str()
        };
        if i.is_static {
            match library_qualified(class_path) {
                Some(lib) => {
                    if !i.on_demand {
                        let member = i.path.rsplit('.').next().unwrap_or_default();
                        let known = static_methods(lib.name).iter().any(|m| m.name == member)
                            || static_field(lib.name, member).is_some();
                        if !known {
                            self.error(
                                "cant.resolve.location",
                                i.span,
                                format!(
                                    "cannot find symbol\n  symbol:   static {}\n  location: class {}",
                                    member, lib.name
                                ),
                            );
                        }
                    }
                }
                None => self.missing_import(class_path, i.span),
            }
        } else if i.on_demand {
            if !is_library_package(&i.path) && library_qualified(&i.path).is_none() {
                self.error(
                    "doesnt.exist",
                    i.span,
                    format!("package {} does not exist", i.path),
                );
            }
        } else if library_qualified(&i.path).is_none() {
            self.missing_import(&i.path, i.span);
        }
        (kind, signature)
    }

    fn missing_import(&mut self, path: &str, span: Span) {
        match path.rsplit_once('.') {
            Some((pkg, name)) if is_library_package(pkg) => self.error(
                "cant.resolve.location",
                span,
                format!(
                    "cannot find symbol\n  symbol:   class {}\n  location: package {}",
                    name, pkg
                ),
            ),
            Some((pkg, _)) => self.error(
                "doesnt.exist",
                span,
                format!("package {} does not exist", pkg),
            ),
            None => self.error(
                "doesnt.exist",
                span,
                format!("package {} does not exist", path),
            ),
        }
    }

    fn type_decl(&mut self, decl: &'a TypeDecl) -> (SnippetKind, String) {
        self.warn_top_level_modifiers(&decl.modifiers);
        let kind = SnippetKind::TypeDecl {
            name: decl.name.as_str().into(),
            sub: type_sub_kind(decl.kind),
        };
        let signature = type_signature(decl);

        if self.env.is_cyclic(decl) {
            self.error(
                "cyclic.inheritance",
                decl.name_span,
                format!("cyclic inheritance involving {}", decl.name),
            );
            return (kind, signature);
        }

        self.with_scope(Scope::Shape, |c| c.supertypes(decl));

        let mut fields = HashSet::new();
        let mut methods = HashSet::new();
        for comp in &decl.components {
            self.with_scope(Scope::Shape, |c| c.resolve_type(&comp.ty));
            if !fields.insert(comp.name.as_str()) {
                self.already_defined("variable", &comp.name, &decl.name, comp.span);
            }
        }
        for member in &decl.members {
            match member {
                Member::Field(f) => {
                    if !fields.insert(f.name.as_str()) {
                        self.already_defined("variable", &f.name, &decl.name, f.name_span);
                    }
                    self.field(decl, f);
                }
                Member::Method(m) => {
                    if !methods.insert((m.name.as_str(), m.param_type_names())) {
                        let descriptor =
                            format!("{}({})", m.name, m.param_type_names().join(","));
                        self.already_defined("method", &descriptor, &decl.name, m.name_span);
                    }
                    self.member_method(decl, m);
                }
                Member::Constructor(ctor) => self.constructor(decl, ctor),
            }
        }
        (kind, signature)
    }

    fn already_defined(&mut self, what: &str, name: &str, class: &str, span: Span) {
        self.error(
            "already.defined",
            span,
            format!("{} {} is already defined in class {}", what, name, class),
        );
    }

    fn supertypes(&mut self, decl: &TypeDecl) {
        let is_interface = decl.kind == TypeKind::Interface;
        for sup in &decl.extends {
            let ty = self.resolve_type(sup);
            let Type::Class(name) = ty else { continue };
            let sup_is_interface = self.is_interface(&name);
            if is_interface && !sup_is_interface {
                self.error("intf.expected.here", sup.span, "interface expected here");
            } else if !is_interface && sup_is_interface {
                self.error("no.intf.expected.here", sup.span, "no interface expected here");
            } else if !is_interface && self.env.user_type(&name).is_none() {
                let extendable = name == "Object" || is_throwable_library(&name);
                if !extendable {
                    self.error(
                        "library.opaque",
                        sup.span,
                        format!("cannot inherit from library class {}", name),
                    );
                }
            }
        }
        for sup in &decl.implements {
            if let Type::Class(name) = self.resolve_type(sup) {
                if self.env.user_type(&name).is_some() && !self.is_interface(&name) {
                    self.error("intf.expected.here", sup.span, "interface expected here");
                }
            }
        }
    }

    fn is_interface(&self, name: &str) -> bool {
        match self.env.user_type(name) {
            Some(t) => matches!(t.decl.kind, TypeKind::Interface | TypeKind::Annotation),
            None => matches!(
                name,
                "Runnable" | "Comparable" | "CharSequence" | "Iterable" | "List" | "Map" | "Set"
            ) || crate::lang::types::library_class(name)
                .map_or(false, |c| c.package == "java.util.function"),
        }
    }

    fn field(&mut self, decl: &'a TypeDecl, f: &'a VarDecl) {
        let ty = self.with_scope(Scope::Shape, |c| c.resolve_type(&f.ty));
        if let Some(init) = &f.init {
            let mut ctx = Ctx::member(Some(decl), f.modifiers.has(Modifier::Static), None);
            let found = self.expr(init, &mut ctx);
            self.expect_assignable(&found, &ty, init.span());
        }
    }

    fn member_method(&mut self, decl: &'a TypeDecl, m: &'a MethodDecl) {
        let ret = self.with_scope(Scope::Shape, |c| c.resolve_type(&m.ret));
        let params = self.with_scope(Scope::Shape, |c| {
            m.params
                .iter()
                .map(|p| c.resolve_type(&p.ty))
                .collect::<Vec<_>>()
        });
        let in_interface = decl.kind == TypeKind::Interface || decl.kind == TypeKind::Annotation;
        match &m.body {
            None if in_interface || m.modifiers.has(Modifier::Abstract) => {}
            None => self.error(
                "missing.meth.body.or.decl.abstract",
                m.name_span,
                "missing method body, or declare abstract",
            ),
            Some(body) => {
                let mut ctx = Ctx::member(Some(decl), m.is_static(), Some(ret));
                self.body(m, &params, body, &mut ctx);
            }
        }
    }

    fn constructor(&mut self, decl: &'a TypeDecl, ctor: &'a ConstructorDecl) {
        if ctor.name != decl.name {
            self.error(
                "invalid.meth.decl.ret.type.req",
                ctor.span,
                "invalid method declaration; return type required",
            );
            return;
        }
        let params = self.with_scope(Scope::Shape, |c| {
            ctor.params
                .iter()
                .map(|p| c.resolve_type(&p.ty))
                .collect::<Vec<_>>()
        });
        let mut ctx = Ctx::member(Some(decl), false, Some(Type::Void));
        ctx.in_ctor = true;
        for (p, ty) in ctor.params.iter().zip(params) {
            if !ctx.declare(&p.name, ty) {
                self.local_defined(&p.name, &ctor.name, p.span);
            }
        }
        for stmt in &ctor.body.stmts {
            self.stmt(stmt, &mut ctx);
        }
    }

    fn body(&mut self, m: &'a MethodDecl, params: &[Type], body: &'a Block, ctx: &mut Ctx<'a>) {
        for (p, ty) in m.params.iter().zip(params) {
            if !ctx.declare(&p.name, ty.clone()) {
                self.local_defined(&p.name, &m.name, p.span);
            }
        }
        for stmt in &body.stmts {
            self.stmt(stmt, ctx);
        }
        if !m.ret.is_void() && block_completes(&body.stmts) {
            self.error("missing.ret.stmt", (body.span.1.saturating_sub(1), body.span.1), "missing return statement");
        }
    }

    fn local_defined(&mut self, name: &str, method: &str, span: Span) {
        self.error(
            "already.defined",
            span,
            format!("variable {} is already defined in method {}", name, method),
        );
    }

    fn top_method(&mut self, m: &'a MethodDecl) -> (SnippetKind, String) {
        self.warn_top_level_modifiers(&m.modifiers);
        let kind = method_kind(m);
        let signature = method_signature(m);
        let ret = self.with_scope(Scope::Shape, |c| c.resolve_type(&m.ret));
        let params = self.with_scope(Scope::Shape, |c| {
            m.params
                .iter()
                .map(|p| c.resolve_type(&p.ty))
                .collect::<Vec<_>>()
        });
        match &m.body {
            Some(body) => {
                let mut ctx = Ctx::member(None, false, Some(ret));
                self.body(m, &params, body, &mut ctx);
            }
            None => self.error(
                "missing.meth.body.or.decl.abstract",
                m.name_span,
                "missing method body, or declare abstract",
            ),
        }
        (kind, signature)
    }

    fn top_var(&mut self, v: &'a VarDecl) -> (SnippetKind, String) {
        self.warn_top_level_modifiers(&v.modifiers);
        let mut ctx = Ctx::top_level();
        ctx.initializing = Some(v.name.as_str());
        let ty = if v.ty.is_var() {
            match &v.init {
                Some(init) => {
                    let found = self.with_scope(Scope::Shape, |c| c.expr(init, &mut ctx));
                    match found {
                        Type::Null => {
                            self.error(
                                "cant.infer.local.var.type",
                                v.name_span,
                                format!(
                                    "cannot infer type for local variable {}\n  (variable initializer is 'null')",
                                    v.name
                                ),
                            );
                            Type::Unknown
                        }
                        Type::Void => {
                            self.error(
                                "cant.infer.local.var.type",
                                v.name_span,
                                format!(
                                    "cannot infer type for local variable {}\n  (variable initializer is 'void')",
                                    v.name
                                ),
                            );
                            Type::Unknown
                        }
                        other => other,
                    }
                }
                None => {
                    self.error(
                        "cant.infer.local.var.type",
                        v.name_span,
                        format!(
                            "cannot infer type for local variable {}\n  (cannot use 'var' on variable without initializer)",
                            v.name
                        ),
                    );
                    Type::Unknown
                }
            }
        } else {
            let declared = self.with_scope(Scope::Shape, |c| c.resolve_type(&v.ty));
            if declared == Type::Void {
                self.error("void.not.allowed", v.ty.span, "'void' type not allowed here");
            }
            if let Some(init) = &v.init {
                let found = self.expr(init, &mut ctx);
                self.expect_assignable(&found, &declared, init.span());
            }
            declared
        };
        let type_name = if v.ty.is_var() {
            ty.to_string()
        } else {
            v.ty.name.clone()
        };
        let signature = format!("{} {}", type_name, v.name);
        let kind = SnippetKind::Var {
            name: v.name.as_str().into(),
            type_name: type_name.into(),
            sub: var_sub_kind(v),
        };
        (kind, signature)
    }

    fn top_expr(&mut self, e: &'a Expr, id: SnippetId) -> (SnippetKind, String) {
        let mut ctx = Ctx::top_level();
        let ty = self.expr(e, &mut ctx);
        if ty == Type::Void {
            return (SnippetKind::Statement, String::new());
        }
        match e {
            Expr::Name { name, .. } if self.env.var_type(name).is_some() => (
                SnippetKind::Expression {
                    name: name.as_str().into(),
                    type_name: ty.to_string().into(),
                    sub: SubKind::VarValue,
                },
                String::new(),
            ),
            Expr::Assign { target, .. } if matches!(**target, Expr::Name { .. }) => {
                let name = match &**target {
                    Expr::Name { name, .. } => name.as_str(),
                    _ => "",
                };
                (
                    SnippetKind::Expression {
                        name: name.into(),
                        type_name: ty.to_string().into(),
                        sub: SubKind::Assignment,
                    },
                    String::new(),
                )
            }
            _ => {
                let name = format!("${}", id);
                let signature = format!("{} {}", ty, name);
                (
                    SnippetKind::Var {
                        name: name.into(),
                        type_name: ty.to_string().into(),
                        sub: SubKind::TempVarExpression,
                    },
                    signature,
                )
            }
        }
    }

    // ── Statements ────────────────────────────────────────────────────────

    fn block(&mut self, block: &'a Block, ctx: &mut Ctx<'a>) {
        ctx.push();
        for stmt in &block.stmts {
            self.stmt(stmt, ctx);
        }
        ctx.pop();
    }

    fn condition(&mut self, cond: &'a Expr, ctx: &mut Ctx<'a>) {
        let ty = self.expr(cond, ctx);
        self.expect_assignable(&ty, &Type::Boolean, cond.span());
    }

    fn stmt(&mut self, stmt: &'a Stmt, ctx: &mut Ctx<'a>) {
        match stmt {
            Stmt::Block(b) => self.block(b, ctx),
            Stmt::Local(v) => self.local(v, ctx),
            Stmt::Expr(e) => {
                if !e.is_statement_expression() {
                    self.error("not.stmt", e.span(), "not a statement");
                }
                self.expr(e, ctx);
            }
            Stmt::If {
                cond, then, els, ..
            } => {
                self.condition(cond, ctx);
                self.nested(then, ctx);
                if let Some(e) = els {
                    self.nested(e, ctx);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.condition(cond, ctx);
                ctx.loops += 1;
                self.nested(body, ctx);
                ctx.loops -= 1;
            }
            Stmt::DoWhile { body, cond, .. } => {
                ctx.loops += 1;
                self.nested(body, ctx);
                ctx.loops -= 1;
                self.condition(cond, ctx);
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                ctx.push();
                if let Some(init) = init {
                    self.stmt(init, ctx);
                }
                if let Some(cond) = cond {
                    self.condition(cond, ctx);
                }
                for u in update {
                    self.expr(u, ctx);
                }
                ctx.loops += 1;
                self.nested(body, ctx);
                ctx.loops -= 1;
                ctx.pop();
            }
            Stmt::Return { value, span } => self.return_stmt(value.as_ref(), *span, ctx),
            Stmt::Throw { value, .. } => {
                let ty = self.expr(value, ctx);
                let throwable = match &ty {
                    Type::Class(c) => self.env.is_subclass(c, "Throwable"),
                    Type::Unknown => true,
                    _ => false,
                };
                if !throwable {
                    self.error(
                        "prob.found.req",
                        value.span(),
                        format!("incompatible types: {} cannot be converted to Throwable", ty),
                    );
                }
            }
            Stmt::Try {
                body,
                catches,
                finally,
                ..
            } => {
                self.block(body, ctx);
                for catch in catches {
                    ctx.push();
                    let types: Vec<Type> =
                        catch.types.iter().map(|t| self.resolve_type(t)).collect();
                    let ty = match types.as_slice() {
                        [one] => one.clone(),
                        _ => Type::Class("Throwable".into()),
                    };
                    ctx.declare(&catch.name, ty);
                    for s in &catch.body.stmts {
                        self.stmt(s, ctx);
                    }
                    ctx.pop();
                }
                if let Some(f) = finally {
                    self.block(f, ctx);
                }
            }
            Stmt::SuperCall { args, span } => {
                if !ctx.in_ctor {
                    self.error(
                        "call.must.be.first.stmt.in.ctor",
                        *span,
                        "call to super must be first statement in constructor",
                    );
                }
                for a in args {
                    let t = self.expr(a, ctx);
                    self.require_value(&t, a.span());
                }
            }
            Stmt::Break(span) => {
                if ctx.loops == 0 {
                    self.error("break.outside.loop", *span, "break outside switch or loop");
                }
            }
            Stmt::Continue(span) => {
                if ctx.loops == 0 {
                    self.error("cont.outside.loop", *span, "continue outside of loop");
                }
            }
            Stmt::Empty(_) => {}
        }
    }

    /// A statement in its own scope, such as an `if` branch.
    fn nested(&mut self, stmt: &'a Stmt, ctx: &mut Ctx<'a>) {
        ctx.push();
        self.stmt(stmt, ctx);
        ctx.pop();
    }

    fn local(&mut self, v: &'a VarDecl, ctx: &mut Ctx<'a>) {
        let ty = if v.ty.is_var() {
            match &v.init {
                Some(init) => {
                    let t = self.expr(init, ctx);
                    if matches!(t, Type::Null | Type::Void) {
                        self.error(
                            "cant.infer.local.var.type",
                            v.name_span,
                            format!("cannot infer type for local variable {}", v.name),
                        );
                        Type::Unknown
                    } else {
                        t
                    }
                }
                None => {
                    self.error(
                        "cant.infer.local.var.type",
                        v.name_span,
                        format!("cannot infer type for local variable {}", v.name),
                    );
                    Type::Unknown
                }
            }
        } else {
            let declared = self.resolve_type(&v.ty);
            if let Some(init) = &v.init {
                let found = self.expr(init, ctx);
                self.expect_assignable(&found, &declared, init.span());
            }
            declared
        };
        if !ctx.declare(&v.name, ty) {
            let error = format!("variable {} is already defined", v.name);
            self.error("already.defined", v.name_span, error);
        }
    }

    fn return_stmt(&mut self, value: Option<&'a Expr>, span: Span, ctx: &mut Ctx<'a>) {
        let Some(ret) = ctx.ret.clone() else {
            self.error("ret.outside.meth", span, "return outside method");
            if let Some(v) = value {
                self.expr(v, ctx);
            }
            return;
        };
        match (value, ret) {
            (None, Type::Void) => {}
            (None, _) => self.error("prob.found.req", span, "missing return value"),
            (Some(v), Type::Void) => {
                self.expr(v, ctx);
                self.error(
                    "prob.found.req",
                    v.span(),
                    "incompatible types: unexpected return value",
                );
            }
            (Some(v), ret) => {
                let found = self.expr(v, ctx);
                self.expect_assignable(&found, &ret, v.span());
            }
        }
    }

    // ── Expressions ───────────────────────────────────────────────────────

    fn expr(&mut self, e: &'a Expr, ctx: &mut Ctx<'a>) -> Type {
        match e {
            Expr::Int { value, long, span } => {
                if *long {
                    Type::Long
                } else {
                    if *value > i64::from(i32::MAX) + 1 {
                        self.error("int.number.too.large", *span, format!("integer number too large: {}", value));
                    }
                    Type::Int
                }
            }
            Expr::Double { .. } => Type::Double,
            Expr::Str { .. } => Type::Str,
            Expr::Bool { .. } => Type::Boolean,
            Expr::Null(_) => Type::Null,
            Expr::This(span) => match ctx.class {
                Some(c) if !ctx.is_static => Type::Class(c.name.clone()),
                _ => {
                    self.error(
                        "non-static.cant.be.ref",
                        *span,
                        "non-static variable this cannot be referenced from a static context",
                    );
                    Type::Unknown
                }
            },
            Expr::Name { name, span } => self.name(name, *span, ctx),
            Expr::Field { target, name, span } => self.field_access(target, name, *span, ctx),
            Expr::Call {
                target,
                name,
                args,
                span,
            } => self.call(target.as_deref(), name, args, *span, ctx),
            Expr::New { ty, args, span } => self.new_object(ty, args, *span, ctx),
            Expr::Unary { op, expr, span } => {
                let t = self.expr(expr, ctx);
                match op {
                    UnaryOp::Neg if t.is_numeric() => t,
                    UnaryOp::Not if matches!(t, Type::Boolean | Type::Unknown) => Type::Boolean,
                    _ => {
                        let symbol = if *op == UnaryOp::Neg { "-" } else { "!" };
                        self.error(
                            "operator.cant.be.applied",
                            *span,
                            format!("bad operand type {} for unary operator '{}'", t, symbol),
                        );
                        Type::Unknown
                    }
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.expr(lhs, ctx);
                let r = self.expr(rhs, ctx);
                self.binary(*op, &l, &r, e.span())
            }
            Expr::Assign { op, target, value } => {
                let t = self.lvalue(target, ctx);
                let v = self.expr(value, ctx);
                match op {
                    None => self.expect_assignable(&v, &t, value.span()),
                    Some(op) => {
                        self.binary(*op, &t, &v, e.span());
                    }
                }
                t
            }
            Expr::IncDec { target, span, .. } => {
                let t = self.lvalue(target, ctx);
                if !t.is_numeric() {
                    self.error(
                        "operator.cant.be.applied",
                        *span,
                        format!("bad operand type {} for unary operator '++'", t),
                    );
                }
                t
            }
            Expr::Cond { cond, then, els } => {
                self.condition(cond, ctx);
                let a = self.expr(then, ctx);
                let b = self.expr(els, ctx);
                if a == b {
                    a
                } else if let Some(p) = promote(&a, &b) {
                    p
                } else if a == Type::Null {
                    b
                } else if b == Type::Null || b.is_unknown() {
                    a
                } else if a.is_unknown() {
                    b
                } else {
                    Type::Class("Object".into())
                }
            }
            Expr::InstanceOf { expr, ty } => {
                let t = self.expr(expr, ctx);
                if t.is_primitive() {
                    self.error(
                        "prob.found.req",
                        expr.span(),
                        format!("unexpected type\n  required: reference\n  found:    {}", t),
                    );
                }
                self.resolve_type(ty);
                Type::Boolean
            }
        }
    }

    fn binary(&mut self, op: BinOp, l: &Type, r: &Type, span: Span) -> Type {
        let result = match op {
            BinOp::Add if *l == Type::Str || *r == Type::Str => {
                (*l != Type::Void && *r != Type::Void).then_some(Type::Str)
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => promote(l, r),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => promote(l, r).map(|_| Type::Boolean),
            BinOp::Eq | BinOp::Ne => {
                let comparable = promote(l, r).is_some()
                    || (l == r && *l != Type::Void)
                    || l.is_unknown()
                    || r.is_unknown()
                    || (!l.is_primitive() && !r.is_primitive() && *l != Type::Void && *r != Type::Void);
                comparable.then_some(Type::Boolean)
            }
            BinOp::And | BinOp::Or => {
                let ok = |t: &Type| matches!(t, Type::Boolean | Type::Unknown);
                (ok(l) && ok(r)).then_some(Type::Boolean)
            }
        };
        match result {
            Some(t) => t,
            None => {
                self.error(
                    "operator.cant.be.applied",
                    span,
                    format!(
                        "bad operand types for binary operator '{}'\n  first type:  {}\n  second type: {}",
                        op.symbol(),
                        l,
                        r
                    ),
                );
                Type::Unknown
            }
        }
    }

    fn lvalue(&mut self, target: &'a Expr, ctx: &mut Ctx<'a>) -> Type {
        match target {
            Expr::Name { .. } | Expr::Field { .. } => self.expr(target, ctx),
            other => {
                self.expr(other, ctx);
                self.error(
                    "unexpected.type",
                    other.span(),
                    "unexpected type\n  required: variable\n  found:    value",
                );
                Type::Unknown
            }
        }
    }

    /// Is `name` a value (local, field or variable) rather than a type?
    fn is_value_name(&self, name: &str, ctx: &Ctx<'a>) -> bool {
        ctx.local(name).is_some()
            || ctx
                .class
                .map_or(false, |c| self.env.find_field(&c.name, name).is_some()
                    || self.env.is_enum_constant(&c.name, name))
            || self.env.var_type(name).is_some()
            || ctx.initializing == Some(name)
    }

    fn name(&mut self, name: &str, span: Span, ctx: &mut Ctx<'a>) -> Type {
        if let Some(t) = ctx.local(name) {
            return t.clone();
        }
        if let Some(class) = ctx.class {
            if let Some(field) = self.env.find_field(&class.name, name) {
                if ctx.is_static && !field.is_static {
                    self.error(
                        "non-static.cant.be.ref",
                        span,
                        format!(
                            "non-static variable {} cannot be referenced from a static context",
                            name
                        ),
                    );
                }
                return self.quiet_type(&field.ty.name);
            }
            if self.env.is_enum_constant(&class.name, name) {
                return Type::Class(class.name.clone());
            }
        }
        if ctx.initializing == Some(name) {
            self.error(
                "illegal.self.ref",
                span,
                "self-reference in initializer",
            );
            return Type::Unknown;
        }
        if let Some(type_name) = self.env.var_type(name) {
            self.reference(SymbolRef::variable(name));
            return self.quiet_type(type_name);
        }
        self.unresolved(SymbolRef::variable(name), span);
        Type::Unknown
    }

    /// Classify `Name` targets that denote a type rather than a value.
    fn qualifier(&mut self, target: &Expr, ctx: &Ctx<'a>) -> Option<Qualifier<'a>> {
        let Expr::Name { name, span } = target else {
            return None;
        };
        if self.is_value_name(name, ctx) {
            return None;
        }
        if let Some(t) = self.env.user_type(name) {
            let (decl, defined) = (t.decl, t.defined);
            if defined {
                self.reference(SymbolRef::ty(name));
                return Some(Qualifier::User(decl));
            }
            self.unresolved(SymbolRef::ty(name), *span);
            return Some(Qualifier::Missing);
        }
        if let Some(lib) = self.env.library_type(name) {
            return Some(Qualifier::Library(lib));
        }
        if name.starts_with(|c: char| c.is_ascii_uppercase()) {
            self.unresolved(SymbolRef::ty(name), *span);
            return Some(Qualifier::Missing);
        }
        None
    }

    fn field_access(&mut self, target: &'a Expr, name: &str, span: Span, ctx: &mut Ctx<'a>) -> Type {
        match self.qualifier(target, ctx) {
            Some(Qualifier::Missing) => return Type::Unknown,
            Some(Qualifier::User(decl)) => {
                if self.env.is_enum_constant(&decl.name, name) {
                    return Type::Class(decl.name.clone());
                }
                return match self.env.find_field(&decl.name, name) {
                    Some(f) if f.is_static => self.quiet_type(&f.ty.name),
                    Some(_) => {
                        self.error(
                            "non-static.cant.be.ref",
                            span,
                            format!(
                                "non-static variable {} cannot be referenced from a static context",
                                name
                            ),
                        );
                        Type::Unknown
                    }
                    None => self.no_member("variable", name, &decl.name, span),
                };
            }
            Some(Qualifier::Library(lib)) => {
                return match static_field(lib.name, name) {
                    Some(t) => t,
                    None => self.no_member("variable", name, lib.name, span),
                };
            }
            None => {}
        }
        let recv = self.expr(target, ctx);
        match &recv {
            Type::Unknown => Type::Unknown,
            Type::Class(c) if self.env.user_type(c).is_some() => {
                match self.env.find_field(c, name) {
                    Some(f) => self.quiet_type(&f.ty.name),
                    None => self.no_member("variable", name, c, span),
                }
            }
            Type::Class(c) => self.no_member("variable", name, c, span),
            other => {
                self.error(
                    "cant.deref",
                    span,
                    format!("{} cannot be dereferenced", other),
                );
                Type::Unknown
            }
        }
    }

    fn no_member(&mut self, what: &str, name: &str, class: &str, span: Span) -> Type {
        self.error(
            "cant.resolve.location",
            span,
            format!(
                "cannot find symbol\n  symbol:   {} {}\n  location: class {}",
                what, name, class
            ),
        );
        Type::Unknown
    }

    fn call(
        &mut self,
        target: Option<&'a Expr>,
        name: &str,
        args: &'a [Expr],
        span: Span,
        ctx: &mut Ctx<'a>,
    ) -> Type {
        let arg_types: Vec<Type> = args
            .iter()
            .map(|a| {
                let t = self.expr(a, ctx);
                self.require_value(&t, a.span());
                t
            })
            .collect();
        let Some(target) = target else {
            return self.unqualified_call(name, &arg_types, span, ctx);
        };
        match self.qualifier(target, ctx) {
            Some(Qualifier::Missing) => Type::Unknown,
            Some(Qualifier::User(decl)) => self.static_user_call(decl, name, &arg_types, span),
            Some(Qualifier::Library(lib)) => self.library_static_call(lib, name, &arg_types, span),
            None => {
                let recv = self.expr(target, ctx);
                self.instance_call(&recv, name, &arg_types, span)
            }
        }
    }

    fn method_call_descriptor(name: &str, args: &[Type]) -> String {
        format!("{}({})", name, Self::arg_names(args).join(","))
    }

    fn unqualified_call(&mut self, name: &str, args: &[Type], span: Span, ctx: &Ctx<'a>) -> Type {
        if let Some(class) = ctx.class {
            let candidates = self.env.find_methods(&class.name, name);
            if !candidates.is_empty() {
                let found = candidates
                    .iter()
                    .find(|(_, m)| self.applicable(&self.param_types(&m.params), args));
                return match found {
                    Some((_, m)) => {
                        if ctx.is_static && !m.is_static() {
                            self.error(
                                "non-static.cant.be.ref",
                                span,
                                format!(
                                    "non-static method {} cannot be referenced from a static context",
                                    Self::method_call_descriptor(name, args)
                                ),
                            );
                        }
                        self.quiet_type(&m.ret.name)
                    }
                    None => self.cant_apply(name, args, span),
                };
            }
        }
        let candidates = self.env.methods(name);
        if !candidates.is_empty() {
            let found = candidates
                .iter()
                .copied()
                .find(|m| self.applicable(&self.param_types(&m.params), args));
            return match found {
                Some(m) => {
                    let ret = self.quiet_type(&m.ret.name);
                    self.reference(SymbolRef::method(name, &Self::arg_names(args)));
                    ret
                }
                None => self.cant_apply(name, args, span),
            };
        }
        if let Some(class) = self.env.static_import_class(name) {
            return self.library_method(static_methods(class), class, name, args, span);
        }
        self.unresolved(SymbolRef::method(name, &Self::arg_names(args)), span);
        Type::Unknown
    }

    fn cant_apply(&mut self, name: &str, args: &[Type], span: Span) -> Type {
        self.error(
            "cant.apply.symbol",
            span,
            format!(
                "method {} cannot be applied to given types\n  found:    ({})",
                name,
                Self::arg_names(args).join(",")
            ),
        );
        Type::Unknown
    }

    fn library_method(
        &mut self,
        table: &'static [LibraryMethod],
        class: &str,
        name: &str,
        args: &[Type],
        span: Span,
    ) -> Type {
        let found = table.iter().find(|m| {
            m.name == name
                && self.applicable(
                    &m.params.iter().map(|p| self.quiet_type(p)).collect::<Vec<_>>(),
                    args,
                )
        });
        match found {
            Some(m) if m.ret == "=" => args
                .iter()
                .skip(1)
                .try_fold(args.first().cloned().unwrap_or(Type::Unknown), |acc, a| promote(&acc, a))
                .unwrap_or(Type::Unknown),
            Some(m) => self.quiet_type(m.ret),
            None if table.iter().any(|m| m.name == name) => self.cant_apply(name, args, span),
            None => self.no_member("method", &Self::method_call_descriptor(name, args), class, span),
        }
    }

    fn library_static_call(&mut self, lib: &'static LibraryClass, name: &str, args: &[Type], span: Span) -> Type {
        let table = static_methods(lib.name);
        if table.is_empty() {
            self.error(
                "library.opaque",
                span,
                format!("{} is available as a type only", lib.qualified()),
            );
            return Type::Unknown;
        }
        self.library_method(table, lib.name, name, args, span)
    }

    fn static_user_call(&mut self, decl: &'a TypeDecl, name: &str, args: &[Type], span: Span) -> Type {
        let candidates = self.env.find_methods(&decl.name, name);
        let found = candidates
            .iter()
            .find(|(_, m)| self.applicable(&self.param_types(&m.params), args));
        match found {
            Some((_, m)) if m.is_static() => self.quiet_type(&m.ret.name),
            Some(_) => {
                self.error(
                    "non-static.cant.be.ref",
                    span,
                    format!(
                        "non-static method {} cannot be referenced from a static context",
                        Self::method_call_descriptor(name, args)
                    ),
                );
                Type::Unknown
            }
            None if !candidates.is_empty() => self.cant_apply(name, args, span),
            None => self.no_member("method", &Self::method_call_descriptor(name, args), &decl.name, span),
        }
    }

    fn instance_call(&mut self, recv: &Type, name: &str, args: &[Type], span: Span) -> Type {
        match recv {
            Type::Unknown | Type::Null => Type::Unknown,
            Type::Str => {
                let table: Vec<&'static LibraryMethod> = instance_methods("String").collect();
                self.instance_library_method(&table, "String", name, args, span)
            }
            Type::Class(c) if self.env.user_type(c).is_some() => self.user_instance_call(c, name, args, span),
            Type::Class(c) => {
                let table: Vec<&'static LibraryMethod> = instance_methods(c).collect();
                if !table.iter().any(|m| m.name == name) && !is_throwable_library(c) {
                    self.error(
                        "library.opaque",
                        span,
                        format!("methods of {} are not available in this session", c),
                    );
                    return Type::Unknown;
                }
                self.instance_library_method(&table, c, name, args, span)
            }
            Type::Void => {
                self.error("void.not.allowed", span, "'void' type not allowed here");
                Type::Unknown
            }
            other => {
                self.error(
                    "cant.deref",
                    span,
                    format!("{} cannot be dereferenced", other),
                );
                Type::Unknown
            }
        }
    }

    fn instance_library_method(
        &mut self,
        table: &[&'static LibraryMethod],
        class: &str,
        name: &str,
        args: &[Type],
        span: Span,
    ) -> Type {
        let found = table.iter().find(|m| {
            m.name == name
                && self.applicable(
                    &m.params.iter().map(|p| self.quiet_type(p)).collect::<Vec<_>>(),
                    args,
                )
        });
        match found {
            Some(m) => self.quiet_type(m.ret),
            None if table.iter().any(|m| m.name == name) => self.cant_apply(name, args, span),
            None => self.no_member("method", &Self::method_call_descriptor(name, args), class, span),
        }
    }

    fn user_instance_call(&mut self, class: &str, name: &str, args: &[Type], span: Span) -> Type {
        let candidates = self.env.find_methods(class, name);
        if let Some((_, m)) = candidates
            .iter()
            .find(|(_, m)| self.applicable(&self.param_types(&m.params), args))
        {
            return self.quiet_type(&m.ret.name);
        }
        if !candidates.is_empty() {
            return self.cant_apply(name, args, span);
        }
        if let Some(decl) = self.env.user_type(class).map(|t| t.decl) {
            if args.is_empty() {
                if let Some(comp) = decl.components.iter().find(|c| c.name == name) {
                    return self.quiet_type(&comp.ty.name);
                }
                if decl.kind == TypeKind::Enum {
                    match name {
                        "name" => return Type::Str,
                        "ordinal" => return Type::Int,
                        _ => {}
                    }
                }
            }
        }
        let ancestor = self.env.library_ancestor(class).unwrap_or("Object");
        let table: Vec<&'static LibraryMethod> = instance_methods(ancestor).collect();
        self.instance_library_method(&table, class, name, args, span)
    }

    fn new_object(&mut self, ty: &'a TypeRef, args: &'a [Expr], span: Span, ctx: &mut Ctx<'a>) -> Type {
        let arg_types: Vec<Type> = args
            .iter()
            .map(|a| {
                let t = self.expr(a, ctx);
                self.require_value(&t, a.span());
                t
            })
            .collect();
        let resolved = self.resolve_type(ty);
        let name = match &resolved {
            Type::Unknown => return Type::Unknown,
            Type::Str => return Type::Str,
            Type::Class(name) => name.clone(),
            other => {
                self.error(
                    "prob.found.req",
                    ty.span,
                    format!("unexpected type\n  required: class\n  found:    {}", other),
                );
                return Type::Unknown;
            }
        };
        if let Some(decl) = self.env.user_type(&name).map(|t| t.decl) {
            match decl.kind {
                TypeKind::Interface | TypeKind::Annotation => {
                    self.error(
                        "abstract.cant.be.instantiated",
                        span,
                        format!("{} is abstract; cannot be instantiated", name),
                    );
                    return resolved;
                }
                TypeKind::Enum => {
                    self.error(
                        "enum.cant.be.instantiated",
                        span,
                        "enum classes may not be instantiated",
                    );
                    return resolved;
                }
                TypeKind::Class if decl.modifiers.has(Modifier::Abstract) => {
                    self.error(
                        "abstract.cant.be.instantiated",
                        span,
                        format!("{} is abstract; cannot be instantiated", name),
                    );
                    return resolved;
                }
                _ => {}
            }
            let ctors: Vec<Vec<Type>> = if decl.kind == TypeKind::Record {
                vec![self.param_types(&decl.components)]
            } else {
                let declared: Vec<Vec<Type>> = decl
                    .constructors()
                    .map(|c| self.param_types(&c.params))
                    .collect();
                if declared.is_empty() {
                    vec![Vec::new()]
                } else {
                    declared
                }
            };
            if !ctors.iter().any(|params| self.applicable(params, &arg_types)) {
                self.error(
                    "cant.apply.symbol",
                    span,
                    format!(
                        "constructor {} in class {} cannot be applied to given types\n  found:    ({})",
                        name,
                        name,
                        Self::arg_names(&arg_types).join(",")
                    ),
                );
            }
            return resolved;
        }
        let instantiable = crate::lang::types::library_class(&name).map_or(false, |c| c.instantiable);
        if !instantiable {
            self.error(
                "library.opaque",
                span,
                format!("{} cannot be instantiated in this session", name),
            );
            return resolved;
        }
        let fits = arg_types.is_empty()
            || (arg_types.len() == 1
                && name != "Object"
                && self.assignable(&arg_types[0], &Type::Str));
        if !fits {
            self.cant_apply(&name, &arg_types, span);
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::parse_fragment;
    use crate::oracle::LiveUnit;
    use crate::snippet::Status;

    struct Live {
        fragment: Fragment,
        kind: SnippetKind,
        status: Status,
    }

    fn live(src: &str, status: Status) -> Live {
        let fragment = parse_fragment(src).unwrap();
        let kind = preliminary_kind(&fragment.item);
        Live {
            fragment,
            kind,
            status,
        }
    }

    fn check(src: &str, others: &[Live]) -> CompileReport {
        let fragment = parse_fragment(src).unwrap();
        let units: Vec<LiveUnit<'_, Fragment>> = others
            .iter()
            .enumerate()
            .map(|(i, l)| LiveUnit {
                id: SnippetId(i as u32 + 1),
                unit: &l.fragment,
                kind: &l.kind,
                status: l.status,
            })
            .collect();
        compile(&CompileRequest {
            id: SnippetId(others.len() as u32 + 1),
            unit: &fragment,
            live: &units,
        })
    }

    fn codes(report: &CompileReport) -> Vec<&str> {
        report.diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    #[test]
    fn forward_reference_is_corralled_in_body() {
        let r = check("int x() { return g(); }", &[]);
        assert!(r.diagnostics.is_empty());
        assert_eq!(r.unresolved.len(), 1);
        assert_eq!(r.unresolved[0].symbol.to_string(), "method g()");
        assert_eq!(r.unresolved[0].scope, Scope::Body);
        assert_eq!(r.defines, vec![SymbolRef::method::<&str>("x", &[])]);
    }

    #[test]
    fn resolved_call_is_a_reference() {
        let r = check("int x() { return g(); }", &[live("int g() { return 55; }", Status::Valid)]);
        assert!(r.unresolved.is_empty());
        assert_eq!(r.references, vec![SymbolRef::method::<&str>("g", &[])]);
    }

    #[test]
    fn undefined_types_in_signatures_block_shape() {
        let r = check("class B extends A {}", &[]);
        assert!(r.blocks_shape());
        let r = check("Foo make() { return null; }", &[]);
        assert!(r.blocks_shape());
        let r = check("var v = make()", &[]);
        assert!(r.blocks_shape());
    }

    #[test]
    fn unresolved_in_expression_is_an_error() {
        let r = check("y + 1", &[]);
        assert_eq!(codes(&r), vec!["cant.resolve.location"]);
        assert!(r.diagnostics[0].message.contains("variable y"));
    }

    #[test]
    fn cyclic_inheritance_reports_once() {
        let a = live("class A extends B {}", Status::RecoverableNotDefined);
        let r = check("class B extends A {}", &[a]);
        assert_eq!(codes(&r), vec!["cyclic.inheritance"]);
    }

    #[test]
    fn expression_kinds() {
        let x = Live {
            fragment: parse_fragment("int x = 1").unwrap(),
            kind: SnippetKind::Var {
                name: "x".into(),
                type_name: "int".into(),
                sub: SubKind::VarDeclarationWithInitializer,
            },
            status: Status::Valid,
        };
        let r = check("x", std::slice::from_ref(&x));
        assert_eq!(r.kind.sub_kind(), SubKind::VarValue);
        let r = check("x = 6", std::slice::from_ref(&x));
        assert_eq!(r.kind.sub_kind(), SubKind::Assignment);
        let r = check("x + 1", std::slice::from_ref(&x));
        assert_eq!(r.kind.sub_kind(), SubKind::TempVarExpression);
        assert_eq!(r.kind.name(), Some("$2"));
        assert_eq!(r.signature, "int $2");
        let r = check("System.out.println(x)", std::slice::from_ref(&x));
        assert_eq!(r.kind, SnippetKind::Statement);
    }

    #[test]
    fn var_infers_type() {
        let r = check("var s = \"a\" + 1", &[]);
        match r.kind {
            SnippetKind::Var { type_name, .. } => assert_eq!(type_name, "String"),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn type_errors() {
        assert_eq!(codes(&check("int x = \"s\"", &[])), vec!["prob.found.req"]);
        assert_eq!(codes(&check("int f() { }", &[])), vec!["missing.ret.stmt"]);
        assert_eq!(codes(&check("void f() { 1 + 2; }", &[])), vec!["not.stmt"]);
        assert_eq!(codes(&check("break;", &[])), vec!["break.outside.loop"]);
        assert_eq!(codes(&check("return 1;", &[])), vec!["ret.outside.meth"]);
        assert_eq!(codes(&check("true + 1", &[])), vec!["operator.cant.be.applied"]);
        assert_eq!(codes(&check("int x = x + 1", &[])), vec!["illegal.self.ref"]);
        assert_eq!(
            codes(&check("class A { int n; int n; }", &[])),
            vec!["already.defined"]
        );
    }

    #[test]
    fn interface_rules() {
        let i = live("interface Shape { double area(); }", Status::Valid);
        let r = check("class Sq extends Shape {}", std::slice::from_ref(&i));
        assert_eq!(codes(&r), vec!["no.intf.expected.here"]);
        let r = check("class Sq implements Shape { public double area() { return 1.0; } }", std::slice::from_ref(&i));
        assert!(r.diagnostics.is_empty());
        assert_eq!(codes(&check("new Shape()", &[i])), vec!["abstract.cant.be.instantiated"]);
    }

    #[test]
    fn imports_resolve_against_catalog() {
        assert!(check("import java.util.List", &[]).diagnostics.is_empty());
        assert_eq!(codes(&check("import java.util.Nope", &[])), vec!["cant.resolve.location"]);
        assert_eq!(codes(&check("import com.acme.*", &[])), vec!["doesnt.exist"]);
        let r = check("import static java.lang.Math.*", &[]);
        assert!(r.defines.iter().any(|d| d.name == "max"));
    }

    #[test]
    fn top_level_modifiers_warn() {
        let r = check("public static int f() { return 1; }", &[]);
        assert!(!r.has_errors());
        assert_eq!(codes(&r), vec!["modifier.ignored", "modifier.ignored"]);
    }

    #[test]
    fn signatures_ignore_bodies() {
        let a = check("int f(int a) { return a; }", &[]);
        let b = check("int f(int a) { return a + 1; }", &[]);
        assert_eq!(a.signature, b.signature);
        let c = check("class A { int n; void bump() { n++; } }", &[]);
        let d = check("class A { int n; void bump() { n += 2; } }", &[]);
        assert_eq!(c.signature, d.signature);
        let e = check("class A { long n; void bump() { n++; } }", &[]);
        assert_ne!(c.signature, e.signature);
    }
}
