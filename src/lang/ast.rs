use std::sync::Arc;

use crate::error::Span;

/// A parsed snippet: the source it came from plus its single top-level item.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub source: Arc<str>,
    pub item: Item,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Import(ImportDecl),
    Type(Arc<TypeDecl>),
    Method(Arc<MethodDecl>),
    Var(VarDecl),
    Stmt(Stmt),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Public,
    Protected,
    Private,
    Static,
    Final,
    Abstract,
    Default,
}

impl Modifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Modifier::Public => "public",
            Modifier::Protected => "protected",
            Modifier::Private => "private",
            Modifier::Static => "static",
            Modifier::Final => "final",
            Modifier::Abstract => "abstract",
            Modifier::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifiers(pub Vec<(Modifier, Span)>);

impl Modifiers {
    pub fn has(&self, m: Modifier) -> bool {
        self.0.iter().any(|(x, _)| *x == m)
    }
}

/// A type as written: `int`, `String`, `java.util.List`, or `var`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub name: String,
    pub span: Span,
}

impl TypeRef {
    pub fn is_var(&self) -> bool {
        self.name == "var"
    }

    pub fn is_void(&self) -> bool {
        self.name == "void"
    }

    /// Last segment of a qualified name.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    /// Dotted target without the trailing `.*`.
    pub path: String,
    pub is_static: bool,
    pub on_demand: bool,
    pub span: Span,
}

impl ImportDecl {
    pub fn target(&self) -> String {
        if self.on_demand {
            format!("{}.*", self.path)
        } else {
            self.path.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Annotation,
    Record,
}

impl TypeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Enum => "enum",
            TypeKind::Annotation => "@interface",
            TypeKind::Record => "record",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub kind: TypeKind,
    pub modifiers: Modifiers,
    pub name: String,
    pub name_span: Span,
    pub extends: Vec<TypeRef>,
    pub implements: Vec<TypeRef>,
    pub components: Vec<Param>,
    pub constants: Vec<(String, Span)>,
    pub members: Vec<Member>,
    pub span: Span,
}

impl TypeDecl {
    pub fn fields(&self) -> impl Iterator<Item = &VarDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Field(f) => Some(f),
            _ => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &Arc<MethodDecl>> {
        self.members.iter().filter_map(|m| match m {
            Member::Method(f) => Some(f),
            _ => None,
        })
    }

    pub fn constructors(&self) -> impl Iterator<Item = &ConstructorDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Constructor(c) => Some(c),
            _ => None,
        })
    }

    /// Supertypes named by `extends` and `implements`.
    pub fn supertypes(&self) -> impl Iterator<Item = &TypeRef> {
        self.extends.iter().chain(self.implements.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(VarDecl),
    Method(Arc<MethodDecl>),
    Constructor(ConstructorDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeRef,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub modifiers: Modifiers,
    pub ret: TypeRef,
    pub name: String,
    pub name_span: Span,
    pub params: Vec<Param>,
    pub body: Option<Block>,
    pub span: Span,
}

impl MethodDecl {
    pub fn is_static(&self) -> bool {
        self.modifiers.has(Modifier::Static)
    }

    pub fn param_type_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.ty.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDecl {
    pub modifiers: Modifiers,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub modifiers: Modifiers,
    pub ty: TypeRef,
    pub name: String,
    pub name_span: Span,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catch {
    pub types: Vec<TypeRef>,
    pub name: String,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Block),
    Local(VarDecl),
    Expr(Expr),
    If {
        cond: Expr,
        then: Box<Stmt>,
        els: Option<Box<Stmt>>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
        span: Span,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
        span: Span,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Throw {
        value: Expr,
        span: Span,
    },
    Try {
        body: Block,
        catches: Vec<Catch>,
        finally: Option<Block>,
        span: Span,
    },
    SuperCall {
        args: Vec<Expr>,
        span: Span,
    },
    Break(Span),
    Continue(Span),
    Empty(Span),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block(b) => b.span,
            Stmt::Local(v) => v.span,
            Stmt::Expr(e) => e.span(),
            Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::DoWhile { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::SuperCall { span, .. } => *span,
            Stmt::Break(span) | Stmt::Continue(span) | Stmt::Empty(span) => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// `=` is `None`; compound assignments carry their operator.
pub type AssignOp = Option<BinOp>;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int {
        value: i64,
        long: bool,
        span: Span,
    },
    Double {
        value: f64,
        span: Span,
    },
    Str {
        value: String,
        span: Span,
    },
    Bool {
        value: bool,
        span: Span,
    },
    Null(Span),
    This(Span),
    Name {
        name: String,
        span: Span,
    },
    Field {
        target: Box<Expr>,
        name: String,
        span: Span,
    },
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    New {
        ty: TypeRef,
        args: Vec<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    IncDec {
        target: Box<Expr>,
        increment: bool,
        prefix: bool,
        span: Span,
    },
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: TypeRef,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Int { span, .. }
            | Expr::Double { span, .. }
            | Expr::Str { span, .. }
            | Expr::Bool { span, .. }
            | Expr::Name { span, .. }
            | Expr::Field { span, .. }
            | Expr::Call { span, .. }
            | Expr::New { span, .. }
            | Expr::Unary { span, .. }
            | Expr::IncDec { span, .. } => *span,
            Expr::Null(span) | Expr::This(span) => *span,
            Expr::Binary { lhs, rhs, .. } => (lhs.span().0, rhs.span().1),
            Expr::Assign { target, value, .. } => (target.span().0, value.span().1),
            Expr::Cond { cond, els, .. } => (cond.span().0, els.span().1),
            Expr::InstanceOf { expr, ty } => (expr.span().0, ty.span.1),
        }
    }

    /// Expressions allowed as statements: assignments, increments, calls, `new`.
    pub fn is_statement_expression(&self) -> bool {
        matches!(
            self,
            Expr::Assign { .. } | Expr::IncDec { .. } | Expr::Call { .. } | Expr::New { .. }
        )
    }
}
