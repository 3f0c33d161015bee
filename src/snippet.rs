use std::fmt;

use serde::{Deserialize, Serialize};

use crate::names::{SnippetId, SymbolName, TypeName};

/// Coarse snippet classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    Import,
    TypeDecl,
    Method,
    Var,
    Expression,
    Statement,
    Erroneous,
}

/// Fine-grained classification; each sub-kind belongs to exactly one [`Kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubKind {
    SingleTypeImport,
    TypeImportOnDemand,
    SingleStaticImport,
    StaticImportOnDemand,
    Class,
    Interface,
    Enum,
    Annotation,
    Record,
    Method,
    VarDeclaration,
    VarDeclarationWithInitializer,
    TempVarExpression,
    VarValue,
    Assignment,
    Statement,
    Unknown,
}

impl SubKind {
    pub fn kind(self) -> Kind {
        match self {
            SubKind::SingleTypeImport
            | SubKind::TypeImportOnDemand
            | SubKind::SingleStaticImport
            | SubKind::StaticImportOnDemand => Kind::Import,
            SubKind::Class
            | SubKind::Interface
            | SubKind::Enum
            | SubKind::Annotation
            | SubKind::Record => Kind::TypeDecl,
            SubKind::Method => Kind::Method,
            SubKind::VarDeclaration
            | SubKind::VarDeclarationWithInitializer
            | SubKind::TempVarExpression => Kind::Var,
            SubKind::VarValue | SubKind::Assignment => Kind::Expression,
            SubKind::Statement => Kind::Statement,
            SubKind::Unknown => Kind::Erroneous,
        }
    }
}

/// Snippet classification with the payload each kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnippetKind {
    Import {
        target: String,
        is_static: bool,
        on_demand: bool,
    },
    TypeDecl {
        name: SymbolName,
        sub: SubKind,
    },
    Method {
        name: SymbolName,
        params: Vec<TypeName>,
        return_type: TypeName,
    },
    Var {
        name: SymbolName,
        type_name: TypeName,
        sub: SubKind,
    },
    Expression {
        name: SymbolName,
        type_name: TypeName,
        sub: SubKind,
    },
    Statement,
    Erroneous,
}

impl SnippetKind {
    pub fn kind(&self) -> Kind {
        self.sub_kind().kind()
    }

    pub fn sub_kind(&self) -> SubKind {
        match self {
            SnippetKind::Import {
                is_static,
                on_demand,
                ..
            } => match (*is_static, *on_demand) {
                (false, false) => SubKind::SingleTypeImport,
                (false, true) => SubKind::TypeImportOnDemand,
                (true, false) => SubKind::SingleStaticImport,
                (true, true) => SubKind::StaticImportOnDemand,
            },
            SnippetKind::TypeDecl { sub, .. }
            | SnippetKind::Var { sub, .. }
            | SnippetKind::Expression { sub, .. } => *sub,
            SnippetKind::Method { .. } => SubKind::Method,
            SnippetKind::Statement => SubKind::Statement,
            SnippetKind::Erroneous => SubKind::Unknown,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            SnippetKind::Import { target, .. } => Some(target.as_str()),
            SnippetKind::TypeDecl { name, .. }
            | SnippetKind::Method { name, .. }
            | SnippetKind::Var { name, .. }
            | SnippetKind::Expression { name, .. } => Some(name.0.as_str()),
            SnippetKind::Statement | SnippetKind::Erroneous => None,
        }
    }

    /// The supersession key. Snippets without one never replace each other.
    pub fn key(&self) -> Option<DeclKey> {
        match self {
            SnippetKind::Import {
                target, is_static, ..
            } => Some(DeclKey::Import {
                target: target.clone(),
                is_static: *is_static,
            }),
            SnippetKind::TypeDecl { name, .. } => Some(DeclKey::Type(name.clone())),
            SnippetKind::Method { name, params, .. } => {
                Some(DeclKey::Method(name.clone(), params.clone()))
            }
            SnippetKind::Var { name, .. } => Some(DeclKey::Var(name.clone())),
            SnippetKind::Expression { .. } | SnippetKind::Statement | SnippetKind::Erroneous => {
                None
            }
        }
    }

    pub fn is_declaration(&self) -> bool {
        matches!(
            self.kind(),
            Kind::Import | Kind::TypeDecl | Kind::Method | Kind::Var
        )
    }

    /// Whether the backend runs the snippet after it becomes VALID.
    pub fn is_executable(&self) -> bool {
        matches!(self.kind(), Kind::Var | Kind::Expression | Kind::Statement)
    }

    /// `class A`, `method f(int)`, `variable x`, `import java.util.List`.
    pub fn descriptor(&self) -> String {
        match self {
            SnippetKind::Import {
                target, is_static, ..
            } => {
                if *is_static {
                    format!("import static {}", target)
                } else {
                    format!("import {}", target)
                }
            }
            SnippetKind::TypeDecl { name, sub } => {
                let word = match sub {
                    SubKind::Interface => "interface",
                    SubKind::Enum => "enum",
                    SubKind::Annotation => "annotation interface",
                    SubKind::Record => "record",
                    _ => "class",
                };
                format!("{} {}", word, name)
            }
            SnippetKind::Method { name, params, .. } => {
                let params: Vec<&str> = params.iter().map(|p| p.0.as_str()).collect();
                format!("method {}({})", name, params.join(","))
            }
            SnippetKind::Var { name, .. } | SnippetKind::Expression { name, .. } => {
                format!("variable {}", name)
            }
            SnippetKind::Statement => "statement".to_string(),
            SnippetKind::Erroneous => "erroneous snippet".to_string(),
        }
    }
}

/// Declaration identity: at most one active snippet holds each key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclKey {
    Import { target: String, is_static: bool },
    Type(SymbolName),
    Method(SymbolName, Vec<TypeName>),
    Var(SymbolName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Nonexistent,
    Valid,
    RecoverableDefined,
    RecoverableNotDefined,
    Dropped,
    Overwritten,
    Rejected,
}

impl Status {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Status::Valid | Status::RecoverableDefined | Status::RecoverableNotDefined
        )
    }

    /// Whether the snippet's names can be referenced by other snippets.
    pub fn is_defined(self) -> bool {
        matches!(self, Status::Valid | Status::RecoverableDefined)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Dropped | Status::Overwritten | Status::Rejected)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Nonexistent => "NONEXISTENT",
            Status::Valid => "VALID",
            Status::RecoverableDefined => "RECOVERABLE_DEFINED",
            Status::RecoverableNotDefined => "RECOVERABLE_NOT_DEFINED",
            Status::Dropped => "DROPPED",
            Status::Overwritten => "OVERWRITTEN",
            Status::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// An immutable record of one submitted source fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: SnippetId,
    pub kind: SnippetKind,
    pub source: String,
}

impl Snippet {
    pub fn kind(&self) -> Kind {
        self.kind.kind()
    }

    pub fn sub_kind(&self) -> SubKind {
        self.kind.sub_kind()
    }

    pub fn name(&self) -> Option<&str> {
        self.kind.name()
    }

    pub fn key(&self) -> Option<DeclKey> {
        self.kind.key()
    }

    pub fn descriptor(&self) -> String {
        self.kind.descriptor()
    }
}

/// Selects snippets for [`crate::registry::SnippetRegistry::active_snippets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetFilter {
    All,
    Declarations,
    Kind(Kind),
}

impl SnippetFilter {
    pub fn accepts(self, snippet: &Snippet) -> bool {
        match self {
            SnippetFilter::All => true,
            SnippetFilter::Declarations => snippet.kind.is_declaration(),
            SnippetFilter::Kind(k) => snippet.kind() == k,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, params: &[&str]) -> SnippetKind {
        SnippetKind::Method {
            name: name.into(),
            params: params.iter().map(|p| TypeName::from(*p)).collect(),
            return_type: "int".into(),
        }
    }

    #[test]
    fn status_predicates() {
        assert!(Status::Valid.is_active() && Status::Valid.is_defined());
        assert!(Status::RecoverableDefined.is_defined());
        assert!(Status::RecoverableNotDefined.is_active());
        assert!(!Status::RecoverableNotDefined.is_defined());
        for s in [Status::Dropped, Status::Overwritten, Status::Rejected] {
            assert!(s.is_terminal());
            assert!(!s.is_active());
        }
        assert!(!Status::Nonexistent.is_terminal());
    }

    #[test]
    fn overloads_have_distinct_keys() {
        assert_ne!(method("f", &["int"]).key(), method("f", &["String"]).key());
        assert_eq!(method("f", &["int"]).key(), method("f", &["int"]).key());
    }

    #[test]
    fn import_keys_include_static_flag() {
        let a = SnippetKind::Import {
            target: "java.lang.Math.*".into(),
            is_static: true,
            on_demand: true,
        };
        let b = SnippetKind::Import {
            target: "java.lang.Math.*".into(),
            is_static: false,
            on_demand: true,
        };
        assert_ne!(a.key(), b.key());
        assert_eq!(a.sub_kind(), SubKind::StaticImportOnDemand);
        assert_eq!(a.kind(), Kind::Import);
    }

    #[test]
    fn expressions_are_keyless() {
        let e = SnippetKind::Expression {
            name: "x".into(),
            type_name: "int".into(),
            sub: SubKind::VarValue,
        };
        assert_eq!(e.key(), None);
        assert!(!e.is_declaration());
        assert!(e.is_executable());
        assert_eq!(SnippetKind::Statement.key(), None);
    }

    #[test]
    fn temp_vars_are_declarations() {
        let v = SnippetKind::Var {
            name: "$1".into(),
            type_name: "int".into(),
            sub: SubKind::TempVarExpression,
        };
        assert_eq!(v.kind(), Kind::Var);
        assert!(v.is_declaration());
        assert_eq!(v.descriptor(), "variable $1");
    }

    #[test]
    fn descriptors() {
        assert_eq!(method("x", &[]).descriptor(), "method x()");
        let i = SnippetKind::TypeDecl {
            name: "Shape".into(),
            sub: SubKind::Interface,
        };
        assert_eq!(i.descriptor(), "interface Shape");
    }
}
