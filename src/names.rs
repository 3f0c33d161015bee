use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

// ── Name newtypes ─────────────────────────────────────────────────────────

/// Implement common traits for a String newtype wrapper:
/// Deref<Target=str>, Borrow<str>, From<String>, From<&str>,
/// AsRef<str>, PartialEq<str>, PartialEq<&str>.
macro_rules! string_newtype {
    ($name:ident) => {
        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

/// A simple (unqualified) declared name.
/// Examples: `"Foo"`, `"g"`, `"$3"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolName(pub String);
string_newtype!(SymbolName);

/// The display name of a type as written or inferred.
/// Examples: `"int"`, `"String"`, `"java.util.List"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeName(pub String);
string_newtype!(TypeName);

// ── Snippet identity ──────────────────────────────────────────────────────

/// Monotonically increasing snippet identity, unique within one engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SnippetId(pub u32);

impl SnippetId {
    /// The `#<id>` form used in stack traces.
    pub fn tag(self) -> String {
        format!("#{}", self.0)
    }
}

impl fmt::Display for SnippetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Symbols ───────────────────────────────────────────────────────────────

/// The namespace a top-level symbol lives in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SymbolKind {
    Type,
    Method,
    Variable,
}

/// A top-level symbol defined or referenced by a snippet. Methods carry
/// their parameter types (for definitions) or argument types (for call sites).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolRef {
    pub kind: SymbolKind,
    pub name: SymbolName,
    pub params: Vec<TypeName>,
}

impl SymbolRef {
    pub fn ty(name: &str) -> Self {
        SymbolRef {
            kind: SymbolKind::Type,
            name: name.into(),
            params: Vec::new(),
        }
    }

    pub fn method<S: AsRef<str>>(name: &str, params: &[S]) -> Self {
        SymbolRef {
            kind: SymbolKind::Method,
            name: name.into(),
            params: params.iter().map(|p| TypeName::from(p.as_ref())).collect(),
        }
    }

    pub fn variable(name: &str) -> Self {
        SymbolRef {
            kind: SymbolKind::Variable,
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Does a definition `self` satisfy a reference `wanted`?
    pub fn provides(&self, wanted: &SymbolRef) -> bool {
        if self.kind != wanted.kind || self.name != wanted.name {
            return false;
        }
        match self.kind {
            SymbolKind::Method => args_fit(&self.params, &wanted.params),
            SymbolKind::Type | SymbolKind::Variable => true,
        }
    }
}

/// Human-readable descriptor: `class Foo`, `method baz(int)`, `variable bar`.
impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SymbolKind::Type => write!(f, "class {}", self.name),
            SymbolKind::Variable => write!(f, "variable {}", self.name),
            SymbolKind::Method => {
                let params: Vec<&str> = self.params.iter().map(|p| p.0.as_str()).collect();
                write!(f, "method {}({})", self.name, params.join(","))
            }
        }
    }
}

fn is_primitive(name: &str) -> bool {
    matches!(name, "int" | "long" | "double" | "boolean")
}

fn widens(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        ("int", "long") | ("int", "double") | ("long", "double")
    )
}

/// Loose applicability of call-site argument types to declared parameter
/// types. Reference types are treated as mutually compatible; the checker
/// does the precise subtype test at compile time.
pub fn args_fit(params: &[TypeName], args: &[TypeName]) -> bool {
    params.len() == args.len()
        && params.iter().zip(args).all(|(p, a)| {
            p == a
                || p == "Object"
                || widens(a, p)
                || (!is_primitive(p) && !is_primitive(a))
        })
}

/// Join descriptors the way feedback messages list them: `a, b, and c`.
pub fn join_descriptors(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptors() {
        assert_eq!(SymbolRef::ty("Foo").to_string(), "class Foo");
        assert_eq!(SymbolRef::variable("bar").to_string(), "variable bar");
        assert_eq!(SymbolRef::method("baz", &["int"]).to_string(), "method baz(int)");
        assert_eq!(
            SymbolRef::method::<&str>("g", &[]).to_string(),
            "method g()"
        );
        assert_eq!(
            SymbolRef::method("h", &["int", "String"]).to_string(),
            "method h(int,String)"
        );
    }

    #[test]
    fn method_definition_matches_by_arity_and_types() {
        let def = SymbolRef::method("f", &["long"]);
        assert!(def.provides(&SymbolRef::method("f", &["int"])));
        assert!(def.provides(&SymbolRef::method("f", &["long"])));
        assert!(!def.provides(&SymbolRef::method("f", &["String"])));
        assert!(!def.provides(&SymbolRef::method::<&str>("f", &[])));
        assert!(!def.provides(&SymbolRef::method("g", &["long"])));
    }

    #[test]
    fn reference_types_fit_each_other() {
        let def = SymbolRef::method("show", &["Shape"]);
        assert!(def.provides(&SymbolRef::method("show", &["Circle"])));
        assert!(!def.provides(&SymbolRef::method("show", &["int"])));
    }

    #[test]
    fn types_and_variables_match_by_name() {
        assert!(SymbolRef::ty("A").provides(&SymbolRef::ty("A")));
        assert!(!SymbolRef::ty("A").provides(&SymbolRef::variable("A")));
    }

    #[test]
    fn snippet_tag() {
        assert_eq!(SnippetId(7).tag(), "#7");
        assert_eq!(SnippetId(7).to_string(), "7");
    }

    #[test]
    fn joined_descriptors() {
        assert_eq!(join_descriptors(&[]), "");
        assert_eq!(join_descriptors(&["method p()".into()]), "method p()");
        assert_eq!(
            join_descriptors(&["class A".into(), "method p()".into()]),
            "class A, and method p()"
        );
        assert_eq!(
            join_descriptors(&["a".into(), "b".into(), "c".into()]),
            "a, b, and c"
        );
    }
}
