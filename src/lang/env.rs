//! Names visible to one compilation, assembled from the live snippets.

use std::collections::{HashMap, HashSet};

use crate::lang::ast::{
    Fragment, ImportDecl, Item, MethodDecl, Modifier, TypeDecl, TypeKind, TypeRef, VarDecl,
};
use crate::lang::types::{library_class, library_qualified, static_methods, LibraryClass};
use crate::oracle::CompileRequest;
use crate::snippet::SnippetKind;

pub(crate) struct UserType<'a> {
    pub decl: &'a TypeDecl,
    /// VALID or RECOVERABLE_DEFINED; only these satisfy references.
    pub defined: bool,
}

/// A field found on a user type or one of its supertypes.
pub(crate) struct FieldInfo<'a> {
    pub ty: &'a TypeRef,
    pub is_static: bool,
}

pub(crate) struct Env<'a> {
    types: HashMap<&'a str, UserType<'a>>,
    methods: HashMap<&'a str, Vec<&'a MethodDecl>>,
    vars: HashMap<&'a str, &'a str>,
    imports: Vec<&'a ImportDecl>,
}

impl<'a> Env<'a> {
    pub fn new(request: &CompileRequest<'a, Fragment>) -> Self {
        let mut env = Env {
            types: HashMap::new(),
            methods: HashMap::new(),
            vars: HashMap::new(),
            imports: Vec::new(),
        };
        for live in request.live {
            let defined = live.status.is_defined();
            match &live.unit.item {
                Item::Type(decl) => {
                    env.types.insert(
                        decl.name.as_str(),
                        UserType {
                            decl: decl.as_ref(),
                            defined,
                        },
                    );
                }
                Item::Method(m) if defined => {
                    env.methods.entry(m.name.as_str()).or_default().push(m.as_ref())
                }
                Item::Import(i) if defined => env.imports.push(i),
                Item::Var(_) | Item::Expr(_) if defined => {
                    if let SnippetKind::Var {
                        name, type_name, ..
                    } = live.kind
                    {
                        env.vars.insert(name.0.as_str(), type_name.0.as_str());
                    }
                }
                _ => {}
            }
        }
        // The unit's own declaration is visible to itself.
        match &request.unit.item {
            Item::Type(decl) => {
                env.types.insert(
                    decl.name.as_str(),
                    UserType {
                        decl: decl.as_ref(),
                        defined: true,
                    },
                );
            }
            Item::Method(m) => env.methods.entry(m.name.as_str()).or_default().push(m.as_ref()),
            _ => {}
        }
        env
    }

    // ── Lookups ───────────────────────────────────────────────────────────

    pub fn user_type(&self, name: &str) -> Option<&UserType<'a>> {
        self.types.get(name)
    }

    pub fn defined_type(&self, name: &str) -> Option<&'a TypeDecl> {
        self.types.get(name).filter(|t| t.defined).map(|t| t.decl)
    }

    pub fn methods(&self, name: &str) -> &[&'a MethodDecl] {
        self.methods.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn var_type(&self, name: &str) -> Option<&'a str> {
        self.vars.get(name).copied()
    }

    /// A library class visible by simple name: `java.lang` always, others
    /// through a single-type or on-demand import.
    pub fn library_type(&self, name: &str) -> Option<&'static LibraryClass> {
        if let Some(c) = library_class(name).filter(|c| c.package == "java.lang") {
            return Some(c);
        }
        self.imports
            .iter()
            .filter(|i| !i.is_static)
            .find_map(|i| {
                if i.on_demand {
                    library_qualified(&format!("{}.{}", i.path, name))
                } else if i.path.rsplit('.').next() == Some(name) {
                    library_qualified(&i.path)
                } else {
                    None
                }
            })
    }

    /// The library class a static import brings `method` in from.
    pub fn static_import_class(&self, method: &str) -> Option<&'static str> {
        static_import_class(self.imports.iter().copied(), method)
    }

    // ── Hierarchy ─────────────────────────────────────────────────────────

    /// Direct supertypes of a user or library type, by simple name.
    fn direct_supertypes(&self, name: &str) -> Vec<&'a str> {
        if let Some(t) = self.types.get(name) {
            t.decl.supertypes().map(TypeRef::simple_name).collect()
        } else if let Some(sup) = library_class(name).and_then(|c| c.superclass) {
            vec![sup]
        } else {
            Vec::new()
        }
    }

    pub fn is_subclass(&self, sub: &str, sup: &str) -> bool {
        if sup == "Object" || sub == sup {
            return true;
        }
        let mut stack = self.direct_supertypes(sub);
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if n == sup {
                return true;
            }
            if seen.insert(n) {
                stack.extend(self.direct_supertypes(n));
            }
        }
        false
    }

    /// Does following supertypes from `decl` lead back to `decl` itself?
    /// Considers every live type, defined or not.
    pub fn is_cyclic(&self, decl: &TypeDecl) -> bool {
        let mut stack: Vec<&str> = decl.supertypes().map(TypeRef::simple_name).collect();
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if n == decl.name {
                return true;
            }
            if seen.insert(n.to_string()) {
                if let Some(t) = self.types.get(n) {
                    stack.extend(t.decl.supertypes().map(TypeRef::simple_name));
                }
            }
        }
        false
    }

    /// The user types from `class` upward, nearest first.
    pub fn user_chain(&self, class: &str) -> Vec<&'a TypeDecl> {
        let mut out = Vec::new();
        let mut stack = vec![class.to_string()];
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if !seen.insert(n.clone()) {
                continue;
            }
            if let Some(t) = self.types.get(n.as_str()) {
                out.push(t.decl);
                let sups: Vec<&TypeRef> = t.decl.supertypes().collect();
                for sup in sups.into_iter().rev() {
                    stack.push(sup.simple_name().to_string());
                }
            }
        }
        out
    }

    /// First library ancestor of a user type, e.g. `RuntimeException`.
    pub fn library_ancestor(&self, class: &str) -> Option<&'static str> {
        if let Some(c) = library_class(class) {
            return Some(c.name);
        }
        self.user_chain(class)
            .into_iter()
            .flat_map(|t| t.supertypes())
            .find_map(|s| library_class(s.simple_name()).map(|c| c.name))
    }

    pub fn find_field(&self, class: &str, name: &str) -> Option<FieldInfo<'a>> {
        self.user_chain(class).into_iter().find_map(|owner| {
            owner
                .fields()
                .find(|f: &&VarDecl| f.name == name)
                .map(|f| FieldInfo {
                    ty: &f.ty,
                    is_static: f.modifiers.has(Modifier::Static),
                })
                .or_else(|| {
                    owner
                        .components
                        .iter()
                        .find(|c| c.name == name)
                        .map(|c| FieldInfo {
                            ty: &c.ty,
                            is_static: false,
                        })
                })
        })
    }

    pub fn find_methods(&self, class: &str, name: &str) -> Vec<(&'a TypeDecl, &'a MethodDecl)> {
        self.user_chain(class)
            .into_iter()
            .flat_map(|owner| {
                owner
                    .methods()
                    .filter(move |m| m.name == name)
                    .map(move |m| (owner, m.as_ref()))
            })
            .collect()
    }

    pub fn is_enum_constant(&self, class: &str, name: &str) -> bool {
        self.types.get(class).map_or(false, |t| {
            t.decl.kind == TypeKind::Enum && t.decl.constants.iter().any(|(c, _)| c == name)
        })
    }
}

/// The library class one of `imports` statically imports `method` from.
pub(crate) fn static_import_class<'i>(
    imports: impl IntoIterator<Item = &'i ImportDecl>,
    method: &str,
) -> Option<&'static str> {
    imports.into_iter().filter(|i| i.is_static).find_map(|i| {
        let (class_path, member) = if i.on_demand {
            (i.path.as_str(), None)
        } else {
            let (class, member) = i.path.rsplit_once('.')?;
            (class, Some(member))
        };
        let class = library_qualified(class_path)?;
        let provides = member.map_or(true, |m| m == method)
            && static_methods(class.name).iter().any(|m| m.name == method);
        provides.then_some(class.name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::parser::parse_fragment;
    use crate::names::SnippetId;
    use crate::oracle::LiveUnit;
    use crate::snippet::{Status, SubKind};

    fn type_kind(name: &str) -> SnippetKind {
        SnippetKind::TypeDecl {
            name: name.into(),
            sub: SubKind::Class,
        }
    }

    #[test]
    fn cycles_are_found_through_undefined_types() {
        let a = parse_fragment("class A extends B {}").unwrap();
        let b = parse_fragment("class B extends A {}").unwrap();
        let ka = type_kind("A");
        let live = [LiveUnit {
            id: SnippetId(1),
            unit: &a,
            kind: &ka,
            status: Status::RecoverableNotDefined,
        }];
        let request = CompileRequest {
            id: SnippetId(2),
            unit: &b,
            live: &live,
        };
        let env = Env::new(&request);
        let Item::Type(decl) = &b.item else {
            panic!("expected a type");
        };
        assert!(env.is_cyclic(decl));
        assert!(env.defined_type("A").is_none());
        assert!(env.defined_type("B").is_some());
    }

    #[test]
    fn subclassing_reaches_library_types() {
        let e = parse_fragment("class Oops extends IllegalStateException {}").unwrap();
        let request = CompileRequest {
            id: SnippetId(1),
            unit: &e,
            live: &[],
        };
        let env = Env::new(&request);
        assert!(env.is_subclass("Oops", "RuntimeException"));
        assert!(!env.is_subclass("Oops", "Error"));
        assert_eq!(env.library_ancestor("Oops"), Some("IllegalStateException"));
    }

    #[test]
    fn imports_make_library_types_visible() {
        let import = parse_fragment("import java.util.*").unwrap();
        let unit = parse_fragment("List x").unwrap();
        let kind = SnippetKind::Import {
            target: "java.util.*".into(),
            is_static: false,
            on_demand: true,
        };
        let live = [LiveUnit {
            id: SnippetId(1),
            unit: &import,
            kind: &kind,
            status: Status::Valid,
        }];
        let request = CompileRequest {
            id: SnippetId(2),
            unit: &unit,
            live: &live,
        };
        let env = Env::new(&request);
        assert!(env.library_type("List").is_some());
        assert!(env.library_type("String").is_some());
        assert!(env.library_type("LocalDate").is_none());
    }
}
