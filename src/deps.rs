//! Symbol-level dependency graph between snippets.
//!
//! Definitions and references are recorded per snippet after every
//! compilation; the unresolved set is never stored, it is derived from the
//! live definitions each time it is asked for.

use std::collections::{BTreeMap, BTreeSet};

use crate::names::{SnippetId, SymbolKind, SymbolName, SymbolRef};
use crate::registry::SnippetRegistry;

type SymbolId = (SymbolKind, SymbolName);

fn symbol_id(sym: &SymbolRef) -> SymbolId {
    (sym.kind, sym.name.clone())
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    provided: BTreeMap<SnippetId, Vec<SymbolRef>>,
    definers: BTreeMap<SymbolId, BTreeSet<SnippetId>>,
    references: BTreeMap<SnippetId, Vec<SymbolRef>>,
    referrers: BTreeMap<SymbolId, BTreeSet<SnippetId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of symbols `snippet` defines.
    pub fn record_definitions(&mut self, snippet: SnippetId, symbols: Vec<SymbolRef>) {
        self.clear_definitions(snippet);
        for sym in &symbols {
            self.definers
                .entry(symbol_id(sym))
                .or_default()
                .insert(snippet);
        }
        self.provided.insert(snippet, symbols);
    }

    /// Replace the set of symbols `snippet` references.
    pub fn record_references(&mut self, snippet: SnippetId, symbols: Vec<SymbolRef>) {
        self.clear_references(snippet);
        let mut seen = Vec::new();
        for sym in symbols {
            if seen.contains(&sym) {
                continue;
            }
            self.referrers
                .entry(symbol_id(&sym))
                .or_default()
                .insert(snippet);
            seen.push(sym);
        }
        self.references.insert(snippet, seen);
    }

    /// Remove everything known about a snippet leaving the active set.
    pub fn forget(&mut self, snippet: SnippetId) {
        self.clear_definitions(snippet);
        self.clear_references(snippet);
    }

    fn clear_definitions(&mut self, snippet: SnippetId) {
        if let Some(old) = self.provided.remove(&snippet) {
            for sym in &old {
                let id = symbol_id(sym);
                if let Some(set) = self.definers.get_mut(&id) {
                    set.remove(&snippet);
                    if set.is_empty() {
                        self.definers.remove(&id);
                    }
                }
            }
        }
    }

    fn clear_references(&mut self, snippet: SnippetId) {
        if let Some(old) = self.references.remove(&snippet) {
            for sym in &old {
                let id = symbol_id(sym);
                if let Some(set) = self.referrers.get_mut(&id) {
                    set.remove(&snippet);
                    if set.is_empty() {
                        self.referrers.remove(&id);
                    }
                }
            }
        }
    }

    pub fn provided(&self, snippet: SnippetId) -> &[SymbolRef] {
        self.provided
            .get(&snippet)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn references(&self, snippet: SnippetId) -> &[SymbolRef] {
        self.references
            .get(&snippet)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Is `wanted` provided by some active snippet in a defined status?
    pub fn resolvable<U>(&self, wanted: &SymbolRef, registry: &SnippetRegistry<U>) -> bool {
        let Some(candidates) = self.definers.get(&symbol_id(wanted)) else {
            return false;
        };
        candidates.iter().any(|&id| {
            registry.status_of(id).map(|s| s.is_defined()).unwrap_or(false)
                && self.provided(id).iter().any(|def| def.provides(wanted))
        })
    }

    /// Snippets that reference `name` in the namespace `kind`.
    pub fn dependents(&self, kind: SymbolKind, name: &str) -> BTreeSet<SnippetId> {
        self.referrers
            .get(&(kind, SymbolName::from(name)))
            .cloned()
            .unwrap_or_default()
    }

    /// Snippets that reference any symbol `snippet` defines, excluding itself.
    pub fn dependents_of(&self, snippet: SnippetId) -> BTreeSet<SnippetId> {
        let mut out = BTreeSet::new();
        for sym in self.provided(snippet) {
            out.extend(self.dependents(sym.kind, &sym.name));
        }
        out.remove(&snippet);
        out
    }

    /// Descriptors of the references of `snippet` that currently resolve to
    /// nothing, in first-reference order.
    pub fn unresolved_of<U>(&self, snippet: SnippetId, registry: &SnippetRegistry<U>) -> Vec<String> {
        self.references(snippet)
            .iter()
            .filter(|sym| !self.resolvable(sym, registry))
            .map(|sym| sym.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippet::{SnippetKind, Status};

    fn registry_with(statuses: &[Status]) -> SnippetRegistry<()> {
        let mut reg = SnippetRegistry::new();
        for &status in statuses {
            let s = reg.create("x", SnippetKind::Statement, None);
            reg.set_status(s.id, status).unwrap();
        }
        reg
    }

    #[test]
    fn resolvable_requires_defined_status() {
        let reg = registry_with(&[Status::Valid, Status::RecoverableNotDefined]);
        let mut g = DependencyGraph::new();
        g.record_definitions(SnippetId(1), vec![SymbolRef::method::<&str>("g", &[])]);
        g.record_definitions(SnippetId(2), vec![SymbolRef::ty("B")]);
        assert!(g.resolvable(&SymbolRef::method::<&str>("g", &[]), &reg));
        assert!(!g.resolvable(&SymbolRef::method("g", &["int"]), &reg));
        assert!(!g.resolvable(&SymbolRef::ty("B"), &reg));
        assert!(!g.resolvable(&SymbolRef::ty("C"), &reg));
    }

    #[test]
    fn unresolved_is_recomputed_from_live_definitions() {
        let mut reg = registry_with(&[Status::RecoverableDefined]);
        let mut g = DependencyGraph::new();
        let x = SnippetId(1);
        g.record_references(x, vec![SymbolRef::method::<&str>("g", &[])]);
        assert_eq!(g.unresolved_of(x, &reg), vec!["method g()".to_string()]);

        let def = reg.create("int g() { return 5; }", SnippetKind::Statement, None);
        reg.set_status(def.id, Status::Valid).unwrap();
        g.record_definitions(def.id, vec![SymbolRef::method::<&str>("g", &[])]);
        assert!(g.unresolved_of(x, &reg).is_empty());

        reg.set_status(def.id, Status::Dropped).unwrap();
        assert_eq!(g.unresolved_of(x, &reg), vec!["method g()".to_string()]);
        g.forget(def.id);
        assert!(g.dependents_of(def.id).is_empty());
    }

    #[test]
    fn dependents_follow_names_not_overloads() {
        let mut g = DependencyGraph::new();
        g.record_references(SnippetId(3), vec![SymbolRef::method("f", &["int"])]);
        g.record_references(SnippetId(4), vec![SymbolRef::method("f", &["String"])]);
        g.record_references(SnippetId(5), vec![SymbolRef::variable("f")]);
        g.record_definitions(SnippetId(1), vec![SymbolRef::method("f", &["int"])]);
        let deps: Vec<_> = g.dependents_of(SnippetId(1)).into_iter().collect();
        assert_eq!(deps, vec![SnippetId(3), SnippetId(4)]);
    }

    #[test]
    fn rerecording_replaces_references() {
        let mut g = DependencyGraph::new();
        g.record_references(SnippetId(2), vec![SymbolRef::ty("A"), SymbolRef::ty("A")]);
        assert_eq!(g.references(SnippetId(2)).len(), 1);
        g.record_references(SnippetId(2), vec![SymbolRef::ty("B")]);
        assert!(g.dependents(SymbolKind::Type, "A").is_empty());
        assert!(g.dependents(SymbolKind::Type, "B").contains(&SnippetId(2)));
    }
}
