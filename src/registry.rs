//! Snippet arena: every snippet ever submitted, indexed by id, plus the
//! current holder of each declaration key.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::error::{Diag, EngineError};
use crate::names::SnippetId;
use crate::snippet::{DeclKey, Snippet, SnippetFilter, SnippetKind, Status};

pub struct SnippetRecord<U> {
    pub snippet: Snippet,
    status: Status,
    unit: Option<U>,
    diagnostics: Vec<Diag>,
    signature: String,
}

impl<U> SnippetRecord<U> {
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn unit(&self) -> Option<&U> {
        self.unit.as_ref()
    }
}

pub struct SnippetRegistry<U> {
    records: Vec<SnippetRecord<U>>,
    holders: HashMap<DeclKey, SnippetId>,
}

impl<U> Default for SnippetRegistry<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> SnippetRegistry<U> {
    pub fn new() -> Self {
        SnippetRegistry {
            records: Vec::new(),
            holders: HashMap::new(),
        }
    }

    /// The id the next `create` call will assign.
    pub fn next_id(&self) -> SnippetId {
        SnippetId(self.records.len() as u32 + 1)
    }

    /// Allocate a new snippet in state NONEXISTENT.
    pub fn create(&mut self, source: &str, kind: SnippetKind, unit: Option<U>) -> Snippet {
        let snippet = Snippet {
            id: self.next_id(),
            kind,
            source: source.to_string(),
        };
        self.records.push(SnippetRecord {
            snippet: snippet.clone(),
            status: Status::Nonexistent,
            unit,
            diagnostics: Vec::new(),
            signature: String::new(),
        });
        snippet
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: SnippetId) -> Result<&SnippetRecord<U>, EngineError> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|i| self.records.get(i))
            .ok_or(EngineError::NoSuchSnippet(id))
    }

    fn record_mut(&mut self, id: SnippetId) -> Result<&mut SnippetRecord<U>, EngineError> {
        (id.0 as usize)
            .checked_sub(1)
            .and_then(|i| self.records.get_mut(i))
            .ok_or(EngineError::NoSuchSnippet(id))
    }

    pub fn get(&self, id: SnippetId) -> Option<&Snippet> {
        self.record(id).ok().map(|r| &r.snippet)
    }

    pub fn status_of(&self, id: SnippetId) -> Result<Status, EngineError> {
        self.record(id).map(|r| r.status)
    }

    pub fn unit(&self, id: SnippetId) -> Option<&U> {
        self.record(id).ok().and_then(|r| r.unit.as_ref())
    }

    pub fn diagnostics(&self, id: SnippetId) -> &[Diag] {
        self.record(id).map(|r| r.diagnostics.as_slice()).unwrap_or(&[])
    }

    /// Hash of the snippet's last compiled signature.
    pub fn signature(&self, id: SnippetId) -> Option<&str> {
        self.record(id).ok().map(|r| r.signature.as_str())
    }

    /// Store the outcome of a (re)compilation.
    pub fn set_compiled(
        &mut self,
        id: SnippetId,
        diagnostics: Vec<Diag>,
        signature: String,
    ) -> Result<(), EngineError> {
        let record = self.record_mut(id)?;
        record.diagnostics = diagnostics;
        record.signature = signature;
        Ok(())
    }

    /// Replace a snippet's classification after recompilation. The
    /// declaration key must not change.
    pub fn set_kind(&mut self, id: SnippetId, kind: SnippetKind) -> Result<(), EngineError> {
        let record = self.record_mut(id)?;
        if record.snippet.kind.key() != kind.key() {
            return Err(EngineError::Internal(format!(
                "snippet {} cannot change its key to {:?}",
                id,
                kind.key()
            )));
        }
        record.snippet.kind = kind;
        Ok(())
    }

    /// The active snippet currently holding `key`.
    pub fn holder(&self, key: &DeclKey) -> Option<SnippetId> {
        self.holders.get(key).copied()
    }

    /// The only status mutator. Terminal statuses are permanent.
    pub fn set_status(&mut self, id: SnippetId, status: Status) -> Result<(), EngineError> {
        let holder = {
            let record = self.record(id)?;
            if record.status.is_terminal() {
                return Err(EngineError::Internal(format!(
                    "snippet {} is {} and cannot become {}",
                    id, record.status, status
                )));
            }
            if status == Status::Nonexistent {
                return Err(EngineError::Internal(format!(
                    "snippet {} cannot return to NONEXISTENT",
                    id
                )));
            }
            record.snippet.key()
        };
        if let Some(key) = holder {
            if status.is_active() {
                if let Some(other) = self.holders.get(&key).copied() {
                    if other != id && self.status_of(other)?.is_active() {
                        return Err(EngineError::Internal(format!(
                            "snippets {} and {} would both hold {:?}",
                            other, id, key
                        )));
                    }
                }
                self.holders.insert(key, id);
            } else if self.holders.get(&key) == Some(&id) {
                self.holders.remove(&key);
            }
        }
        self.record_mut(id)?.status = status;
        Ok(())
    }

    /// Active snippets in creation order.
    pub fn active_snippets(&self, filter: SnippetFilter) -> ActiveSnippets<'_, U> {
        ActiveSnippets {
            records: self.records.iter(),
            filter,
        }
    }

    /// Every snippet ever created, in creation order.
    pub fn snippets(&self) -> impl Iterator<Item = &SnippetRecord<U>> + '_ {
        self.records.iter()
    }
}

/// Lazy, restartable iterator over active snippets.
pub struct ActiveSnippets<'a, U> {
    records: std::slice::Iter<'a, SnippetRecord<U>>,
    filter: SnippetFilter,
}

impl<U> Clone for ActiveSnippets<'_, U> {
    fn clone(&self) -> Self {
        ActiveSnippets {
            records: self.records.clone(),
            filter: self.filter,
        }
    }
}

impl<'a, U> Iterator for ActiveSnippets<'a, U> {
    type Item = &'a Snippet;

    fn next(&mut self) -> Option<&'a Snippet> {
        let filter = self.filter;
        self.records
            .by_ref()
            .find(|r| r.status.is_active() && filter.accepts(&r.snippet))
            .map(|r| &r.snippet)
    }
}

/// SHA-256 of a canonical signature string, hex encoded.
pub fn hash_signature(signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippet::{Kind, SubKind};

    fn class(name: &str) -> SnippetKind {
        SnippetKind::TypeDecl {
            name: name.into(),
            sub: SubKind::Class,
        }
    }

    #[test]
    fn ids_are_monotonic() {
        let mut reg: SnippetRegistry<()> = SnippetRegistry::new();
        let a = reg.create("class A {}", class("A"), None);
        let b = reg.create("1 + 1", SnippetKind::Statement, None);
        assert_eq!(a.id, SnippetId(1));
        assert_eq!(b.id, SnippetId(2));
        assert_eq!(reg.next_id(), SnippetId(3));
        assert_eq!(reg.status_of(a.id).unwrap(), Status::Nonexistent);
    }

    #[test]
    fn terminal_status_is_permanent() {
        let mut reg: SnippetRegistry<()> = SnippetRegistry::new();
        let a = reg.create("class A {}", class("A"), None);
        reg.set_status(a.id, Status::Valid).unwrap();
        reg.set_status(a.id, Status::Dropped).unwrap();
        let err = reg.set_status(a.id, Status::Valid).unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
        assert_eq!(reg.status_of(a.id).unwrap(), Status::Dropped);
    }

    #[test]
    fn unknown_id_is_no_such_snippet() {
        let reg: SnippetRegistry<()> = SnippetRegistry::new();
        assert!(matches!(
            reg.status_of(SnippetId(4)),
            Err(EngineError::NoSuchSnippet(SnippetId(4)))
        ));
        assert!(matches!(
            reg.status_of(SnippetId(0)),
            Err(EngineError::NoSuchSnippet(_))
        ));
    }

    #[test]
    fn one_active_holder_per_key() {
        let mut reg: SnippetRegistry<()> = SnippetRegistry::new();
        let a1 = reg.create("class A {}", class("A"), None);
        let a2 = reg.create("class A { }", class("A"), None);
        reg.set_status(a1.id, Status::Valid).unwrap();
        assert_eq!(reg.holder(&DeclKey::Type("A".into())), Some(a1.id));
        assert!(reg.set_status(a2.id, Status::Valid).is_err());
        reg.set_status(a1.id, Status::Overwritten).unwrap();
        assert_eq!(reg.holder(&DeclKey::Type("A".into())), None);
        reg.set_status(a2.id, Status::Valid).unwrap();
        assert_eq!(reg.holder(&DeclKey::Type("A".into())), Some(a2.id));
    }

    #[test]
    fn active_iteration_is_ordered_and_restartable() {
        let mut reg: SnippetRegistry<()> = SnippetRegistry::new();
        let a = reg.create("class A {}", class("A"), None);
        let s = reg.create("f();", SnippetKind::Statement, None);
        let b = reg.create("class B {}", class("B"), None);
        let c = reg.create("class C {}", class("C"), None);
        for id in [a.id, s.id, b.id, c.id] {
            reg.set_status(id, Status::Valid).unwrap();
        }
        reg.set_status(b.id, Status::Dropped).unwrap();

        let iter = reg.active_snippets(SnippetFilter::Kind(Kind::TypeDecl));
        let first: Vec<SnippetId> = iter.clone().map(|s| s.id).collect();
        let second: Vec<SnippetId> = iter.map(|s| s.id).collect();
        assert_eq!(first, vec![a.id, c.id]);
        assert_eq!(first, second);
        assert_eq!(reg.active_snippets(SnippetFilter::All).count(), 3);
    }

    #[test]
    fn kind_updates_keep_the_key() {
        let mut reg: SnippetRegistry<()> = SnippetRegistry::new();
        let var = |type_name: &str| SnippetKind::Var {
            name: "v".into(),
            type_name: type_name.into(),
            sub: SubKind::VarDeclarationWithInitializer,
        };
        let v = reg.create("var v = f();", var("int"), None);
        reg.set_kind(v.id, var("String")).unwrap();
        assert_eq!(reg.get(v.id).unwrap().kind, var("String"));
        assert!(matches!(
            reg.set_kind(v.id, class("v")),
            Err(EngineError::Internal(_))
        ));
        assert_eq!(reg.get(v.id).unwrap().kind, var("String"));
    }

    #[test]
    fn signature_hash_is_stable() {
        assert_eq!(hash_signature("int f(int)"), hash_signature("int f(int)"));
        assert_ne!(hash_signature("int f(int)"), hash_signature("int f(long)"));
        assert_eq!(hash_signature("").len(), 64);
    }
}
