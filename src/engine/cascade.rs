use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::trace;

use crate::error::EngineError;
use crate::events::{SnippetEvent, Superseded};
use crate::exec::ExecFailure;
use crate::names::SnippetId;
use crate::snippet::Status;

/// Work list and event accumulator for one `eval` or `drop`.
///
/// Every snippet gets at most one event: the first previous status it was
/// seen in and the last status it settled on. Causes are flattened to the
/// root of the call by walking the trigger chain.
pub(crate) struct Cascade {
    root: SnippetId,
    queue: BTreeSet<SnippetId>,
    triggers: HashMap<SnippetId, SnippetId>,
    events: BTreeMap<SnippetId, SnippetEvent>,
    steps: usize,
    limit: usize,
}

impl Cascade {
    pub fn new(root: SnippetId, limit: usize) -> Self {
        Cascade {
            root,
            queue: BTreeSet::new(),
            triggers: HashMap::new(),
            events: BTreeMap::new(),
            steps: 0,
            limit,
        }
    }

    pub fn root(&self) -> SnippetId {
        self.root
    }

    pub fn enqueue(&mut self, ids: impl IntoIterator<Item = SnippetId>, trigger: SnippetId) {
        for id in ids {
            if id != self.root {
                self.triggers.entry(id).or_insert(trigger);
            }
            if self.queue.insert(id) {
                trace!(snippet = %id, trigger = %trigger, "queued for recompilation");
            }
        }
    }

    /// Next snippet to recompile, lowest id first.
    pub fn next(&mut self) -> Result<Option<SnippetId>, EngineError> {
        let Some(id) = self.queue.pop_first() else {
            return Ok(None);
        };
        self.steps += 1;
        if self.steps > self.limit {
            return Err(EngineError::Internal(format!(
                "update cascade from snippet {} did not settle after {} recompilations",
                self.root, self.limit
            )));
        }
        Ok(Some(id))
    }

    pub fn record(
        &mut self,
        id: SnippetId,
        previous: Status,
        status: Status,
        signature_change: bool,
        trigger: Option<SnippetId>,
    ) {
        if let (Some(t), true) = (trigger, id != self.root) {
            self.triggers.entry(id).or_insert(t);
        }
        let cause = self.cause_of(id);
        match self.events.entry(id) {
            Entry::Occupied(mut e) => {
                let event = e.get_mut();
                event.status = status;
                event.is_signature_change |= signature_change;
            }
            Entry::Vacant(e) => {
                e.insert(SnippetEvent {
                    snippet: id,
                    previous_status: previous,
                    status,
                    is_signature_change: signature_change,
                    cause,
                    value: None,
                    exception: None,
                    superseded: None,
                });
            }
        }
    }

    fn cause_of(&self, id: SnippetId) -> Option<SnippetId> {
        if id == self.root {
            return None;
        }
        let mut current = id;
        let mut seen = HashSet::new();
        while let Some(&next) = self.triggers.get(&current) {
            if !seen.insert(current) {
                break;
            }
            current = next;
        }
        Some(current)
    }

    pub fn set_superseded(&mut self, id: SnippetId, superseded: Superseded) {
        if let Some(event) = self.events.get_mut(&id) {
            event.superseded = Some(superseded);
        }
    }

    pub fn set_outcome(&mut self, id: SnippetId, value: Option<String>, exception: Option<ExecFailure>) {
        if let Some(event) = self.events.get_mut(&id) {
            event.value = value;
            event.exception = exception;
        }
    }

    pub fn events(&self) -> impl Iterator<Item = &SnippetEvent> {
        self.events.values()
    }

    /// Root event first, then the rest by ascending snippet id.
    pub fn into_events(mut self) -> Vec<SnippetEvent> {
        let mut out = Vec::with_capacity(self.events.len());
        if let Some(root) = self.events.remove(&self.root) {
            out.push(root);
        }
        out.extend(self.events.into_values());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> SnippetId {
        SnippetId(n)
    }

    #[test]
    fn root_first_then_ascending() {
        let mut c = Cascade::new(id(5), 100);
        c.record(id(5), Status::Nonexistent, Status::Valid, true, None);
        c.record(id(3), Status::RecoverableDefined, Status::Valid, false, Some(id(5)));
        c.record(id(1), Status::Valid, Status::Overwritten, false, Some(id(5)));
        let order: Vec<SnippetId> = c.into_events().iter().map(|e| e.snippet).collect();
        assert_eq!(order, vec![id(5), id(1), id(3)]);
    }

    #[test]
    fn causes_flatten_to_root() {
        let mut c = Cascade::new(id(4), 100);
        c.record(id(4), Status::Nonexistent, Status::Valid, true, None);
        c.enqueue([id(2)], id(4));
        c.enqueue([id(1)], id(2));
        c.record(id(2), Status::Valid, Status::Valid, true, None);
        c.record(id(1), Status::Valid, Status::RecoverableDefined, false, None);
        let events = c.into_events();
        assert_eq!(events[0].cause, None);
        assert!(events[1..].iter().all(|e| e.cause == Some(id(4))));
    }

    #[test]
    fn revisits_merge_into_one_event() {
        let mut c = Cascade::new(id(9), 100);
        c.record(id(2), Status::RecoverableDefined, Status::Valid, false, Some(id(9)));
        c.record(id(2), Status::Valid, Status::RecoverableDefined, true, Some(id(3)));
        let events = c.into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].previous_status, Status::RecoverableDefined);
        assert_eq!(events[0].status, Status::RecoverableDefined);
        assert!(events[0].is_signature_change);
        assert_eq!(events[0].cause, Some(id(9)));
    }

    #[test]
    fn trigger_cycles_terminate() {
        let mut c = Cascade::new(id(9), 100);
        c.enqueue([id(1)], id(2));
        c.enqueue([id(2)], id(1));
        c.record(id(1), Status::Valid, Status::Valid, false, None);
        assert_eq!(c.events().count(), 1);
    }

    #[test]
    fn queue_is_bounded() {
        let mut c = Cascade::new(id(1), 2);
        c.enqueue([id(2), id(3), id(4)], id(1));
        assert_eq!(c.next().unwrap(), Some(id(2)));
        assert_eq!(c.next().unwrap(), Some(id(3)));
        assert!(matches!(c.next(), Err(EngineError::Internal(_))));
    }
}
