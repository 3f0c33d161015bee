//! The snippet state machine: classification, supersession, cascading
//! recompilation and event emission.

mod cascade;

use tracing::{debug, error, warn};

use crate::deps::DependencyGraph;
use crate::error::{Diag, EngineError};
use crate::events::{EventDispatcher, EventHandler, SnippetEvent, SubscriptionToken, Superseded};
use crate::exec::{Access, ExecFailure, ExecOutcome, ExecutionBackend, StopHandle};
use crate::names::{SnippetId, SymbolKind};
use crate::oracle::{CompileReport, CompileRequest, LiveUnit, Parsed, SymbolOracle};
use crate::registry::{hash_signature, ActiveSnippets, SnippetRegistry};
use crate::snippet::{Kind, Snippet, SnippetFilter, SnippetKind, Status};

use cascade::Cascade;

/// Upper bound on recompilations performed by one `eval` or `drop`.
pub const DEFAULT_CASCADE_LIMIT: usize = 10_000;

/// Names visible in the session, copied out for background consumers.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub symbols: Vec<(SymbolKind, String)>,
}

pub struct Engine<O, B>
where
    O: SymbolOracle,
    B: ExecutionBackend<Unit = O::Unit>,
{
    oracle: O,
    backend: B,
    registry: SnippetRegistry<O::Unit>,
    deps: DependencyGraph,
    dispatcher: EventDispatcher,
    cascade_limit: usize,
    closed: bool,
}

fn status_after_submit(report: &CompileReport) -> Status {
    if report.has_errors() {
        Status::Rejected
    } else {
        status_after_recompile(report)
    }
}

/// Recompiled snippets are never rejected; errors make them not-defined.
fn status_after_recompile(report: &CompileReport) -> Status {
    if report.has_errors() || report.blocks_shape() {
        Status::RecoverableNotDefined
    } else if !report.unresolved.is_empty() {
        Status::RecoverableDefined
    } else {
        Status::Valid
    }
}

fn check_events(events: &[SnippetEvent]) -> Result<(), EngineError> {
    match events.iter().find(|e| e.previous_status.is_terminal()) {
        Some(event) => {
            error!(
                snippet = %event.snippet,
                from = %event.previous_status,
                "event leaves a terminal status"
            );
            Err(EngineError::Internal(format!(
                "snippet {} cannot leave {}",
                event.snippet, event.previous_status
            )))
        }
        None => Ok(()),
    }
}

impl<O, B> Engine<O, B>
where
    O: SymbolOracle,
    B: ExecutionBackend<Unit = O::Unit>,
{
    pub fn new(oracle: O, backend: B) -> Self {
        Engine {
            oracle,
            backend,
            registry: SnippetRegistry::new(),
            deps: DependencyGraph::new(),
            dispatcher: EventDispatcher::new(),
            cascade_limit: DEFAULT_CASCADE_LIMIT,
            closed: false,
        }
    }

    pub fn with_cascade_limit(mut self, limit: usize) -> Self {
        self.cascade_limit = limit;
        self
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Refuse further work. The backend is released when the engine drops.
    pub fn close(&mut self) {
        self.closed = true;
    }

    // ── Evaluation ────────────────────────────────────────────────────────

    /// Submit one snippet. Returns every status transition it caused, the
    /// submitted snippet's first; subscribers have seen them all by the
    /// time this returns.
    pub fn eval(&mut self, source: &str) -> Result<Vec<SnippetEvent>, EngineError> {
        self.ensure_open()?;
        let (unit, parsed_kind) = match self.oracle.parse(source) {
            Parsed::Unit { unit, kind } => (unit, kind),
            Parsed::Erroneous { diagnostics } => return self.reject_unparsed(source, diagnostics),
        };

        let id = self.registry.next_id();
        let prior = parsed_kind.key().and_then(|key| self.registry.holder(&key));
        let report = {
            let exclude: Vec<SnippetId> = prior.into_iter().collect();
            let live = self.live_units(&exclude);
            self.oracle.compile(&CompileRequest {
                id,
                unit: &unit,
                live: &live,
            })
        };
        let status = status_after_submit(&report);
        let signature = hash_signature(&report.signature);
        let snippet = self.registry.create(source, report.kind.clone(), Some(unit));
        if snippet.id != id {
            return Err(EngineError::Internal(format!(
                "expected snippet id {}, registry assigned {}",
                id, snippet.id
            )));
        }
        self.registry
            .set_compiled(id, report.diagnostics.clone(), signature.clone())?;

        let mut cascade = Cascade::new(id, self.cascade_limit);
        if status == Status::Rejected {
            debug!(snippet = %id, "rejected");
            self.registry.set_status(id, Status::Rejected)?;
            cascade.record(id, Status::Nonexistent, Status::Rejected, false, None);
            return self.finish(cascade);
        }

        // Retire the previous holder of the key before the new one goes live.
        let mut superseded = None;
        let mut old_provided = Vec::new();
        if let Some(old) = prior {
            let old_status = self.registry.status_of(old)?;
            let old_signature = self.registry.signature(old).unwrap_or_default().to_string();
            self.registry.set_status(old, Status::Overwritten)?;
            old_provided = self.deps.provided(old).to_vec();
            self.deps.forget(old);
            self.unlink(old)?;
            debug!(snippet = %old, by = %id, "overwritten");
            superseded = Some((
                Superseded {
                    snippet: old,
                    status: old_status,
                },
                old_signature,
            ));
        }

        self.registry.set_status(id, status)?;
        self.deps.record_definitions(id, report.defines);
        self.deps.record_references(id, report.references);
        self.link(id)?;
        debug!(snippet = %id, status = %status, kind = ?snippet.kind(), "accepted");

        let previous = superseded
            .as_ref()
            .map(|(s, _)| s.status)
            .unwrap_or(Status::Nonexistent);
        let signature_change = superseded
            .as_ref()
            .map_or(true, |(_, old_sig)| *old_sig != signature);
        cascade.record(id, Status::Nonexistent, status, signature_change, None);
        if let Some((sup, _)) = &superseded {
            cascade.set_superseded(id, *sup);
            cascade.record(sup.snippet, sup.status, Status::Overwritten, false, Some(id));
        }

        if signature_change || previous.is_defined() != status.is_defined() {
            cascade.enqueue(self.deps.dependents_of(id), id);
            for sym in &old_provided {
                let mut dependents = self.deps.dependents(sym.kind, &sym.name);
                dependents.remove(&id);
                cascade.enqueue(dependents, id);
            }
        }

        self.run_cascade(&mut cascade)?;
        self.execute(&mut cascade)?;
        self.finish(cascade)
    }

    fn reject_unparsed(
        &mut self,
        source: &str,
        diagnostics: Vec<Diag>,
    ) -> Result<Vec<SnippetEvent>, EngineError> {
        let snippet = self.registry.create(source, SnippetKind::Erroneous, None);
        self.registry
            .set_compiled(snippet.id, diagnostics, String::new())?;
        self.registry.set_status(snippet.id, Status::Rejected)?;
        debug!(snippet = %snippet.id, "rejected by parser");
        let mut cascade = Cascade::new(snippet.id, self.cascade_limit);
        cascade.record(snippet.id, Status::Nonexistent, Status::Rejected, false, None);
        self.finish(cascade)
    }

    /// Drop an active declaration; dependents are recompiled without it.
    pub fn drop(&mut self, id: SnippetId) -> Result<Vec<SnippetEvent>, EngineError> {
        self.ensure_open()?;
        let before = self.registry.status_of(id)?;
        if !before.is_active() {
            return Err(EngineError::NoSuchSnippet(id));
        }
        let is_declaration = self
            .registry
            .get(id)
            .map(|s| s.kind.is_declaration())
            .unwrap_or(false);
        if !is_declaration {
            return Err(EngineError::NotDroppable(id));
        }

        self.registry.set_status(id, Status::Dropped)?;
        let dependents = self.deps.dependents_of(id);
        self.deps.forget(id);
        self.unlink(id)?;
        debug!(snippet = %id, "dropped");

        let mut cascade = Cascade::new(id, self.cascade_limit);
        cascade.record(id, before, Status::Dropped, true, None);
        if before.is_defined() {
            cascade.enqueue(dependents, id);
        }
        self.run_cascade(&mut cascade)?;
        self.execute(&mut cascade)?;
        self.finish(cascade)
    }

    fn run_cascade(&mut self, cascade: &mut Cascade) -> Result<(), EngineError> {
        while let Some(id) = cascade.next()? {
            let before = self.registry.status_of(id)?;
            if !before.is_active() {
                continue;
            }
            let report = self.recompile(id)?;
            let status = status_after_recompile(&report);
            let signature = hash_signature(&report.signature);
            let signature_change = self.registry.signature(id) != Some(signature.as_str());
            let reclassified = !report.has_errors()
                && self.registry.get(id).map(|s| s.key()) == Some(report.kind.key())
                && self.registry.get(id).map(|s| &s.kind) != Some(&report.kind);
            if reclassified {
                debug!(snippet = %id, kind = ?report.kind, "reclassified");
                self.registry.set_kind(id, report.kind)?;
            }
            self.registry.set_compiled(id, report.diagnostics, signature)?;
            if status != before {
                self.registry.set_status(id, status)?;
                debug!(snippet = %id, from = %before, to = %status, "updated");
            }
            self.deps.record_definitions(id, report.defines);
            self.deps.record_references(id, report.references);
            self.link(id)?;
            cascade.record(id, before, status, signature_change, None);

            if signature_change || before.is_defined() != status.is_defined() {
                cascade.enqueue(self.deps.dependents_of(id), id);
            }
        }
        Ok(())
    }

    fn recompile(&self, id: SnippetId) -> Result<CompileReport, EngineError> {
        let unit = self.registry.unit(id).ok_or_else(|| {
            EngineError::Internal(format!("active snippet {} has no compiled unit", id))
        })?;
        let live = self.live_units(&[id]);
        Ok(self.oracle.compile(&CompileRequest {
            id,
            unit,
            live: &live,
        }))
    }

    fn live_units(&self, exclude: &[SnippetId]) -> Vec<LiveUnit<'_, O::Unit>> {
        self.registry
            .snippets()
            .filter(|r| r.status().is_active() && r.snippet.kind.is_declaration())
            .filter(|r| !exclude.contains(&r.snippet.id))
            .filter_map(|r| {
                r.unit().map(|unit| LiveUnit {
                    id: r.snippet.id,
                    unit,
                    kind: &r.snippet.kind,
                    status: r.status(),
                })
            })
            .collect()
    }

    /// Install a declaration in the backend according to its status.
    fn link(&mut self, id: SnippetId) -> Result<(), EngineError> {
        let status = self.registry.status_of(id)?;
        let access = if status == Status::Valid {
            Access::Ready
        } else {
            Access::Blocked {
                blockers: self.deps.unresolved_of(id, &self.registry),
            }
        };
        let record = self.registry.record(id)?;
        if record.snippet.kind.is_declaration() {
            if let Some(unit) = record.unit() {
                self.backend.define(&record.snippet, unit, access);
            }
        }
        Ok(())
    }

    fn unlink(&mut self, id: SnippetId) -> Result<(), EngineError> {
        let record = self.registry.record(id)?;
        if let Some(unit) = record.unit() {
            self.backend.remove(&record.snippet, unit);
        }
        Ok(())
    }

    /// Run the root snippet if it is executable and VALID, then initializers
    /// of variables the cascade made VALID or retyped, in id order.
    fn execute(&mut self, cascade: &mut Cascade) -> Result<(), EngineError> {
        let root = cascade.root();
        let mut runnable = Vec::new();
        if self.registry.status_of(root)? == Status::Valid {
            runnable.push(root);
        }
        for event in cascade.events() {
            if event.snippet != root
                && event.status == Status::Valid
                && (event.previous_status != Status::Valid || event.is_signature_change)
                && self.registry.get(event.snippet).map(Snippet::kind) == Some(Kind::Var)
            {
                runnable.push(event.snippet);
            }
        }

        for id in runnable {
            let record = self.registry.record(id)?;
            if !record.snippet.kind.is_executable() {
                continue;
            }
            let Some(unit) = record.unit() else {
                continue;
            };
            match self.backend.run(&record.snippet, unit) {
                ExecOutcome::Completed { value } => cascade.set_outcome(id, value, None),
                ExecOutcome::Failed(failure) => {
                    let terminated = matches!(failure, ExecFailure::Terminated { .. });
                    if terminated {
                        warn!(snippet = %id, "execution backend terminated; closing session");
                        self.closed = true;
                    }
                    cascade.set_outcome(id, None, Some(failure));
                    if terminated {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Publish a finished cascade. Events that would leave a terminal
    /// status are an engine bug and are not published.
    fn finish(&mut self, cascade: Cascade) -> Result<Vec<SnippetEvent>, EngineError> {
        let events = cascade.into_events();
        check_events(&events)?;
        self.dispatcher.publish(&events);
        Ok(events)
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn status(&self, id: SnippetId) -> Result<Status, EngineError> {
        self.registry.status_of(id)
    }

    pub fn snippet(&self, id: SnippetId) -> Option<&Snippet> {
        self.registry.get(id)
    }

    /// Every snippet ever submitted, with its current status.
    pub fn snippets(&self) -> impl Iterator<Item = (&Snippet, Status)> + '_ {
        self.registry.snippets().map(|r| (&r.snippet, r.status()))
    }

    pub fn active_snippets(&self, filter: SnippetFilter) -> ActiveSnippets<'_, O::Unit> {
        self.registry.active_snippets(filter)
    }

    pub fn variables(&self) -> ActiveSnippets<'_, O::Unit> {
        self.active_snippets(SnippetFilter::Kind(Kind::Var))
    }

    pub fn methods(&self) -> ActiveSnippets<'_, O::Unit> {
        self.active_snippets(SnippetFilter::Kind(Kind::Method))
    }

    pub fn types(&self) -> ActiveSnippets<'_, O::Unit> {
        self.active_snippets(SnippetFilter::Kind(Kind::TypeDecl))
    }

    pub fn imports(&self) -> ActiveSnippets<'_, O::Unit> {
        self.active_snippets(SnippetFilter::Kind(Kind::Import))
    }

    /// Descriptors of the names `id` is waiting on, e.g. `method g()`.
    pub fn unresolved_dependencies(&self, id: SnippetId) -> Result<Vec<String>, EngineError> {
        self.registry.status_of(id)?;
        Ok(self.deps.unresolved_of(id, &self.registry))
    }

    pub fn diagnostics(&self, id: SnippetId) -> Result<&[Diag], EngineError> {
        self.registry.status_of(id)?;
        Ok(self.registry.diagnostics(id))
    }

    /// Current value of an active variable.
    pub fn var_value(&mut self, id: SnippetId) -> Result<ExecOutcome, EngineError> {
        self.ensure_open()?;
        let record = self.registry.record(id)?;
        if !record.status().is_active() || record.snippet.kind() != Kind::Var {
            return Err(EngineError::NoSuchSnippet(id));
        }
        Ok(self.backend.var_value(&record.snippet))
    }

    /// Names of the active declarations that other snippets can use.
    pub fn snapshot(&self) -> Snapshot {
        let symbols = self
            .registry
            .active_snippets(SnippetFilter::Declarations)
            .filter(|s| self.registry.status_of(s.id).map(Status::is_defined).unwrap_or(false))
            .flat_map(|s| self.deps.provided(s.id).iter())
            .map(|sym| (sym.kind, sym.name.to_string()))
            .collect();
        Snapshot { symbols }
    }

    // ── Events and control ────────────────────────────────────────────────

    pub fn subscribe(&mut self, handler: EventHandler) -> SubscriptionToken {
        self.dispatcher.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) -> bool {
        self.dispatcher.unsubscribe(token)
    }

    /// A handle that can interrupt running user code from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.backend.stop_handle()
    }

    pub fn stop(&self) {
        self.backend.stop_handle().stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u32, previous: Status, status: Status) -> SnippetEvent {
        SnippetEvent {
            snippet: SnippetId(id),
            previous_status: previous,
            status,
            is_signature_change: false,
            cause: None,
            value: None,
            exception: None,
            superseded: None,
        }
    }

    #[test]
    fn events_leaving_terminal_statuses_are_internal_errors() {
        let ok = [
            event(2, Status::Nonexistent, Status::Valid),
            event(1, Status::Valid, Status::Overwritten),
        ];
        assert!(check_events(&ok).is_ok());

        let bad = [
            event(3, Status::Nonexistent, Status::Valid),
            event(1, Status::Dropped, Status::Valid),
        ];
        match check_events(&bad) {
            Err(EngineError::Internal(msg)) => {
                assert!(msg.starts_with("snippet 1 cannot leave"), "{}", msg)
            }
            other => panic!("expected an internal error, got {:?}", other),
        }
    }
}
