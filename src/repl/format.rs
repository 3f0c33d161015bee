//! Renders engine events and listings as REPL feedback. Every line is
//! prefixed with `|  `, except values, which read `name ==> value`.

use crate::config::FeedbackMode;
use crate::error::{format_diag, Diag};
use crate::events::SnippetEvent;
use crate::exec::{ExecFailure, ExecOutcome};
use crate::lang::Session;
use crate::names::join_descriptors;
use crate::snippet::{Kind, Snippet, SnippetKind, Status, SubKind};

const BAR: &str = "|  ";

fn bar(line: &str) -> String {
    format!("{}{}", BAR, line)
}

/// Prefix each line of a multi-line block.
fn bar_block(block: &str, out: &mut Vec<String>) {
    out.extend(block.lines().map(bar));
}

pub fn diag_lines(source: &str, diags: &[Diag], out: &mut Vec<String>) {
    for d in diags {
        bar_block(&format_diag(source, d), out);
    }
}

pub fn failure_lines(failure: &ExecFailure, out: &mut Vec<String>) {
    match failure {
        ExecFailure::Exception(e) => {
            out.push(bar(&format!("Exception {}", e)));
            for frame in &e.frames {
                out.push(bar(&format!("      {}", frame)));
            }
        }
        ExecFailure::Unresolved(u) => out.push(bar(&u.to_string())),
        ExecFailure::Stopped => out.push(bar("Execution stopped.")),
        ExecFailure::Terminated { .. } => {}
    }
}

/// What a declaration in a given status cannot do yet.
fn restriction(kind: &SnippetKind, status: Status) -> &'static str {
    match (kind, status) {
        (SnippetKind::Method { .. }, _) => "it cannot be invoked",
        (SnippetKind::TypeDecl { .. }, Status::RecoverableDefined) => {
            "it cannot be instantiated or its methods invoked"
        }
        _ => "it cannot be referenced",
    }
}

/// `, however, it cannot be invoked until method g() is declared`, or
/// nothing for a VALID snippet.
fn recoverable_suffix(session: &Session, snippet: &Snippet, status: Status) -> String {
    if !matches!(
        status,
        Status::RecoverableDefined | Status::RecoverableNotDefined
    ) {
        return String::new();
    }
    let blockers = session.unresolved_dependencies(snippet.id).unwrap_or_default();
    let until = match blockers.len() {
        0 => "this error is corrected".to_string(),
        1 => format!("{} is declared", blockers[0]),
        _ => format!("{} are declared", join_descriptors(&blockers)),
    };
    format!(
        ", however, {} until {}",
        restriction(&snippet.kind, status),
        until
    )
}

fn value_line(name: &str, value: &str) -> String {
    format!("{} ==> {}", name, value)
}

fn is_scratch(snippet: &Snippet) -> bool {
    snippet.sub_kind() == SubKind::TempVarExpression
}

/// Feedback for one `eval` or `drop` call.
pub fn event_lines(session: &Session, events: &[SnippetEvent], mode: FeedbackMode) -> Vec<String> {
    let mut out = Vec::new();
    for event in events {
        let Some(snippet) = session.snippet(event.snippet) else {
            continue;
        };
        if event.cause.is_none() {
            root_lines(session, snippet, event, mode, &mut out);
        } else {
            update_lines(session, snippet, event, mode, &mut out);
        }
    }
    out
}

fn root_lines(
    session: &Session,
    snippet: &Snippet,
    event: &SnippetEvent,
    mode: FeedbackMode,
    out: &mut Vec<String>,
) {
    let diags = session.diagnostics(snippet.id).unwrap_or_default();

    if event.status == Status::Rejected {
        if diags.is_empty() {
            out.push(bar("Error: snippet rejected"));
        }
        diag_lines(&snippet.source, diags, out);
        return;
    }

    if event.status == Status::Dropped {
        if mode >= FeedbackMode::Normal {
            out.push(bar(&format!("dropped {}", snippet.descriptor())));
        }
        return;
    }

    if mode >= FeedbackMode::Normal {
        let warnings: Vec<Diag> = diags.iter().filter(|d| !d.is_error()).cloned().collect();
        diag_lines(&snippet.source, &warnings, out);
    }

    match &snippet.kind {
        SnippetKind::Var { name, type_name, .. } => {
            if let Some(value) = &event.value {
                if mode > FeedbackMode::Silent {
                    out.push(value_line(name, value));
                }
            }
            let suffix = recoverable_suffix(session, snippet, event.status);
            if mode == FeedbackMode::Verbose || (mode == FeedbackMode::Normal && !suffix.is_empty())
            {
                let noun = if is_scratch(snippet) {
                    "scratch variable"
                } else {
                    "variable"
                };
                out.push(bar(&format!(
                    "{} {} {} : {}{}",
                    action(event),
                    noun,
                    name,
                    type_name,
                    suffix
                )));
            }
        }
        SnippetKind::Expression { name, .. } => {
            if let (Some(value), true) = (&event.value, mode > FeedbackMode::Silent) {
                out.push(value_line(name, value));
            }
        }
        SnippetKind::Statement | SnippetKind::Erroneous => {}
        SnippetKind::Import { .. } => {
            if mode == FeedbackMode::Verbose {
                out.push(bar(&format!("{} {}", action(event), snippet.descriptor())));
            }
        }
        SnippetKind::TypeDecl { .. } | SnippetKind::Method { .. } => {
            if mode >= FeedbackMode::Normal {
                out.push(bar(&format!(
                    "{} {}{}",
                    action(event),
                    snippet.descriptor(),
                    recoverable_suffix(session, snippet, event.status)
                )));
            }
        }
    }

    if let Some(failure) = &event.exception {
        failure_lines(failure, out);
    }
}

/// `created`, `modified` (same signature) or `replaced`.
fn action(event: &SnippetEvent) -> &'static str {
    match event.superseded {
        None => "created",
        Some(_) if event.is_signature_change => "replaced",
        Some(_) => "modified",
    }
}

fn update_lines(
    session: &Session,
    snippet: &Snippet,
    event: &SnippetEvent,
    mode: FeedbackMode,
    out: &mut Vec<String>,
) {
    // The replaced declaration is reported by its successor's root line.
    if event.status == Status::Overwritten || mode < FeedbackMode::Normal {
        return;
    }
    let changed = event.previous_status != event.status || event.is_signature_change;
    if !changed && mode < FeedbackMode::Verbose {
        return;
    }
    let word = if event.is_signature_change {
        "replaced"
    } else {
        "modified"
    };
    out.push(bar(&format!(
        "  update {} {}{}",
        word,
        snippet.descriptor(),
        recoverable_suffix(session, snippet, event.status)
    )));
    if let Some(failure) = &event.exception {
        failure_lines(failure, out);
    }
}

/// `   3 : int x = 5;`
pub fn listing_line(snippet: &Snippet) -> String {
    let mut lines = snippet.source.lines();
    let first = lines.next().unwrap_or_default();
    let mut text = format!("{:>4} : {}", snippet.id.0, first);
    for line in lines {
        text.push_str("\n       ");
        text.push_str(line);
    }
    text
}

pub fn var_line(session: &mut Session, snippet: &Snippet) -> Option<String> {
    let SnippetKind::Var { name, type_name, .. } = &snippet.kind else {
        return None;
    };
    let status = session.status(snippet.id).ok()?;
    let value = match status {
        Status::Valid => match session.var_value(snippet.id) {
            Ok(ExecOutcome::Completed { value: Some(v) }) => v,
            Ok(_) | Err(_) => "<not initialized>".to_string(),
        },
        _ => "<not active>".to_string(),
    };
    Some(bar(&format!("  {} {} = {}", type_name, name, value)))
}

pub fn method_line(session: &Session, snippet: &Snippet) -> Option<String> {
    let SnippetKind::Method {
        name,
        params,
        return_type,
    } = &snippet.kind
    else {
        return None;
    };
    let params: Vec<&str> = params.iter().map(|p| p.0.as_str()).collect();
    let status = session.status(snippet.id).ok()?;
    Some(bar(&format!(
        "  {} {}({}){}",
        return_type,
        name,
        params.join(","),
        recoverable_suffix(session, snippet, status)
    )))
}

pub fn type_line(session: &Session, snippet: &Snippet) -> Option<String> {
    if snippet.kind() != Kind::TypeDecl {
        return None;
    }
    let status = session.status(snippet.id).ok()?;
    Some(bar(&format!(
        "  {}{}",
        snippet.descriptor(),
        recoverable_suffix(session, snippet, status)
    )))
}

pub fn import_line(snippet: &Snippet) -> Option<String> {
    match &snippet.kind {
        SnippetKind::Import { .. } => Some(bar(&format!("  {}", snippet.descriptor()))),
        _ => None,
    }
}

pub fn message(text: &str) -> String {
    bar(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionMode;
    use crate::lang::{self, interp::OutputBuffer};

    fn session() -> Session {
        lang::session(ExecutionMode::Local, OutputBuffer::new()).unwrap()
    }

    fn feedback(s: &mut Session, src: &str) -> Vec<String> {
        let events = s.eval(src).unwrap();
        event_lines(s, &events, FeedbackMode::Normal)
    }

    #[test]
    fn forward_reference_then_definition() {
        let mut s = session();
        assert_eq!(
            feedback(&mut s, "int x() { return g(); }"),
            vec!["|  created method x(), however, it cannot be invoked until method g() is declared"]
        );
        assert_eq!(
            feedback(&mut s, "int g() { return 55; }"),
            vec!["|  created method g()", "|    update modified method x()"]
        );
        assert_eq!(feedback(&mut s, "x()"), vec!["$3 ==> 55"]);
    }

    #[test]
    fn redeclaration_and_drop() {
        let mut s = session();
        feedback(&mut s, "class A {}");
        assert_eq!(feedback(&mut s, "class A {}"), vec!["|  modified class A"]);
        let events = s.drop(crate::names::SnippetId(2)).unwrap();
        assert_eq!(
            event_lines(&s, &events, FeedbackMode::Normal),
            vec!["|  dropped class A"]
        );
    }

    #[test]
    fn values_and_errors() {
        let mut s = session();
        assert_eq!(feedback(&mut s, "int x = 5"), vec!["x ==> 5"]);
        assert_eq!(feedback(&mut s, "2 + 2"), vec!["$2 ==> 4"]);
        let lines = feedback(&mut s, "int y = \"a\"");
        assert!(lines[0].starts_with("|  Error: "), "{:?}", lines);
        assert!(lines.iter().any(|l| l.contains('^')), "{:?}", lines);
    }

    #[test]
    fn exceptions_show_frames() {
        let mut s = session();
        feedback(&mut s, "int div(int a) {\n  return 10 / a;\n}");
        let lines = feedback(&mut s, "div(0)");
        assert_eq!(
            lines,
            vec![
                "|  Exception java.lang.ArithmeticException: / by zero",
                "|        at div (#1:2)",
                "|        at (#2:1)",
            ]
        );
    }

    #[test]
    fn concise_and_silent_modes() {
        let mut s = session();
        let events = s.eval("void f() {}").unwrap();
        assert!(event_lines(&s, &events, FeedbackMode::Concise).is_empty());
        let events = s.eval("1 + 1").unwrap();
        assert_eq!(event_lines(&s, &events, FeedbackMode::Concise), vec!["$2 ==> 2"]);
        assert!(event_lines(&s, &events, FeedbackMode::Silent).is_empty());
    }

    #[test]
    fn listing_indents_continuation_lines() {
        let s = Snippet {
            id: crate::names::SnippetId(12),
            kind: SnippetKind::Statement,
            source: "while (x) {\n  x = false;\n}".into(),
        };
        assert_eq!(
            listing_line(&s),
            "  12 : while (x) {\n         x = false;\n       }"
        );
    }
}
