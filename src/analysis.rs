//! Source analysis that needs no compilation: splitting raw input into
//! snippets, and name completion over a session snapshot.

use std::collections::BTreeSet;
use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

use crate::engine::Snapshot;
use crate::lang::types::library_package;
use crate::names::SymbolKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    /// Ends in `;` or a closing brace.
    Complete,
    /// Complete if a semicolon is added, e.g. `x + 1`.
    CompleteWithSemi,
    /// Needs more input: open brackets, an unterminated string or comment,
    /// or a trailing operator.
    DefinitelyIncomplete,
    /// Only whitespace and comments.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionInfo {
    pub completeness: Completeness,
    /// The first snippet, trimmed.
    pub source: String,
    /// Input following the first snippet.
    pub remaining: String,
}

/// Words that continue a statement after a closing brace.
const CONTINUATIONS: &[&str] = &["else", "catch", "finally"];

fn next_word(rest: &str) -> &str {
    let rest = rest.trim_start();
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Does the statement go on after a `}` (or `;`, when `after_semi`)?
fn continues(snippet: &str, rest: &str, after_semi: bool) -> bool {
    match next_word(rest) {
        "else" => true,
        "while" => !after_semi && next_word(snippet) == "do",
        word => !after_semi && CONTINUATIONS.contains(&word),
    }
}

/// Does text ending this way need more input?
fn dangling(significant: &str) -> bool {
    let t = significant.trim_end();
    if t.ends_with("++") || t.ends_with("--") {
        return false;
    }
    if t.ends_with(|c: char| "=+-*/%<>&|!?:.,(".contains(c)) {
        return true;
    }
    let word_start = t
        .rfind(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .map_or(0, |i| i + 1);
    matches!(
        &t[word_start..],
        "new" | "extends" | "implements" | "instanceof" | "import" | "static" | "class"
            | "interface" | "enum" | "record" | "throw"
    )
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexical {
    Code,
    Str,
    Char,
    LineComment,
    BlockComment,
}

fn info(completeness: Completeness, source: &str, remaining: &str) -> CompletionInfo {
    CompletionInfo {
        completeness,
        source: source.trim().to_string(),
        remaining: remaining.to_string(),
    }
}

/// Find where the first snippet in `input` ends.
pub fn analyze_completion(input: &str) -> CompletionInfo {
    let mut state = Lexical::Code;
    let mut depth = 0i32;
    let mut escape = false;
    // Input with comments and literal contents blanked, for the trailing check.
    let mut significant = String::with_capacity(input.len());
    let mut start = None;
    let mut chars = input.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        match state {
            Lexical::Str | Lexical::Char => {
                let close = if state == Lexical::Str { '"' } else { '\'' };
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == close {
                    state = Lexical::Code;
                    significant.push(c);
                } else if c == '\n' {
                    // Literals cannot span lines; let the parser report it.
                    state = Lexical::Code;
                }
                continue;
            }
            Lexical::LineComment => {
                if c == '\n' {
                    state = Lexical::Code;
                    significant.push(' ');
                }
                continue;
            }
            Lexical::BlockComment => {
                if c == '*' && next == Some('/') {
                    chars.next();
                    state = Lexical::Code;
                    significant.push(' ');
                }
                continue;
            }
            Lexical::Code => {}
        }
        let opens_comment = c == '/' && matches!(next, Some('/' | '*'));
        if start.is_none() && !opens_comment && !c.is_whitespace() {
            start = Some(i);
        }
        let from = start.unwrap_or(i);
        match c {
            '"' => {
                state = Lexical::Str;
                significant.push(c);
            }
            '\'' => {
                state = Lexical::Char;
                significant.push(c);
            }
            '/' if next == Some('/') => {
                chars.next();
                state = Lexical::LineComment;
            }
            '/' if next == Some('*') => {
                chars.next();
                state = Lexical::BlockComment;
            }
            '(' | '[' | '{' => {
                depth += 1;
                significant.push(c);
            }
            ')' | ']' => {
                depth -= 1;
                significant.push(c);
            }
            '}' => {
                depth -= 1;
                significant.push(c);
                let end = i + 1;
                if depth <= 0 && !continues(&input[from..end], &input[end..], false) {
                    // `class A {};` keeps its stray semicolon with the snippet.
                    let rest = &input[end..];
                    let trimmed = rest.trim_start();
                    let end = if trimmed.starts_with(';') {
                        end + (rest.len() - trimmed.len()) + 1
                    } else {
                        end
                    };
                    return info(Completeness::Complete, &input[from..end], &input[end..]);
                }
            }
            ';' if depth <= 0 => {
                let end = i + 1;
                if !continues(&input[from..end], &input[end..], true) {
                    return info(Completeness::Complete, &input[from..end], &input[end..]);
                }
                significant.push(c);
            }
            _ => significant.push(c),
        }
    }

    let completeness = if state == Lexical::Str
        || state == Lexical::Char
        || state == Lexical::BlockComment
        || depth > 0
    {
        Completeness::DefinitelyIncomplete
    } else if significant.trim().is_empty() {
        Completeness::Empty
    } else if dangling(&significant) {
        Completeness::DefinitelyIncomplete
    } else {
        Completeness::CompleteWithSemi
    };
    let source = match start {
        Some(from) if completeness != Completeness::Empty => &input[from..],
        _ => "",
    };
    info(completeness, source, "")
}

/// Split input holding several snippets (a file, a pasted block) into
/// their sources. A trailing incomplete fragment is kept so that
/// evaluating it reports the problem.
pub fn split_snippets(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = input.to_string();
    loop {
        let info = analyze_completion(&rest);
        match info.completeness {
            Completeness::Empty => break,
            Completeness::Complete => {
                if !info.source.is_empty() && info.source != ";" {
                    out.push(info.source);
                }
                rest = info.remaining;
            }
            Completeness::CompleteWithSemi | Completeness::DefinitelyIncomplete => {
                out.push(info.source);
                break;
            }
        }
    }
    out
}

const KEYWORDS: &[&str] = &[
    "boolean", "break", "catch", "class", "continue", "do", "double", "else", "enum", "extends",
    "false", "final", "finally", "for", "if", "implements", "import", "instanceof", "int",
    "interface", "long", "new", "null", "record", "return", "static", "this", "throw", "true",
    "try", "var", "void", "while",
];

/// Sorted completion candidates: session names, keywords and `java.lang`
/// classes. Methods complete with an opening parenthesis.
#[derive(Debug, Clone, Default)]
pub struct CompletionIndex {
    words: Vec<String>,
}

impl CompletionIndex {
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut words: BTreeSet<String> = KEYWORDS.iter().map(|k| k.to_string()).collect();
        words.extend(library_package("java.lang").map(|c| c.name.to_string()));
        for (kind, name) in &snapshot.symbols {
            if name.starts_with('$') {
                continue;
            }
            words.insert(match kind {
                SymbolKind::Method => format!("{}(", name),
                SymbolKind::Type | SymbolKind::Variable => name.clone(),
            });
        }
        CompletionIndex {
            words: words.into_iter().collect(),
        }
    }

    pub fn suggest(&self, prefix: &str) -> Vec<&str> {
        let start = self.words.partition_point(|w| w.as_str() < prefix);
        self.words[start..]
            .iter()
            .take_while(|w| w.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Builds a [`CompletionIndex`] on a background thread.
pub struct IndexJob {
    rx: mpsc::Receiver<CompletionIndex>,
    handle: Option<thread::JoinHandle<()>>,
}

impl IndexJob {
    pub fn spawn(snapshot: Snapshot) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("jolt-index".to_string())
            .spawn(move || {
                let index = CompletionIndex::build(&snapshot);
                debug!(words = index.len(), "completion index built");
                let _ = tx.send(index);
            })?;
        Ok(IndexJob {
            rx,
            handle: Some(handle),
        })
    }

    /// The index, if the job has finished.
    pub fn poll(&mut self) -> Option<CompletionIndex> {
        self.rx.try_recv().ok()
    }

    /// Block until the index is ready.
    pub fn wait(mut self) -> CompletionIndex {
        let index = self.rx.recv().unwrap_or_else(|_| {
            warn!("completion index job failed");
            CompletionIndex::default()
        });
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completeness(s: &str) -> Completeness {
        analyze_completion(s).completeness
    }

    #[test]
    fn classifies_input() {
        assert_eq!(completeness("int x = 5;"), Completeness::Complete);
        assert_eq!(completeness("x + 1"), Completeness::CompleteWithSemi);
        assert_eq!(completeness("x++"), Completeness::CompleteWithSemi);
        assert_eq!(completeness("int x ="), Completeness::DefinitelyIncomplete);
        assert_eq!(completeness("void f() {"), Completeness::DefinitelyIncomplete);
        assert_eq!(completeness("\"abc"), Completeness::DefinitelyIncomplete);
        assert_eq!(completeness("/* open"), Completeness::DefinitelyIncomplete);
        assert_eq!(completeness("  // just a comment"), Completeness::Empty);
        assert_eq!(completeness(""), Completeness::Empty);
    }

    #[test]
    fn braces_and_literals_do_not_confuse_the_scanner() {
        assert_eq!(completeness("String s = \"{;\""), Completeness::CompleteWithSemi);
        assert_eq!(completeness("char c = '}'"), Completeness::CompleteWithSemi);
        let info = analyze_completion("class A { int f() { return 1; } } int y = 2;");
        assert_eq!(info.completeness, Completeness::Complete);
        assert_eq!(info.source, "class A { int f() { return 1; } }");
        assert_eq!(info.remaining, " int y = 2;");
    }

    #[test]
    fn continuations_stay_in_one_snippet() {
        let info = analyze_completion("if (a) { f(); } else { g(); } h();");
        assert_eq!(info.source, "if (a) { f(); } else { g(); }");
        let info = analyze_completion("try { f(); } catch (Exception e) { } finally { } x");
        assert_eq!(info.source, "try { f(); } catch (Exception e) { } finally { }");
        let info = analyze_completion("do { i++; } while (i < 3); x");
        assert_eq!(info.source, "do { i++; } while (i < 3);");
    }

    #[test]
    fn splits_files() {
        let src = "int x() { return g(); }\n// helper\nint g() { return 5; }\nx()\n";
        assert_eq!(
            split_snippets(src),
            vec!["int x() { return g(); }", "int g() { return 5; }", "x()"]
        );
        assert_eq!(split_snippets("class A {};\n;\n"), vec!["class A {};"]);
    }

    #[test]
    fn completion_index() {
        let snapshot = Snapshot {
            symbols: vec![
                (SymbolKind::Method, "square".into()),
                (SymbolKind::Variable, "sum".into()),
                (SymbolKind::Variable, "$1".into()),
                (SymbolKind::Type, "Shape".into()),
            ],
        };
        let index = IndexJob::spawn(snapshot).unwrap().wait();
        assert_eq!(index.suggest("s"), vec!["square(", "static", "sum"]);
        assert_eq!(index.suggest("Sh"), vec!["Shape"]);
        assert!(index.suggest("Str").contains(&"String"));
        assert!(index.suggest("$").is_empty());
    }
}
