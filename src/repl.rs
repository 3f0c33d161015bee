mod commands;
pub mod format;

use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing::{debug, info, warn};

use crate::analysis::{analyze_completion, split_snippets, Completeness, CompletionIndex, IndexJob};
use crate::config::{EngineConfig, FeedbackMode};
use crate::error::EngineError;
use crate::events::SnippetEvent;
use crate::exec::ExecFailure;
use crate::lang::interp::OutputBuffer;
use crate::lang::{self, Session};
use crate::names::SnippetId;
use crate::snippet::{Snippet, SnippetFilter, Status};

pub use commands::{parse_repl_command, ReplCommand, Sources};

const HISTORY_FILE: &str = ".jolt_history";
const PROMPT: &str = "jolt> ";
const CONTINUATION_PROMPT: &str = "  ...> ";

/// Where program output and feedback go.
#[derive(Clone)]
pub enum Sink {
    Stdout,
    Buffer(OutputBuffer),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::Stdout => io::stdout().write(buf),
            Sink::Buffer(b) => b.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::Stdout => io::stdout().flush(),
            Sink::Buffer(b) => b.flush(),
        }
    }
}

pub struct ReplSession {
    session: Session,
    config: EngineConfig,
    feedback: FeedbackMode,
    sink: Sink,
    history: Vec<String>,
    /// Snippets evaluated from the startup files.
    startup: Vec<SnippetId>,
    last: Option<SnippetId>,
    index_job: Option<IndexJob>,
}

/// Append each event to `path` as one JSON object per line.
fn subscribe_event_log(session: &mut Session, path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let path = path.to_path_buf();
    session.subscribe(Box::new(move |event: &SnippetEvent| {
        let written = serde_json::to_string(event)
            .map_err(io::Error::from)
            .and_then(|line| writeln!(file, "{}", line));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "event log write failed");
        }
    }));
    Ok(())
}

fn open_session(config: &EngineConfig, sink: &Sink) -> io::Result<Session> {
    let mut session = lang::session(config.execution, sink.clone())?;
    if let Some(path) = &config.event_log {
        subscribe_event_log(&mut session, path)?;
    }
    Ok(session)
}

/// Whether the last snippet in `input` still needs more lines.
fn needs_more(input: &str) -> bool {
    let mut rest = input.to_string();
    loop {
        let info = analyze_completion(&rest);
        match info.completeness {
            Completeness::DefinitelyIncomplete => return true,
            Completeness::Complete if info.remaining.len() < rest.len() => rest = info.remaining,
            _ => return false,
        }
    }
}

/// Sources as `/save` writes them. Bare expressions get a `;` so the file
/// splits back into the same snippets.
fn saved_sources<'a>(snippets: impl Iterator<Item = &'a Snippet>) -> Vec<String> {
    snippets
        .map(|s| match analyze_completion(&s.source).completeness {
            Completeness::CompleteWithSemi => format!("{};", s.source),
            _ => s.source.clone(),
        })
        .collect()
}

fn exit_code_of(events: &[SnippetEvent]) -> Option<i32> {
    events.iter().find_map(|e| match e.exception {
        Some(ExecFailure::Terminated { exit_code }) => Some(exit_code),
        _ => None,
    })
}

impl ReplSession {
    /// Start a session and evaluate the configured startup files.
    pub fn new(config: EngineConfig, sink: Sink) -> io::Result<Self> {
        let session = open_session(&config, &sink)?;
        let mut repl = ReplSession {
            session,
            feedback: config.feedback,
            config,
            sink,
            history: Vec::new(),
            startup: Vec::new(),
            last: None,
            index_job: None,
        };
        repl.run_startup();
        Ok(repl)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn feedback(&self) -> FeedbackMode {
        self.feedback
    }

    fn run_startup(&mut self) {
        let startup = self.config.startup.clone();
        let first = self.session.snippets().count();
        let mode = self.feedback;
        self.feedback = FeedbackMode::Silent;
        for path in &startup {
            debug!(path = %path.display(), "startup file");
            self.open(path);
        }
        self.feedback = mode;
        self.startup = self.session.snippets().skip(first).map(|(s, _)| s.id).collect();
    }

    fn say(&mut self, line: &str) {
        if let Err(e) = writeln!(self.sink, "{}", line) {
            warn!(error = %e, "feedback write failed");
        }
    }

    fn say_all(&mut self, lines: Vec<String>) {
        for line in lines {
            self.say(&line);
        }
        let _ = self.sink.flush();
    }

    fn refresh_index(&mut self) {
        match IndexJob::spawn(self.session.snapshot()) {
            Ok(job) => self.index_job = Some(job),
            Err(e) => warn!(error = %e, "could not start completion indexer"),
        }
    }

    /// Evaluate one snippet and report. Returns the events, or the exit
    /// code if user code ended the session.
    fn eval_snippet(&mut self, source: &str) -> Result<Vec<SnippetEvent>, i32> {
        let events = match self.session.eval(source) {
            Ok(events) => events,
            Err(EngineError::Closed) => return Err(0),
            Err(e) => {
                self.say(&format::message(&e.to_string()));
                return Ok(Vec::new());
            }
        };
        if let Some(first) = events.first() {
            self.last = Some(first.snippet);
        }
        let lines = format::event_lines(&self.session, &events, self.feedback);
        self.say_all(lines);
        if let Some(code) = exit_code_of(&events) {
            info!(exit_code = code, "session terminated by user code");
            return Err(code);
        }
        Ok(events)
    }

    /// Evaluate every snippet in `input`. `Some(code)` means exit.
    fn eval_all(&mut self, input: &str) -> Option<i32> {
        for source in split_snippets(input) {
            if let Err(code) = self.eval_snippet(&source) {
                return Some(code);
            }
        }
        None
    }

    /// Handle one complete line of input: a command or snippets.
    /// `Some(code)` means the session should end with that exit code.
    pub fn handle_input(&mut self, input: &str) -> Option<i32> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }
        self.history.push(input.to_string());
        match parse_repl_command(input) {
            Some(cmd) => self.handle_command(cmd),
            None => self.eval_all(input),
        }
    }

    /// One line from the interactive prompt. Completion names are rebuilt
    /// once the whole line has been handled.
    fn handle_line(&mut self, input: &str) -> Option<i32> {
        let code = self.handle_input(input);
        if code.is_none() {
            self.refresh_index();
        }
        code
    }

    fn handle_command(&mut self, cmd: ReplCommand<'_>) -> Option<i32> {
        match cmd {
            ReplCommand::Exit(code) => return Some(code),
            ReplCommand::Help => {
                let lines = commands::HELP
                    .iter()
                    .map(|(usage, what)| format::message(&format!("{:<40} {}", usage, what)))
                    .collect();
                self.say_all(lines);
            }
            ReplCommand::List { sources, selector } => self.cmd_list(sources, selector),
            ReplCommand::Drop(targets) => return self.cmd_drop(&targets),
            ReplCommand::Vars => {
                let vars: Vec<Snippet> = self.session.variables().cloned().collect();
                let lines = vars
                    .iter()
                    .filter_map(|s| format::var_line(&mut self.session, s))
                    .collect();
                self.say_all(lines);
            }
            ReplCommand::Methods => {
                let lines = self
                    .session
                    .methods()
                    .filter_map(|s| format::method_line(&self.session, s))
                    .collect();
                self.say_all(lines);
            }
            ReplCommand::Types => {
                let lines = self
                    .session
                    .types()
                    .filter_map(|s| format::type_line(&self.session, s))
                    .collect();
                self.say_all(lines);
            }
            ReplCommand::Imports => {
                let lines = self.session.imports().filter_map(format::import_line).collect();
                self.say_all(lines);
            }
            ReplCommand::History => {
                let lines = self.history.clone();
                self.say_all(lines);
            }
            ReplCommand::Open(path) => return self.open(Path::new(path)),
            ReplCommand::Save { sources, path } => self.cmd_save(sources, Path::new(path)),
            ReplCommand::Reset => return self.restart("Resetting state."),
            ReplCommand::Reload { history } => return self.reload(history),
            ReplCommand::Feedback(mode) => {
                self.feedback = mode;
                if mode >= FeedbackMode::Normal {
                    let name = format!("{:?}", mode).to_lowercase();
                    self.say(&format::message(&format!("Feedback mode: {}", name)));
                }
            }
            ReplCommand::Rerun(id) => return self.rerun(id),
            ReplCommand::RerunLast => match self.last {
                Some(id) => return self.rerun(id),
                None => self.say(&format::message("No snippet to re-run")),
            },
            ReplCommand::RerunPrevious(n) => {
                let count = self.session.snippets().count() as u32;
                match count.checked_sub(n) {
                    Some(back) => return self.rerun(SnippetId(back + 1)),
                    None => self.say(&format::message(&format!("No such snippet: /-{}", n))),
                }
            }
            ReplCommand::Invalid(msg) => self.say(&format::message(&msg)),
        }
        None
    }

    /// Snippets named by an id or a declared name.
    fn select(&self, selector: &str, all: bool) -> Vec<SnippetId> {
        if let Ok(id) = selector.parse::<u32>() {
            return self
                .session
                .snippet(SnippetId(id))
                .map(|s| s.id)
                .into_iter()
                .collect();
        }
        self.session
            .snippets()
            .filter(|(s, status)| (all || status.is_active()) && s.name() == Some(selector))
            .map(|(s, _)| s.id)
            .collect()
    }

    fn cmd_list(&mut self, sources: Sources, selector: Option<&str>) {
        let lines: Vec<String> = match (sources, selector) {
            (Sources::History, _) => self.history.clone(),
            (Sources::Start, _) => self
                .startup
                .iter()
                .filter_map(|&id| self.session.snippet(id))
                .filter(|s| selector.map_or(true, |sel| s.name() == Some(sel)))
                .map(format::listing_line)
                .collect(),
            (_, Some(sel)) => self
                .select(sel, sources == Sources::All)
                .into_iter()
                .filter_map(|id| self.session.snippet(id))
                .map(format::listing_line)
                .collect(),
            (Sources::All, None) => self
                .session
                .snippets()
                .map(|(s, _)| format::listing_line(s))
                .collect(),
            (Sources::Active, None) => self
                .session
                .active_snippets(SnippetFilter::All)
                .map(format::listing_line)
                .collect(),
        };
        if lines.is_empty() {
            if let Some(sel) = selector {
                self.say(&format::message(&format!("No such snippet: {}", sel)));
            }
            return;
        }
        self.say_all(lines);
    }

    fn cmd_drop(&mut self, targets: &[&str]) -> Option<i32> {
        for target in targets {
            let ids = self.select(target, false);
            if ids.is_empty() {
                self.say(&format::message(&format!("No such snippet: {}", target)));
                continue;
            }
            for id in ids {
                match self.session.drop(id) {
                    Ok(events) => {
                        let lines = format::event_lines(&self.session, &events, self.feedback);
                        self.say_all(lines);
                    }
                    Err(EngineError::Closed) => return Some(0),
                    Err(e) => self.say(&format::message(&e.to_string())),
                }
            }
        }
        None
    }

    fn cmd_save(&mut self, sources: Sources, path: &Path) {
        let lines = match sources {
            Sources::History => self.history.clone(),
            Sources::Active => saved_sources(self.session.active_snippets(SnippetFilter::All)),
            Sources::All => saved_sources(self.session.snippets().map(|(s, _)| s)),
            Sources::Start => saved_sources(
                self.startup
                    .iter()
                    .filter_map(|&id| self.session.snippet(id)),
            ),
        };
        let mut text = lines.join("\n");
        text.push('\n');
        if let Err(e) = fs::write(path, text) {
            self.say(&format::message(&format!(
                "Could not write '{}': {}",
                path.display(),
                e
            )));
        }
    }

    /// Evaluate the snippets of a file. `Some(code)` means exit.
    pub fn open(&mut self, path: &Path) -> Option<i32> {
        match fs::read_to_string(path) {
            Ok(text) => self.eval_all(&text),
            Err(e) => {
                self.say(&format::message(&format!(
                    "Could not read '{}': {}",
                    path.display(),
                    e
                )));
                None
            }
        }
    }

    fn rerun(&mut self, id: SnippetId) -> Option<i32> {
        let Some(source) = self.session.snippet(id).map(|s| s.source.clone()) else {
            self.say(&format::message(&format!("No snippet with id: {}", id.0)));
            return None;
        };
        self.say(&source);
        self.eval_snippet(&source).err()
    }

    /// Replace the session with a fresh one and rerun the startup files.
    fn restart(&mut self, message: &str) -> Option<i32> {
        match open_session(&self.config, &self.sink) {
            Ok(session) => {
                self.session = session;
                self.last = None;
                if self.feedback >= FeedbackMode::Normal {
                    self.say(&format::message(message));
                }
                self.run_startup();
                None
            }
            Err(e) => {
                self.say(&format::message(&format!("Could not reset: {}", e)));
                Some(1)
            }
        }
    }

    /// Restart and replay either the active snippets or, with `history`,
    /// every snippet and `/drop` typed before this command.
    fn reload(&mut self, history: bool) -> Option<i32> {
        let replay: Vec<String> = if history {
            let typed = self.history.len().saturating_sub(1);
            self.history[..typed]
                .iter()
                .filter(|entry| match parse_repl_command(entry) {
                    None => true,
                    Some(cmd) => matches!(cmd, ReplCommand::Drop(_)),
                })
                .cloned()
                .collect()
        } else {
            self.session
                .active_snippets(SnippetFilter::All)
                .filter(|s| !self.startup.contains(&s.id))
                .map(|s| s.source.clone())
                .collect()
        };
        if let Some(code) = self.restart("Restarting and restoring state.") {
            return Some(code);
        }
        debug!(entries = replay.len(), history, "replaying");
        let mode = self.feedback;
        for entry in &replay {
            if mode >= FeedbackMode::Normal {
                self.say(&format!("-: {}", entry));
            }
            self.feedback = FeedbackMode::Silent;
            let outcome = match parse_repl_command(entry) {
                Some(ReplCommand::Drop(targets)) => self.cmd_drop(&targets),
                Some(_) => None,
                None => self.eval_all(entry),
            };
            self.feedback = mode;
            if outcome.is_some() {
                return outcome;
            }
        }
        None
    }

    /// Evaluate the configured files and exit: 1 if any snippet was
    /// rejected or a file could not be read.
    pub fn run_files(&mut self) -> i32 {
        let mut failed = false;
        for path in self.config.files.clone() {
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    self.say(&format::message(&format!(
                        "Could not read '{}': {}",
                        path.display(),
                        e
                    )));
                    return 1;
                }
            };
            for source in split_snippets(&text) {
                match self.eval_snippet(&source) {
                    Ok(events) => {
                        if events.first().map(|e| e.status) == Some(Status::Rejected) {
                            failed = true;
                        }
                    }
                    Err(code) => return code,
                }
            }
        }
        i32::from(failed)
    }

    /// The interactive loop. Returns the exit code.
    pub fn run_repl_loop(&mut self) -> i32 {
        let mut rl: Editor<JoltHelper, DefaultHistory> = match Editor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("jolt: cannot initialize line editor: {}", e);
                return 1;
            }
        };
        rl.set_helper(Some(JoltHelper::default()));
        let history_path = PathBuf::from(HISTORY_FILE);
        let _ = rl.load_history(&history_path);
        self.refresh_index();

        let is_tty = io::stdin().is_terminal();
        let mut input_buf = String::new();

        let code = loop {
            if let Some(index) = self.index_job.as_mut().and_then(IndexJob::poll) {
                if let Some(helper) = rl.helper_mut() {
                    helper.index = index;
                }
                self.index_job = None;
            }

            let prompt = if input_buf.is_empty() {
                PROMPT
            } else {
                CONTINUATION_PROMPT
            };
            // In non-TTY mode (piped input), rustyline suppresses prompts.
            // Print prompts ourselves and echo input for full transcript output.
            let line = if is_tty {
                rl.readline(prompt)
            } else {
                print!("{}", prompt);
                io::stdout().flush().ok();
                let result = rl.readline("");
                if let Ok(ref line) = result {
                    println!("{}", line);
                }
                result
            };
            let line = match line {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    input_buf.clear();
                    continue;
                }
                Err(ReadlineError::Eof) => break 0,
                Err(e) => {
                    warn!(error = %e, "readline failed");
                    break 1;
                }
            };
            input_buf.push_str(&line);
            input_buf.push('\n');

            if !input_buf.trim_start().starts_with('/') && needs_more(&input_buf) {
                continue;
            }

            let input = input_buf.trim().to_string();
            input_buf.clear();
            if input.is_empty() {
                continue;
            }
            let _ = rl.add_history_entry(input.as_str());

            if let Some(code) = self.handle_line(&input) {
                break code;
            }
        };

        if let Err(e) = rl.save_history(&history_path) {
            debug!(error = %e, "history not saved");
        }
        code
    }
}

/// Line editor hooks: tab completion over the session's names.
#[derive(Default)]
pub struct JoltHelper {
    index: CompletionIndex,
}

fn word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .char_indices()
        .rev()
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .map_or(0, |(i, c)| i + c.len_utf8())
}

impl Completer for JoltHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let start = word_start(line, pos);
        let candidates = self
            .index
            .suggest(&line[start..pos])
            .into_iter()
            .map(str::to_string)
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for JoltHelper {
    type Hint = String;
}

impl Highlighter for JoltHelper {}

impl Validator for JoltHelper {}

impl Helper for JoltHelper {}

/// Entry point for the binary.
pub fn run(config: EngineConfig) -> i32 {
    let mut repl = match ReplSession::new(config, Sink::Stdout) {
        Ok(repl) => repl,
        Err(e) => {
            eprintln!("jolt: cannot start session: {}", e);
            return 1;
        }
    };
    if repl.config.run {
        return repl.run_files();
    }
    for path in repl.config.files.clone() {
        if let Some(code) = repl.open(&path) {
            return code;
        }
    }
    repl.run_repl_loop()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionMode;

    fn repl() -> (ReplSession, OutputBuffer) {
        repl_with(EngineConfig {
            execution: ExecutionMode::Local,
            ..EngineConfig::default()
        })
    }

    fn repl_with(config: EngineConfig) -> (ReplSession, OutputBuffer) {
        let out = OutputBuffer::new();
        let repl = ReplSession::new(config, Sink::Buffer(out.clone())).unwrap();
        (repl, out)
    }

    fn feed(repl: &mut ReplSession, out: &OutputBuffer, input: &str) -> String {
        assert_eq!(repl.handle_input(input), None, "unexpected exit on {:?}", input);
        out.take()
    }

    #[test]
    fn drop_by_name_cascades() {
        let (mut r, out) = repl();
        feed(&mut r, &out, "void m() { n(); }");
        feed(&mut r, &out, "void n() { p(); }");
        feed(&mut r, &out, "void p() {}");
        assert_eq!(
            feed(&mut r, &out, "/drop p"),
            "|  dropped method p()\n\
             |    update modified method n(), however, it cannot be invoked until method p() is declared\n"
        );
        assert_eq!(
            feed(&mut r, &out, "m()"),
            "|  attempted to call method n() which cannot be invoked until method p() is declared\n"
        );
    }

    #[test]
    fn listings() {
        let (mut r, out) = repl();
        feed(&mut r, &out, "int x = 4; String s = \"hi\";");
        feed(&mut r, &out, "int twice(int a) { return 2 * a; }");
        feed(&mut r, &out, "record P(int a) {}");
        feed(&mut r, &out, "import java.util.*;");
        assert_eq!(
            feed(&mut r, &out, "/vars"),
            "|    int x = 4\n|    String s = \"hi\"\n"
        );
        assert_eq!(feed(&mut r, &out, "/methods"), "|    int twice(int)\n");
        assert_eq!(feed(&mut r, &out, "/types"), "|    record P\n");
        assert_eq!(feed(&mut r, &out, "/imports"), "|    import java.util.*\n");
        assert_eq!(feed(&mut r, &out, "/list x"), "   1 : int x = 4;\n");
    }

    #[test]
    fn rerun_by_id_and_last() {
        let (mut r, out) = repl();
        feed(&mut r, &out, "int k = 1");
        feed(&mut r, &out, "k = k + 1");
        assert_eq!(feed(&mut r, &out, "/!"), "k = k + 1\nk ==> 3\n");
        assert_eq!(feed(&mut r, &out, "/2"), "k = k + 1\nk ==> 4\n");
        assert_eq!(feed(&mut r, &out, "/99"), "|  No snippet with id: 99\n");
    }

    #[test]
    fn save_open_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("session.jsh");
        let (mut r, out) = repl();
        feed(&mut r, &out, "int base = 40");
        feed(&mut r, &out, "int more() { return base + 2; }");
        feed(&mut r, &out, &format!("/save {}", file.display()));
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "int base = 40;\nint more() { return base + 2; }\n"
        );
        assert_eq!(feed(&mut r, &out, "/reset"), "|  Resetting state.\n");
        assert_eq!(r.session().snippets().count(), 0);
        feed(&mut r, &out, &format!("/open {}", file.display()));
        assert_eq!(feed(&mut r, &out, "more()"), "$3 ==> 42\n");
    }

    #[test]
    fn reload_replays_active_snippets() {
        let (mut r, out) = repl();
        feed(&mut r, &out, "int base = 2");
        feed(&mut r, &out, "int twice() { return base * 2; }");
        feed(&mut r, &out, "int gone() { return 0; }");
        feed(&mut r, &out, "/drop gone");
        assert_eq!(
            feed(&mut r, &out, "/reload"),
            "|  Restarting and restoring state.\n\
             -: int base = 2\n\
             -: int twice() { return base * 2; }\n"
        );
        assert_eq!(r.session().snippets().count(), 2);
        assert_eq!(feed(&mut r, &out, "twice()"), "$3 ==> 4\n");
    }

    #[test]
    fn reload_history_replays_snippets_and_drops() {
        let (mut r, out) = repl();
        feed(&mut r, &out, "int base = 2");
        feed(&mut r, &out, "int gone() { return 0; }");
        feed(&mut r, &out, "/drop gone");
        feed(&mut r, &out, "/vars");
        feed(&mut r, &out, "base = 5");
        assert_eq!(
            feed(&mut r, &out, "/reload -history"),
            "|  Restarting and restoring state.\n\
             -: int base = 2\n\
             -: int gone() { return 0; }\n\
             -: /drop gone\n\
             -: base = 5\n"
        );
        assert_eq!(feed(&mut r, &out, "base"), "base ==> 5\n");
        assert_eq!(feed(&mut r, &out, "/methods"), "");
    }

    #[test]
    fn rerun_counting_back() {
        let (mut r, out) = repl();
        feed(&mut r, &out, "int k = 1");
        feed(&mut r, &out, "k = k + 1");
        feed(&mut r, &out, "k * 10");
        assert_eq!(feed(&mut r, &out, "/-2"), "k = k + 1\nk ==> 3\n");
        assert_eq!(feed(&mut r, &out, "/-1"), "k = k + 1\nk ==> 4\n");
        assert_eq!(feed(&mut r, &out, "/-9"), "|  No such snippet: /-9\n");
    }

    #[test]
    fn list_and_save_startup_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let init = dir.path().join("init.jsh");
        fs::write(&init, "int seed = 7;\nvoid hello() { System.out.println(\"hi\"); }\n").unwrap();
        let (mut r, out) = repl_with(EngineConfig {
            execution: ExecutionMode::Local,
            startup: vec![init],
            ..EngineConfig::default()
        });
        feed(&mut r, &out, "int x = seed + 1");
        let startup_listing = "   1 : int seed = 7;\n   2 : void hello() { System.out.println(\"hi\"); }\n";
        assert_eq!(feed(&mut r, &out, "/list -start"), startup_listing);
        assert_eq!(
            feed(&mut r, &out, "/list -history"),
            "int x = seed + 1\n/list -start\n/list -history\n"
        );

        let typed = dir.path().join("typed.jsh");
        let save = format!("/save -history {}", typed.display());
        feed(&mut r, &out, &save);
        assert_eq!(
            fs::read_to_string(&typed).unwrap(),
            format!("int x = seed + 1\n/list -start\n/list -history\n{}\n", save)
        );

        let start = dir.path().join("start.jsh");
        feed(&mut r, &out, &format!("/save -start {}", start.display()));
        assert_eq!(
            fs::read_to_string(&start).unwrap(),
            "int seed = 7;\nvoid hello() { System.out.println(\"hi\"); }\n"
        );

        feed(&mut r, &out, "/reset");
        assert_eq!(feed(&mut r, &out, "/list -start"), startup_listing);
    }

    #[test]
    fn completion_index_refreshes_once_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("names.jsh");
        fs::write(&file, "int alpha = 1;\nint beta = 2;\n").unwrap();
        let (mut r, out) = repl_with(EngineConfig {
            execution: ExecutionMode::Local,
            startup: vec![file.clone()],
            run: true,
            files: vec![file.clone()],
            ..EngineConfig::default()
        });
        assert!(r.index_job.is_none());
        assert_eq!(r.run_files(), 0);
        assert!(r.index_job.is_none());
        assert_eq!(r.open(&file), None);
        assert!(r.index_job.is_none());
        out.take();

        assert_eq!(r.handle_line("int gamma = 3; int delta = 4;"), None);
        let index = r.index_job.take().expect("one refresh for the line").wait();
        assert_eq!(index.suggest("gam"), vec!["gamma"]);
        assert_eq!(index.suggest("alp"), vec!["alpha"]);
    }

    #[test]
    fn startup_files_are_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("init.jsh");
        fs::write(&file, "int seed = 7;\nvoid hello() { System.out.println(\"hi\"); }\n").unwrap();
        let (mut r, out) = repl_with(EngineConfig {
            execution: ExecutionMode::Local,
            startup: vec![file],
            ..EngineConfig::default()
        });
        assert_eq!(out.take(), "");
        assert_eq!(feed(&mut r, &out, "seed"), "seed ==> 7\n");
        assert_eq!(feed(&mut r, &out, "hello()"), "hi\n");
    }

    #[test]
    fn run_mode_reports_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.jsh");
        let bad = dir.path().join("bad.jsh");
        fs::write(&good, "int a = 1;\nSystem.out.println(a + 1);\n").unwrap();
        fs::write(&bad, "int b = \"no\";\n").unwrap();

        let (mut r, out) = repl_with(EngineConfig {
            execution: ExecutionMode::Local,
            run: true,
            files: vec![good.clone()],
            ..EngineConfig::default()
        });
        assert_eq!(r.run_files(), 0);
        assert_eq!(out.take(), "a ==> 1\n2\n");

        let (mut r, _out) = repl_with(EngineConfig {
            execution: ExecutionMode::Local,
            run: true,
            files: vec![good, bad],
            ..EngineConfig::default()
        });
        assert_eq!(r.run_files(), 1);
    }

    #[test]
    fn exit_codes() {
        let (mut r, _out) = repl();
        assert_eq!(r.handle_input("/exit 4"), Some(4));
        let (mut r, _out) = repl();
        assert_eq!(r.handle_input("System.exit(3)"), Some(3));
    }

    #[test]
    fn event_log_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("events.jsonl");
        let (mut r, out) = repl_with(EngineConfig {
            execution: ExecutionMode::Local,
            event_log: Some(log.clone()),
            ..EngineConfig::default()
        });
        feed(&mut r, &out, "class A {}");
        feed(&mut r, &out, "class A {}");
        let text = fs::read_to_string(&log).unwrap();
        let events: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1]["status"], "VALID");
        assert_eq!(events[1]["superseded"]["snippet"], 1);
        assert_eq!(events[2]["status"], "OVERWRITTEN");
        assert_eq!(events[2]["cause"], 2);
    }

    #[test]
    fn continuation_detection() {
        assert!(needs_more("int f() {\n"));
        assert!(needs_more("int a = 1; int b =\n"));
        assert!(!needs_more("int a = 1; int b = 2;\n"));
        assert!(!needs_more("x + 1\n"));
    }

    #[test]
    fn completion_word_start() {
        assert_eq!(word_start("foo(ba", 6), 4);
        assert_eq!(word_start("$1", 2), 0);
        assert_eq!(word_start("", 0), 0);
    }
}
