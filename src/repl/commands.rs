use crate::config::FeedbackMode;
use crate::names::SnippetId;

/// Which sources `/list` and `/save` work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sources {
    Active,
    /// Every snippet, including rejected, overwritten and dropped ones.
    All,
    /// Snippets evaluated from startup files.
    Start,
    /// Everything typed, commands included.
    History,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand<'a> {
    Exit(i32),
    Help,
    List { sources: Sources, selector: Option<&'a str> },
    Drop(Vec<&'a str>),
    Vars,
    Methods,
    Types,
    Imports,
    History,
    Open(&'a str),
    Save { sources: Sources, path: &'a str },
    Reset,
    /// Restart, then replay the active snippets or, with `-history`, the
    /// snippets and drops typed so far.
    Reload { history: bool },
    Feedback(FeedbackMode),
    Rerun(SnippetId),
    RerunLast,
    /// `/-<n>`: the n-th snippet counting back from the newest.
    RerunPrevious(u32),
    /// Malformed command; the message says why.
    Invalid(String),
}

pub const HELP: &[(&str, &str)] = &[
    ("/list [-all|-start|-history] [id|name]", "list snippet sources"),
    ("/drop <id|name>...", "drop declarations"),
    ("/vars", "list declared variables and their values"),
    ("/methods", "list declared methods and their signatures"),
    ("/types", "list declared classes, interfaces, enums and records"),
    ("/imports", "list active imports"),
    ("/history", "show everything typed this session"),
    ("/open <file>", "evaluate the snippets in a file"),
    ("/save [-all|-start|-history] <file>", "save snippet sources to a file"),
    ("/reset", "discard all snippets and start over"),
    ("/reload [-history]", "start over and replay active snippets or typed input"),
    ("/set feedback <mode>", "silent, concise, normal or verbose"),
    ("/<id>", "re-run the snippet with that id"),
    ("/-<n>", "re-run the n-th previous snippet"),
    ("/!", "re-run the last snippet"),
    ("/exit [code]", "leave the session"),
    ("/help", "this help"),
];

/// Split a leading `-all`, `-start` or `-history` off `words`.
fn sources_option<'w, 'a>(words: &'w [&'a str]) -> Result<(Sources, &'w [&'a str]), String> {
    let sources = match words.first() {
        Some(&"-all") => Sources::All,
        Some(&"-start") => Sources::Start,
        Some(&"-history") => Sources::History,
        Some(opt) if opt.starts_with('-') => return Err(format!("unknown option: {}", opt)),
        _ => return Ok((Sources::Active, words)),
    };
    Ok((sources, &words[1..]))
}

pub fn parse_repl_command(input: &str) -> Option<ReplCommand<'_>> {
    let trimmed = input.trim();
    let rest = trimmed.strip_prefix('/')?;
    let (cmd, arg) = match rest.find(char::is_whitespace) {
        Some(i) => (&rest[..i], rest[i..].trim()),
        None => (rest, ""),
    };
    let words: Vec<&str> = arg.split_whitespace().collect();

    let command = match cmd {
        "exit" | "quit" | "q" => match arg {
            "" => ReplCommand::Exit(0),
            code => match code.parse() {
                Ok(code) => ReplCommand::Exit(code),
                Err(_) => ReplCommand::Invalid(format!("'{}' is not a valid exit code", code)),
            },
        },
        "help" | "?" => ReplCommand::Help,
        "list" | "l" => match sources_option(&words) {
            Ok((sources, rest)) => ReplCommand::List {
                sources,
                selector: rest.first().copied(),
            },
            Err(msg) => ReplCommand::Invalid(msg),
        },
        "drop" => {
            if words.is_empty() {
                ReplCommand::Invalid("/drop requires at least one snippet id or name".into())
            } else {
                ReplCommand::Drop(words)
            }
        }
        "vars" | "v" => ReplCommand::Vars,
        "methods" | "m" => ReplCommand::Methods,
        "types" => ReplCommand::Types,
        "imports" | "i" => ReplCommand::Imports,
        "history" => ReplCommand::History,
        "open" | "o" => match arg {
            "" => ReplCommand::Invalid("/open requires a file name".into()),
            path => ReplCommand::Open(path),
        },
        "save" | "s" => match sources_option(&words) {
            Ok((sources, [path])) => ReplCommand::Save {
                sources,
                path: *path,
            },
            Ok(_) => ReplCommand::Invalid("/save requires one file name".into()),
            Err(msg) => ReplCommand::Invalid(msg),
        },
        "reset" => ReplCommand::Reset,
        "reload" => match words.as_slice() {
            [] => ReplCommand::Reload { history: false },
            ["-history"] => ReplCommand::Reload { history: true },
            _ => ReplCommand::Invalid("usage: /reload [-history]".into()),
        },
        "set" => match words.as_slice() {
            ["feedback", mode] => match mode.parse() {
                Ok(mode) => ReplCommand::Feedback(mode),
                Err(e) => ReplCommand::Invalid(format!("{}", e)),
            },
            _ => ReplCommand::Invalid("usage: /set feedback silent|concise|normal|verbose".into()),
        },
        "!" => ReplCommand::RerunLast,
        other => match (other.parse::<u32>(), other.strip_prefix('-').map(str::parse::<u32>)) {
            (Ok(id), _) => ReplCommand::Rerun(SnippetId(id)),
            (_, Some(Ok(n))) if n > 0 => ReplCommand::RerunPrevious(n),
            _ => ReplCommand::Invalid(format!("unknown command: /{}", other)),
        },
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_input_is_not_a_command() {
        assert_eq!(parse_repl_command("int x = 1"), None);
        assert_eq!(parse_repl_command("  x / 2"), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(parse_repl_command("/drop 3 g"), Some(ReplCommand::Drop(vec!["3", "g"])));
        assert_eq!(
            parse_repl_command("/list -all x"),
            Some(ReplCommand::List {
                sources: Sources::All,
                selector: Some("x")
            })
        );
        assert_eq!(
            parse_repl_command("/list"),
            Some(ReplCommand::List {
                sources: Sources::Active,
                selector: None
            })
        );
        assert_eq!(
            parse_repl_command("/save -all out.jsh"),
            Some(ReplCommand::Save {
                sources: Sources::All,
                path: "out.jsh"
            })
        );
        assert_eq!(
            parse_repl_command("/save out.jsh"),
            Some(ReplCommand::Save {
                sources: Sources::Active,
                path: "out.jsh"
            })
        );
        assert_eq!(
            parse_repl_command("/set feedback concise"),
            Some(ReplCommand::Feedback(FeedbackMode::Concise))
        );
        assert_eq!(parse_repl_command("/exit 3"), Some(ReplCommand::Exit(3)));
        assert_eq!(parse_repl_command("/7"), Some(ReplCommand::Rerun(SnippetId(7))));
        assert_eq!(parse_repl_command("/!"), Some(ReplCommand::RerunLast));
    }

    #[test]
    fn start_history_and_reload_options() {
        assert_eq!(
            parse_repl_command("/list -start"),
            Some(ReplCommand::List {
                sources: Sources::Start,
                selector: None
            })
        );
        assert_eq!(
            parse_repl_command("/list -history"),
            Some(ReplCommand::List {
                sources: Sources::History,
                selector: None
            })
        );
        assert_eq!(
            parse_repl_command("/save -history typed.jsh"),
            Some(ReplCommand::Save {
                sources: Sources::History,
                path: "typed.jsh"
            })
        );
        assert_eq!(
            parse_repl_command("/save -start init.jsh"),
            Some(ReplCommand::Save {
                sources: Sources::Start,
                path: "init.jsh"
            })
        );
        assert_eq!(
            parse_repl_command("/reload"),
            Some(ReplCommand::Reload { history: false })
        );
        assert_eq!(
            parse_repl_command("/reload -history"),
            Some(ReplCommand::Reload { history: true })
        );
        assert_eq!(parse_repl_command("/-2"), Some(ReplCommand::RerunPrevious(2)));
    }

    #[test]
    fn malformed_commands_explain_themselves() {
        assert!(matches!(parse_repl_command("/drop"), Some(ReplCommand::Invalid(_))));
        assert!(matches!(parse_repl_command("/frobnicate"), Some(ReplCommand::Invalid(_))));
        assert!(matches!(
            parse_repl_command("/set feedback loud"),
            Some(ReplCommand::Invalid(_))
        ));
        assert!(matches!(parse_repl_command("/list -recent"), Some(ReplCommand::Invalid(_))));
        assert!(matches!(parse_repl_command("/save -all"), Some(ReplCommand::Invalid(_))));
        assert!(matches!(parse_repl_command("/reload -quiet"), Some(ReplCommand::Invalid(_))));
        assert!(matches!(parse_repl_command("/-0"), Some(ReplCommand::Invalid(_))));
    }
}
