//! Session configuration, built from command-line arguments and the
//! environment.

use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable holding the `tracing` filter directive.
pub const LOG_ENV: &str = "JOLT_LOG";

pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} requires an argument")]
    MissingValue(&'static str),
    #[error("unknown option: {0}")]
    UnknownFlag(String),
    #[error("invalid value '{value}' for {flag}; expected one of: {expected}")]
    InvalidValue {
        flag: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Where user code runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// On the calling thread. `stop` only takes effect from another thread.
    Local,
    /// On a dedicated worker thread with a large stack.
    #[default]
    Worker,
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(ExecutionMode::Local),
            "worker" => Ok(ExecutionMode::Worker),
            other => Err(ConfigError::InvalidValue {
                flag: "--execution",
                value: other.to_string(),
                expected: "local, worker",
            }),
        }
    }
}

/// How much the REPL reports after each snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub enum FeedbackMode {
    Silent,
    Concise,
    #[default]
    Normal,
    Verbose,
}

impl FromStr for FeedbackMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silent" => Ok(FeedbackMode::Silent),
            "concise" => Ok(FeedbackMode::Concise),
            "normal" => Ok(FeedbackMode::Normal),
            "verbose" => Ok(FeedbackMode::Verbose),
            other => Err(ConfigError::InvalidValue {
                flag: "--feedback",
                value: other.to_string(),
                expected: "silent, concise, normal, verbose",
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub execution: ExecutionMode,
    pub feedback: FeedbackMode,
    /// Evaluated silently before the first prompt.
    pub startup: Vec<PathBuf>,
    /// Append every snippet event here as one JSON object per line.
    pub event_log: Option<PathBuf>,
    /// Evaluate `files` and exit instead of prompting.
    pub run: bool,
    pub files: Vec<PathBuf>,
    pub log_filter: String,
    pub show_help: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            execution: ExecutionMode::default(),
            feedback: FeedbackMode::default(),
            startup: Vec::new(),
            event_log: None,
            run: false,
            files: Vec::new(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            show_help: false,
        }
    }
}

pub const USAGE: &str = "\
Usage: jolt [options] [FILE...]

Options:
  --feedback MODE      silent, concise, normal or verbose (default normal)
  --execution MODE     local or worker (default worker)
  --startup FILE       evaluate FILE quietly before the session starts
  --event-log FILE     append snippet events to FILE as JSON lines
  --run                evaluate FILEs and exit
  -h, --help           show this help

Set JOLT_LOG to a tracing filter (e.g. jolt=debug) for diagnostics.";

impl EngineConfig {
    /// Parse arguments (without the program name). `log_env` is the value
    /// of [`LOG_ENV`], if set.
    pub fn from_args<I, S>(args: I, log_env: Option<String>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut config = EngineConfig::default();
        if let Some(filter) = log_env.filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }

        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            let mut value = |flag: &'static str| -> Result<String, ConfigError> {
                i += 1;
                args.get(i).cloned().ok_or(ConfigError::MissingValue(flag))
            };
            match arg {
                "--feedback" => config.feedback = value("--feedback")?.parse()?,
                "--execution" => config.execution = value("--execution")?.parse()?,
                "--startup" => config.startup.push(value("--startup")?.into()),
                "--event-log" => config.event_log = Some(value("--event-log")?.into()),
                "--run" => config.run = true,
                "-h" | "--help" => config.show_help = true,
                flag if flag.starts_with('-') && flag.len() > 1 => {
                    return Err(ConfigError::UnknownFlag(flag.to_string()))
                }
                file => config.files.push(file.into()),
            }
            i += 1;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = EngineConfig::from_args(Vec::<String>::new(), None).unwrap();
        assert_eq!(c, EngineConfig::default());
        assert_eq!(c.execution, ExecutionMode::Worker);
        assert_eq!(c.log_filter, "warn");
    }

    #[test]
    fn flags_and_files() {
        let c = EngineConfig::from_args(
            [
                "--feedback",
                "verbose",
                "--execution",
                "local",
                "--startup",
                "init.jsh",
                "--run",
                "a.jsh",
                "b.jsh",
            ],
            Some("jolt=debug".into()),
        )
        .unwrap();
        assert_eq!(c.feedback, FeedbackMode::Verbose);
        assert_eq!(c.execution, ExecutionMode::Local);
        assert_eq!(c.startup, vec![PathBuf::from("init.jsh")]);
        assert!(c.run);
        assert_eq!(c.files.len(), 2);
        assert_eq!(c.log_filter, "jolt=debug");
    }

    #[test]
    fn errors() {
        assert_eq!(
            EngineConfig::from_args(["--feedback"], None),
            Err(ConfigError::MissingValue("--feedback"))
        );
        assert!(matches!(
            EngineConfig::from_args(["--feedback", "loud"], None),
            Err(ConfigError::InvalidValue { flag: "--feedback", .. })
        ));
        assert_eq!(
            EngineConfig::from_args(["--bogus"], None),
            Err(ConfigError::UnknownFlag("--bogus".into()))
        );
    }
}
