//! Incremental snippet evaluation: snippets are declared, re-declared and
//! dropped one at a time, and every dependent is recompiled and re-linked
//! as the names it relies on come and go.

pub mod analysis;
pub mod config;
pub mod deps;
pub mod engine;
pub mod error;
pub mod events;
pub mod exec;
pub mod lang;
pub mod names;
pub mod oracle;
pub mod registry;
pub mod repl;
pub mod snippet;

pub use engine::{Engine, Snapshot};
pub use error::{Diag, EngineError};
pub use events::{SnippetEvent, SubscriptionToken};
pub use lang::{session, Session};
pub use names::SnippetId;
pub use snippet::{Kind, Snippet, SnippetKind, Status, SubKind};
