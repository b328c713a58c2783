//! aiv-helperbot: keeps vandalism and username noticeboards tidy.
//!
//! Each pass reads the noticeboards, removes reports whose subjects have
//! since been sanctioned, annotates reports about sensitive subjects,
//! restores the posting instructions and flips the backlog indicator.

pub mod backlog;
pub mod census;
pub mod config;
pub mod entries;
pub mod error;
pub mod instructions;
pub mod reconciler;
pub mod registry;
pub mod save;
pub mod settings;
pub mod status;
pub mod wiki;
pub mod wikitext;

pub use config::Config;
pub use error::{BotError, Result};
pub use reconciler::{PassOutcome, Reconciler};
pub use registry::SpecialSubjectRegistry;
pub use settings::SettingsDirective;
