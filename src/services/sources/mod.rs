//! Hint sources: responsibility and boundaries
//!
//! Each source senses ONE category of environment state (host, wifi, monitors)
//! and produces snapshots. Sources do not compare snapshots with each other and
//! do not decide what to do with them: change suppression and bootstrap gating
//! live in the detection aggregator, reactions live in rules.

mod dry_run;
mod host;
mod monitor;
mod wifi;
mod r#trait;

pub use self::r#trait::{create_sources, HintSource};
