//! # wikisync-middleware
//!
//! Ordered transform/validation steps applied to each [`ContentUnit`] before
//! it is considered for writing.
//!
//! ## Usage
//!
//! ```rust
//! use wikisync_core::{resolver::resolve_relative, ContentUnit, NamespaceMap};
//! use wikisync_middleware::{pipeline, Matcher, MatchMode, PipelineStep, SettingsTable};
//!
//! let steps = vec![PipelineStep::from_fn("banner", |unit, _settings| {
//!     unit.content.insert_str(0, "-- synced\n");
//!     Ok(())
//! })
//! .when_long_extension(Matcher::literal(".lua"))];
//!
//! let resolved = resolve_relative("Module/Util/Util.lua", &NamespaceMap::new());
//! let mut unit = ContentUnit::new("src/Module/Util/Util.lua", resolved, "return {}", "sync");
//! pipeline::run(&mut unit, &steps, &SettingsTable::new(), MatchMode::Field, |_, _| {});
//! assert_eq!(unit.content, "-- synced\nreturn {}");
//! ```
//!
//! [`ContentUnit`]: wikisync_core::ContentUnit

pub mod builtin;
pub mod error;
pub mod pipeline;
pub mod step;
pub mod template;

pub use builtin::{ActionSpec, BuiltinAction, MatcherSpec, StepSpec};
pub use error::{BuildError, StepError};
pub use step::{MatchMode, Matcher, Middleware, PipelineStep, Settings, SettingsTable};
