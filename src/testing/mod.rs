//! Testing infrastructure for csm-flow.
//!
//! Scripted and recording doubles for every workflow collaborator, so the
//! driver can be exercised without a language model, a file system, or a
//! terminal.
//!
//! # Example
//!
//! ```rust,ignore
//! use csm_flow::testing::{RecordingNotifier, RecordingSink, ScriptedGenerator, ScriptedReviewer};
//!
//! let generator = ScriptedGenerator::new().with_artifact("list v1");
//! let reviewer = ScriptedReviewer::new().with_outcome(ReviewOutcome::accepted());
//! let sink = RecordingSink::new();
//! let notifier = RecordingNotifier::new();
//! ```

pub mod mocks;

pub use mocks::*;
