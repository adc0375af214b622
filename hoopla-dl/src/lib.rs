//! License acquisition and manifest driven decryption of borrowed titles.
//!
//! Every title runs through its own [`Workflow`], an ordered sequence of stages
//! whose outcomes are collected into a [`WorkflowResult`]. A [`batch`] runs many
//! of them over a bounded worker pool.

pub mod artifacts;
pub mod batch;
pub mod catalog;
pub mod client;
pub mod decrypt;
pub mod download;
pub mod license;
pub mod manifest;
pub mod options;
pub mod report;
pub mod session;
pub mod tool;
pub mod workflow;

mod commands;
mod error;
mod logger;
mod utils;

#[doc(hidden)]
pub use commands::Args;
pub use error::{Error, ErrorRecord, Result};
pub use hoopla_mpd;
pub use logger::Logger;
pub use options::Options;
pub use reqwest;
pub use session::Session;
pub use utils::find_program;
pub use workflow::{Services, Stage, StageOutcome, Workflow, WorkflowResult};
