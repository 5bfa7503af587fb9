//! cfgrpm-lib: turns a revision of a layered configuration repository into
//! one configuration package per affected host.
//!
//! - `resolve`: which hosts a revision touches
//! - `merge`: a host's overlay segments composed into one tree
//! - `build`: the tree packaged into an artifact
//! - `execute`: bounded parallel per-host jobs
//! - `upload`: chunked, sequential upload of the artifacts
//! - `janitor`: cleanup of deleted hosts
//! - `error_log`: full error output of failed hosts
//! - `report`: per-host outcomes and the run verdict
//! - `run`: the orchestration tying them together

pub mod build;
pub mod config;
pub mod consts;
pub mod error_log;
pub mod execute;
pub mod janitor;
pub mod layout;
pub mod merge;
pub mod report;
pub mod resolve;
pub mod revision;
pub mod run;
pub mod upload;
pub mod util;
pub mod vcs;
