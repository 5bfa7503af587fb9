//! Shared utilities: hashing and external processes.

pub mod hash;
pub mod process;
