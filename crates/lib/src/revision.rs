//! Revisions and their change sets.
//!
//! A revision arrives as untrusted text (commit hook argument) and is turned
//! into a [`RevisionId`] before anything else touches it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric id of a committed revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(u64);

impl RevisionId {
  pub fn new(id: u64) -> Self {
    Self(id)
  }

  pub fn get(self) -> u64 {
    self.0
  }

  /// The revision before this one; `None` for revision 0.
  pub fn previous(self) -> Option<RevisionId> {
    self.0.checked_sub(1).map(RevisionId)
  }
}

impl fmt::Display for RevisionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RevisionParseError {
  #[error("revision is empty")]
  Empty,

  #[error("revision \"{0}\" is not a non-negative integer")]
  NotANumber(String),
}

impl FromStr for RevisionId {
  type Err = RevisionParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
      return Err(RevisionParseError::Empty);
    }
    // u64::from_str accepts a leading '+', a revision never has one.
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
      return Err(RevisionParseError::NotANumber(s.to_string()));
    }
    trimmed
      .parse::<u64>()
      .map(RevisionId)
      .map_err(|_| RevisionParseError::NotANumber(s.to_string()))
  }
}

/// Kind of change recorded for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
  Add,
  Modify,
  Delete,
}

impl ChangeType {
  /// Map an svn action letter (`A`, `M`, `R`, `D`).
  ///
  /// A replace is content-wise a modification of the path.
  pub fn from_action(action: char) -> Option<Self> {
    match action {
      'A' => Some(ChangeType::Add),
      'M' | 'R' => Some(ChangeType::Modify),
      'D' => Some(ChangeType::Delete),
      _ => None,
    }
  }
}

impl fmt::Display for ChangeType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ChangeType::Add => "add",
      ChangeType::Modify => "modify",
      ChangeType::Delete => "delete",
    };
    write!(f, "{}", s)
  }
}

/// One changed path of a revision, as reported by the version control system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
  pub path: String,
  pub change: ChangeType,
}

impl ChangeEntry {
  pub fn new(path: impl Into<String>, change: ChangeType) -> Self {
    Self {
      path: path.into(),
      change,
    }
  }
}

/// All changes of one revision, in the order the version control system reported them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionChangeSet {
  pub revision: RevisionId,
  pub changes: Vec<ChangeEntry>,
}

impl RevisionChangeSet {
  pub fn new(revision: RevisionId, changes: Vec<ChangeEntry>) -> Self {
    Self { revision, changes }
  }

  pub fn is_empty(&self) -> bool {
    self.changes.is_empty()
  }

  pub fn deletions(&self) -> impl Iterator<Item = &ChangeEntry> {
    self.changes.iter().filter(|c| c.change == ChangeType::Delete)
  }

  /// Whether `path` itself is deleted, ignoring trailing slashes.
  pub fn deletes(&self, path: &str) -> bool {
    let path = path.trim_end_matches('/');
    self.deletions().any(|c| c.path.trim_end_matches('/') == path)
  }
}
