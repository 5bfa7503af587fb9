//! Composing a host's overlay segments into one merged tree.
//!
//! Segments are applied in ascending priority. A file in a later segment
//! replaces the same path from earlier ones; a tombstone removes it. Nothing
//! is ever dropped by omission.

mod segment;
mod tree;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, trace};

use crate::layout::SegmentId;

pub use segment::{Segment, SegmentEntry};
pub use tree::{ConfigTree, TreeEntry};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
  #[error("segments {first} and {second} have the same priority and both define {path}")]
  Conflict {
    path: String,
    first: SegmentId,
    second: SegmentId,
  },

  #[error("segment {segment} is applied after the higher-priority segment {previous}")]
  Unordered { segment: SegmentId, previous: SegmentId },

  #[error("segment {segment} both defines and tombstones {path}")]
  SelfContradicting { segment: SegmentId, path: String },

  #[error("unsupported entry {path} in segment {segment}: {reason}")]
  Unsupported {
    segment: SegmentId,
    path: String,
    reason: String,
  },

  #[error("failed to read {path} of segment {segment}: {message}")]
  Read {
    segment: SegmentId,
    path: String,
    message: String,
  },
}

/// A merged file exceeds the configured maximum size.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{path} is {size} bytes, larger than the allowed {max} bytes")]
pub struct ConfigTooLarge {
  pub path: String,
  pub size: u64,
  pub max: u64,
}

/// Overlay merge with the configured size guard.
#[derive(Debug, Clone, Copy)]
pub struct ConfigMerger {
  max_file_size: u64,
}

impl ConfigMerger {
  pub fn new(max_file_size: u64) -> Self {
    Self { max_file_size }
  }

  pub fn max_file_size(&self) -> u64 {
    self.max_file_size
  }

  /// Overlay `segments`, which must be in ascending priority order.
  pub fn merge(&self, segments: &[Segment]) -> Result<ConfigTree, MergeError> {
    let mut tree = ConfigTree::new();

    for group in rank_groups(segments)? {
      for (path, (entry, origin)) in flatten_group(group)? {
        match entry {
          SegmentEntry::File(content) => {
            trace!(path, segment = %origin, "overlay file");
            tree.insert(path.to_string(), content.clone(), origin.clone());
          }
          SegmentEntry::Tombstone => {
            if tree.remove(path).is_some() {
              trace!(path, segment = %origin, "tombstone removed file");
            } else {
              debug!(path, segment = %origin, "tombstone for a path no lower segment defines");
            }
          }
        }
      }
    }

    Ok(tree)
  }

  /// Fail when any merged file is larger than the configured maximum.
  pub fn check_size(&self, tree: &ConfigTree) -> Result<(), ConfigTooLarge> {
    for (path, entry) in tree.iter() {
      let size = entry.content.len() as u64;
      if size > self.max_file_size {
        return Err(ConfigTooLarge {
          path: path.to_string(),
          size,
          max: self.max_file_size,
        });
      }
    }
    Ok(())
  }
}

/// Split ordered segments into runs of equal rank.
fn rank_groups(segments: &[Segment]) -> Result<Vec<&[Segment]>, MergeError> {
  for pair in segments.windows(2) {
    if pair[1].id.kind < pair[0].id.kind {
      return Err(MergeError::Unordered {
        segment: pair[1].id.clone(),
        previous: pair[0].id.clone(),
      });
    }
  }
  Ok(segments.chunk_by(|a, b| a.id.kind == b.id.kind).collect())
}

/// Combine same-rank segments, failing when two of them touch the same path.
fn flatten_group(group: &[Segment]) -> Result<BTreeMap<&str, (&SegmentEntry, &SegmentId)>, MergeError> {
  let mut combined: BTreeMap<&str, (&SegmentEntry, &SegmentId)> = BTreeMap::new();
  for segment in group {
    for (path, entry) in &segment.entries {
      if let Some((_, first)) = combined.get(path.as_str()) {
        return Err(MergeError::Conflict {
          path: path.clone(),
          first: (*first).clone(),
          second: segment.id.clone(),
        });
      }
      combined.insert(path.as_str(), (entry, &segment.id));
    }
  }
  Ok(combined)
}
