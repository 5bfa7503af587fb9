//! Loading one overlay segment from an exported directory.

use std::collections::BTreeMap;
use std::path::Path;

use walkdir::WalkDir;

use super::MergeError;
use crate::consts::TOMBSTONE_SUFFIX;
use crate::layout::SegmentId;

/// One entry of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentEntry {
  File(Vec<u8>),
  /// Removes the path from lower-priority segments.
  Tombstone,
}

/// Contents of one overlay segment keyed by relative path (`/`-separated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
  pub id: SegmentId,
  pub entries: BTreeMap<String, SegmentEntry>,
}

impl Segment {
  pub fn new(id: SegmentId) -> Self {
    Self {
      id,
      entries: BTreeMap::new(),
    }
  }

  pub fn with_file(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
    self.entries.insert(path.into(), SegmentEntry::File(content.into()));
    self
  }

  pub fn with_tombstone(mut self, path: impl Into<String>) -> Self {
    self.entries.insert(path.into(), SegmentEntry::Tombstone);
    self
  }

  /// Read a segment from disk. A missing directory is an empty segment.
  pub fn load(id: SegmentId, dir: &Path) -> Result<Self, MergeError> {
    let mut segment = Segment::new(id);
    if !dir.exists() {
      return Ok(segment);
    }

    for entry in WalkDir::new(dir).sort_by_file_name() {
      let entry = entry.map_err(|e| MergeError::Read {
        segment: segment.id.clone(),
        path: e.path().map(|p| p.display().to_string()).unwrap_or_default(),
        message: e.to_string(),
      })?;

      let file_type = entry.file_type();
      if file_type.is_dir() {
        continue;
      }

      let rel = entry.path().strip_prefix(dir).unwrap_or(entry.path());
      let Some(rel) = relative_path(rel) else {
        return Err(MergeError::Unsupported {
          segment: segment.id.clone(),
          path: rel.display().to_string(),
          reason: "path is not valid UTF-8".to_string(),
        });
      };

      if !file_type.is_file() {
        return Err(MergeError::Unsupported {
          segment: segment.id.clone(),
          path: rel,
          reason: if file_type.is_symlink() {
            "symlinks are not supported".to_string()
          } else {
            "not a regular file".to_string()
          },
        });
      }

      if let Some(target) = rel.strip_suffix(TOMBSTONE_SUFFIX)
        && !target.is_empty()
        && !target.ends_with('/')
      {
        segment.insert(target.to_string(), SegmentEntry::Tombstone)?;
        continue;
      }

      let content = std::fs::read(entry.path()).map_err(|e| MergeError::Read {
        segment: segment.id.clone(),
        path: rel.clone(),
        message: e.to_string(),
      })?;
      segment.insert(rel, SegmentEntry::File(content))?;
    }

    Ok(segment)
  }

  fn insert(&mut self, path: String, entry: SegmentEntry) -> Result<(), MergeError> {
    if self.entries.contains_key(&path) {
      return Err(MergeError::SelfContradicting {
        segment: self.id.clone(),
        path,
      });
    }
    self.entries.insert(path, entry);
    Ok(())
  }
}

fn relative_path(path: &Path) -> Option<String> {
  let mut parts = Vec::new();
  for component in path.components() {
    parts.push(component.as_os_str().to_str()?);
  }
  Some(parts.join("/"))
}
