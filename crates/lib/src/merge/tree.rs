use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use crate::layout::SegmentId;
use crate::util::hash::{ContentHash, hash_bytes, tree_digest};

/// One file of a merged tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
  pub content: Vec<u8>,
  /// Segment the winning content came from.
  pub origin: SegmentId,
}

/// Merged configuration of one host, ordered by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTree {
  entries: BTreeMap<String, TreeEntry>,
}

impl ConfigTree {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, path: String, content: Vec<u8>, origin: SegmentId) {
    self.entries.insert(path, TreeEntry { content, origin });
  }

  pub fn remove(&mut self, path: &str) -> Option<TreeEntry> {
    self.entries.remove(path)
  }

  pub fn get(&self, path: &str) -> Option<&TreeEntry> {
    self.entries.get(path)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &TreeEntry)> {
    self.entries.iter().map(|(path, entry)| (path.as_str(), entry))
  }

  /// Digest over paths and contents, equal to the digest of the tree once
  /// written to disk.
  ///
  /// Origins are not part of the digest: two trees with the same files are
  /// the same configuration.
  pub fn digest(&self) -> ContentHash {
    let hashes: Vec<(&str, ContentHash)> = self
      .entries
      .iter()
      .map(|(path, entry)| (path.as_str(), hash_bytes(&entry.content)))
      .collect();
    tree_digest(hashes.iter().map(|(path, hash)| (*path, hash)))
  }

  /// Write every file below `dir`, creating parent directories.
  pub fn write_to(&self, dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for (path, entry) in &self.entries {
      let target = dir.join(path);
      if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
      }
      std::fs::write(&target, &entry.content)?;
    }
    Ok(())
  }
}
