//! SHA-256 helpers for artifact checksums and merged-tree digests.
//!
//! - `ContentHash`: a 64-character lowercase hex digest
//! - `tree_digest()`: digest of a file tree given as sorted `(path, hash)` pairs
//! - `hash_directory()`: the same digest computed from a tree on disk
//! - `hash_file()`: checksum of a built package
//! - `hash_bytes()`: digest of in-memory content

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A 64-character lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("failed to walk {path}: {message}")]
  Walk { path: String, message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("{path} is not a regular file or directory")]
  Unsupported { path: String },
}

/// Digest of a file tree.
///
/// `files` are `/`-separated relative paths with their content hashes, in
/// ascending path order. Directories carry no content of their own and are
/// not part of the digest.
pub fn tree_digest<'a>(files: impl IntoIterator<Item = (&'a str, &'a ContentHash)>) -> ContentHash {
  let mut hasher = Sha256::new();
  for (path, hash) in files {
    hasher.update(format!("F:{}:{}", path, hash).as_bytes());
    hasher.update(b"\n");
  }
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// [`tree_digest`] of the regular files below `root`.
///
/// Anything that is neither a file nor a directory, symlinks included, is an
/// error: a materialized tree only ever holds plain files.
pub fn hash_directory(root: &Path) -> Result<ContentHash, HashError> {
  let mut files: Vec<(String, ContentHash)> = Vec::new();

  for entry in WalkDir::new(root).follow_links(false) {
    let entry = entry.map_err(|e| HashError::Walk {
      path: root.display().to_string(),
      message: e.to_string(),
    })?;
    let file_type = entry.file_type();
    if file_type.is_dir() {
      continue;
    }
    let path = entry.path();
    if !file_type.is_file() {
      return Err(HashError::Unsupported {
        path: path.display().to_string(),
      });
    }
    let relative = path
      .strip_prefix(root)
      .ok()
      .and_then(|rel| {
        rel
          .components()
          .map(|c| c.as_os_str().to_str())
          .collect::<Option<Vec<_>>>()
      })
      .map(|parts| parts.join("/"))
      .ok_or_else(|| HashError::Unsupported {
        path: path.display().to_string(),
      })?;
    files.push((relative, hash_file(path)?));
  }

  files.sort_by(|a, b| a.0.cmp(&b.0));
  Ok(tree_digest(files.iter().map(|(path, hash)| (path.as_str(), hash))))
}

/// Checksum of a file, read in 8 KiB blocks.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let mut file = fs::File::open(path).map_err(|e| HashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  })?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(|e| HashError::ReadFile {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Digest of in-memory bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}
