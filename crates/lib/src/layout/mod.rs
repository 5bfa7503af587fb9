//! Overlay layout: segment kinds, host identifiers and the mapping between
//! repository paths and segments.
//!
//! # Repository layout
//!
//! ```text
//! {svn_path_to_config}/
//! ├── all/...             # global segment
//! ├── dist/<name>/...     # distribution segments
//! ├── loc/<name>/...      # location segments
//! ├── env/<name>/...      # environment segments
//! ├── bu/<name>/...       # business unit segments
//! └── host/<host>/...     # one segment per host
//! ```
//!
//! Directory names are configurable, see [`crate::config::LayoutConfig`].

mod inventory;

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;

pub use inventory::{Host, Inventory};

/// Kind of an overlay segment.
///
/// Variants are declared in ascending priority; the derived `Ord` is the
/// overlay order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
  Global,
  Distribution,
  Location,
  Environment,
  BusinessUnit,
  Host,
}

impl SegmentKind {
  pub const ALL: [SegmentKind; 6] = [
    SegmentKind::Global,
    SegmentKind::Distribution,
    SegmentKind::Location,
    SegmentKind::Environment,
    SegmentKind::BusinessUnit,
    SegmentKind::Host,
  ];

  /// Priority rank; higher ranks override lower ones.
  pub fn rank(self) -> u8 {
    match self {
      SegmentKind::Global => 0,
      SegmentKind::Distribution => 1,
      SegmentKind::Location => 2,
      SegmentKind::Environment => 3,
      SegmentKind::BusinessUnit => 4,
      SegmentKind::Host => 5,
    }
  }

  /// Shared segments apply to every host assigned to them.
  pub fn is_shared(self) -> bool {
    self != SegmentKind::Host
  }

  pub fn as_str(self) -> &'static str {
    match self {
      SegmentKind::Global => "global",
      SegmentKind::Distribution => "distribution",
      SegmentKind::Location => "location",
      SegmentKind::Environment => "environment",
      SegmentKind::BusinessUnit => "business_unit",
      SegmentKind::Host => "host",
    }
  }
}

impl fmt::Display for SegmentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One concrete overlay segment, e.g. location `ber`.
///
/// The global segment has an empty name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId {
  pub kind: SegmentKind,
  pub name: String,
}

impl SegmentId {
  pub fn new(kind: SegmentKind, name: impl Into<String>) -> Self {
    Self {
      kind,
      name: name.into(),
    }
  }

  pub fn global() -> Self {
    Self::new(SegmentKind::Global, "")
  }

  pub fn host(host: &HostId) -> Self {
    Self::new(SegmentKind::Host, host.as_str())
  }

  /// Directory name used when exporting this segment into a work directory.
  ///
  /// Prefixed with the rank so a listing shows the overlay order.
  pub fn work_dir_name(&self) -> String {
    if self.name.is_empty() {
      format!("{}-{}", self.kind.rank(), self.kind)
    } else {
      format!("{}-{}-{}", self.kind.rank(), self.kind, self.name)
    }
  }
}

impl fmt::Display for SegmentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.name.is_empty() {
      write!(f, "{}", self.kind)
    } else {
      write!(f, "{}:{}", self.kind, self.name)
    }
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid host name \"{0}\"")]
pub struct InvalidHostId(pub String);

/// Validated host identifier.
///
/// Host names become directory and package names, so they must be a single
/// non-empty path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostId(String);

impl HostId {
  pub fn new(name: impl Into<String>) -> Result<Self, InvalidHostId> {
    let name = name.into();
    let valid = !name.is_empty()
      && name != "."
      && name != ".."
      && !name.starts_with('.')
      && name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid { Ok(Self(name)) } else { Err(InvalidHostId(name)) }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for HostId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for HostId {
  type Error = InvalidHostId;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    HostId::new(value)
  }
}

impl From<HostId> for String {
  fn from(id: HostId) -> Self {
    id.0
  }
}

/// What a repository path refers to within the layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathClass {
  /// A path inside a segment; `root` when it is the segment directory itself.
  Segment { segment: SegmentId, root: bool },
  /// The directory holding all segments of a shared kind, or all host segments.
  KindDir(SegmentKind),
  /// The configuration root itself.
  ConfigRoot,
  /// Outside the configuration root or not matching the layout.
  Unrecognized,
}

/// Compiled layout convention.
#[derive(Debug, Clone)]
pub struct Layout {
  /// Path components of the configuration root inside the repository.
  root: Vec<String>,
  dirs: [(SegmentKind, String); 6],
  host_pattern: Regex,
  assignments: BTreeMap<String, Vec<SegmentId>>,
}

impl Layout {
  pub fn from_config(config: &Config) -> Result<Self, regex::Error> {
    let layout = &config.layout;
    Ok(Self {
      root: components(&config.svn_path_to_config),
      dirs: [
        (SegmentKind::Global, layout.global_dir.clone()),
        (SegmentKind::Distribution, layout.distribution_dir.clone()),
        (SegmentKind::Location, layout.location_dir.clone()),
        (SegmentKind::Environment, layout.environment_dir.clone()),
        (SegmentKind::BusinessUnit, layout.business_unit_dir.clone()),
        (SegmentKind::Host, layout.host_dir.clone()),
      ],
      host_pattern: Regex::new(&layout.host_pattern)?,
      assignments: layout.assignments.clone(),
    })
  }

  pub fn dir_name(&self, kind: SegmentKind) -> &str {
    self
      .dirs
      .iter()
      .find(|(k, _)| *k == kind)
      .map(|(_, dir)| dir.as_str())
      .unwrap_or_default()
  }

  fn kind_for_dir(&self, dir: &str) -> Option<SegmentKind> {
    self.dirs.iter().find(|(_, d)| d == dir).map(|(k, _)| *k)
  }

  fn root_path(&self) -> String {
    let mut path = String::new();
    for component in &self.root {
      path.push('/');
      path.push_str(component);
    }
    path
  }

  /// Repository path of the directory holding every host segment.
  pub fn host_root_path(&self) -> String {
    format!("{}/{}", self.root_path(), self.dir_name(SegmentKind::Host))
  }

  /// Repository path of a segment directory.
  pub fn segment_path(&self, segment: &SegmentId) -> String {
    let base = format!("{}/{}", self.root_path(), self.dir_name(segment.kind));
    if segment.kind == SegmentKind::Global {
      base
    } else {
      format!("{}/{}", base, segment.name)
    }
  }

  /// Classify a repository path reported by the version control system.
  pub fn classify(&self, repo_path: &str) -> PathClass {
    let parts = components(repo_path);
    let Some(rest) = parts.strip_prefix(self.root.as_slice()) else {
      return PathClass::Unrecognized;
    };

    let Some((first, rest)) = rest.split_first() else {
      return PathClass::ConfigRoot;
    };
    let Some(kind) = self.kind_for_dir(first) else {
      return PathClass::Unrecognized;
    };

    if kind == SegmentKind::Global {
      return PathClass::Segment {
        segment: SegmentId::global(),
        root: rest.is_empty(),
      };
    }

    let Some((name, rest)) = rest.split_first() else {
      return PathClass::KindDir(kind);
    };

    let segment = if kind == SegmentKind::Host {
      match HostId::new(name.as_str()) {
        Ok(host) => SegmentId::host(&host),
        Err(_) => return PathClass::Unrecognized,
      }
    } else {
      SegmentId::new(kind, name.as_str())
    };

    PathClass::Segment {
      segment,
      root: rest.is_empty(),
    }
  }

  /// Shared segments a host is assigned to by its name.
  ///
  /// Returns `None` when the name does not match the host pattern.
  pub fn shared_segments_for(&self, host: &HostId) -> Option<Vec<SegmentId>> {
    let captures = self.host_pattern.captures(host.as_str())?;

    let groups = [
      (SegmentKind::Distribution, "distribution"),
      (SegmentKind::Location, "location"),
      (SegmentKind::Environment, "environment"),
      (SegmentKind::BusinessUnit, "business_unit"),
    ];

    let mut segments = vec![SegmentId::global()];
    for (kind, group) in groups {
      if let Some(m) = captures.name(group)
        && !m.as_str().is_empty()
      {
        segments.push(SegmentId::new(kind, m.as_str()));
      }
    }
    Some(segments)
  }

  /// Shared segments configured for a host explicitly.
  pub fn assigned_segments(&self, host: &HostId) -> &[SegmentId] {
    self.assignments.get(host.as_str()).map(Vec::as_slice).unwrap_or_default()
  }
}

fn components(path: &str) -> Vec<String> {
  path
    .split('/')
    .filter(|c| !c.is_empty() && *c != ".")
    .map(str::to_string)
    .collect()
}
