//! Mapping a revision's changed paths to the hosts that must be rebuilt.
//!
//! Resolution runs in two passes. The first collects hosts whose own segment
//! directory is deleted by the revision; those go to the janitor and are never
//! built. The second walks the changes in order and expands every affected
//! segment to its member hosts.
//!
//! Deleting the whole host directory is reported as a single path, so the
//! hosts it removed come from the listing of the previous revision.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::layout::{HostId, Inventory, Layout, PathClass, SegmentKind};
use crate::revision::{ChangeType, RevisionChangeSet};

/// A changed path that could not be mapped to any host. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("skipped {path}: {reason}")]
pub struct ResolutionWarning {
  pub path: String,
  pub reason: String,
}

impl ResolutionWarning {
  fn new(path: &str, reason: impl Into<String>) -> Self {
    Self {
      path: path.to_string(),
      reason: reason.into(),
    }
  }
}

/// Affected hosts of one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Resolution {
  /// Hosts to rebuild, in order of the first change affecting them.
  pub build: Vec<HostId>,
  /// Hosts whose segment was deleted.
  pub deleted: Vec<HostId>,
  pub warnings: Vec<ResolutionWarning>,
}

impl Resolution {
  pub fn is_empty(&self) -> bool {
    self.build.is_empty() && self.deleted.is_empty()
  }
}

pub struct HostResolver<'a> {
  layout: &'a Layout,
  inventory: &'a Inventory,
  previous_hosts: &'a [HostId],
}

impl<'a> HostResolver<'a> {
  pub fn new(layout: &'a Layout, inventory: &'a Inventory) -> Self {
    Self {
      layout,
      inventory,
      previous_hosts: &[],
    }
  }

  /// Hosts present before the revision, needed when it deletes the host directory.
  pub fn with_previous_hosts(mut self, hosts: &'a [HostId]) -> Self {
    self.previous_hosts = hosts;
    self
  }

  pub fn resolve(&self, changes: &RevisionChangeSet) -> Resolution {
    let mut resolution = Resolution::default();
    let deleted = self.collect_deleted(changes, &mut resolution);

    let mut seen: HashSet<HostId> = HashSet::new();
    let mut push = |resolution: &mut Resolution, host: &HostId| {
      if !deleted.contains(host) && seen.insert(host.clone()) {
        resolution.build.push(host.clone());
      }
    };

    for entry in &changes.changes {
      match self.layout.classify(&entry.path) {
        PathClass::Segment { segment, .. } if segment.kind == SegmentKind::Host => {
          let Some(host) = self.host_of(&segment.name) else {
            continue;
          };
          if deleted.contains(&host) {
            continue;
          }
          if self.inventory.contains(&host) {
            push(&mut resolution, &host);
          } else {
            warn!(path = %entry.path, host = %host, "change below an unknown host directory");
            resolution
              .warnings
              .push(ResolutionWarning::new(&entry.path, format!("host {} does not exist at this revision", host)));
          }
        }
        PathClass::Segment { segment, .. } => {
          let before = resolution.build.len();
          for host in self.inventory.members_of(&segment) {
            push(&mut resolution, host);
          }
          debug!(
            path = %entry.path,
            segment = %segment,
            added = resolution.build.len() - before,
            "expanded shared segment"
          );
        }
        PathClass::KindDir(SegmentKind::Host) => {
          // Handled by the deletion pass; adding or touching the directory itself changes no host.
          debug!(path = %entry.path, change = %entry.change, "change of the host directory itself");
        }
        PathClass::KindDir(kind) => {
          for host in self.inventory.members_of_kind(kind) {
            push(&mut resolution, host);
          }
        }
        PathClass::ConfigRoot => {
          if entry.change == ChangeType::Delete {
            warn!(path = %entry.path, "configuration root deleted");
            resolution
              .warnings
              .push(ResolutionWarning::new(&entry.path, "configuration root deleted"));
            continue;
          }
          for host in self.inventory.hosts() {
            push(&mut resolution, &host.id);
          }
        }
        PathClass::Unrecognized => {
          warn!(path = %entry.path, "path does not match the configuration layout");
          resolution
            .warnings
            .push(ResolutionWarning::new(&entry.path, "path does not match the configuration layout"));
        }
      }
    }

    info!(
      revision = %changes.revision,
      changes = changes.changes.len(),
      build = resolution.build.len(),
      deleted = resolution.deleted.len(),
      warnings = resolution.warnings.len(),
      "resolved affected hosts"
    );
    resolution
  }

  /// First pass: hosts routed to the janitor.
  fn collect_deleted(&self, changes: &RevisionChangeSet, resolution: &mut Resolution) -> HashSet<HostId> {
    let mut deleted = HashSet::new();
    let mut add = |resolution: &mut Resolution, host: HostId| {
      if deleted.insert(host.clone()) {
        resolution.deleted.push(host);
      }
    };

    for entry in changes.deletions() {
      match self.layout.classify(&entry.path) {
        PathClass::Segment { segment, root: true } if segment.kind == SegmentKind::Host => {
          if let Some(host) = self.host_of(&segment.name) {
            add(resolution, host);
          }
        }
        PathClass::KindDir(SegmentKind::Host) => {
          if self.previous_hosts.is_empty() {
            warn!(path = %entry.path, "host directory deleted but no hosts are known before this revision");
          }
          for host in self.previous_hosts {
            add(resolution, host.clone());
          }
        }
        _ => {}
      }
    }

    deleted
  }

  fn host_of(&self, name: &str) -> Option<HostId> {
    HostId::new(name).ok()
  }
}
