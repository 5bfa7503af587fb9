use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::{HostId, Layout, SegmentId, SegmentKind};

/// A host of one revision with its applicable segments in ascending priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Host {
  pub id: HostId,
  pub segments: Vec<SegmentId>,
  /// False when the name did not match the host pattern.
  pub known: bool,
}

impl Host {
  pub fn uses(&self, segment: &SegmentId) -> bool {
    self.segments.contains(segment)
  }

  pub fn uses_kind(&self, kind: SegmentKind) -> bool {
    self.segments.iter().any(|s| s.kind == kind)
  }
}

/// Every host present at a revision, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
  hosts: BTreeMap<HostId, Host>,
}

impl Inventory {
  pub fn build(layout: &Layout, hosts: impl IntoIterator<Item = HostId>) -> Self {
    let mut inventory = BTreeMap::new();
    for id in hosts {
      let (mut segments, known) = match layout.shared_segments_for(&id) {
        Some(segments) => (segments, true),
        None => {
          debug!(host = %id, "host name does not match the host pattern");
          (vec![SegmentId::global()], false)
        }
      };
      segments.extend(layout.assigned_segments(&id).iter().cloned());
      segments.sort();
      segments.dedup();
      segments.push(SegmentId::host(&id));

      inventory.insert(id.clone(), Host { id, segments, known });
    }
    Self { hosts: inventory }
  }

  pub fn contains(&self, host: &HostId) -> bool {
    self.hosts.contains_key(host)
  }

  pub fn get(&self, host: &HostId) -> Option<&Host> {
    self.hosts.get(host)
  }

  /// Hosts in id order.
  pub fn hosts(&self) -> impl Iterator<Item = &Host> {
    self.hosts.values()
  }

  /// Hosts assigned to a segment, in id order.
  pub fn members_of<'a>(&'a self, segment: &'a SegmentId) -> impl Iterator<Item = &'a HostId> + 'a {
    self.hosts.values().filter(move |h| h.uses(segment)).map(|h| &h.id)
  }

  /// Hosts with any segment of the given kind, in id order.
  pub fn members_of_kind(&self, kind: SegmentKind) -> impl Iterator<Item = &HostId> {
    self.hosts.values().filter(move |h| h.uses_kind(kind)).map(|h| &h.id)
  }
}
