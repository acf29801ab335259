//! Node metadata types: create modes, ACLs and stats.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// Survives the session that created it.
    #[default]
    Persistent,
    /// Persistent, with a monotonically increasing suffix appended to the name.
    PersistentSequential,
    /// Removed when the creating session ends.
    Ephemeral,
    /// Ephemeral, with a sequential suffix.
    EphemeralSequential,
    /// Removed by the store once its last child has been removed.
    Container,
}

impl CreateMode {
    /// Returns true for the ephemeral variants.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    /// Returns true for the sequential variants.
    pub fn is_sequential(&self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }

    /// Returns true for container nodes.
    pub fn is_container(&self) -> bool {
        matches!(self, CreateMode::Container)
    }

    /// Returns the wire flag for this mode.
    pub fn flag(&self) -> i32 {
        match self {
            CreateMode::Persistent => 0,
            CreateMode::Ephemeral => 1,
            CreateMode::PersistentSequential => 2,
            CreateMode::EphemeralSequential => 3,
            CreateMode::Container => 4,
        }
    }

    /// Decodes a wire flag, falling back to `default` for unknown values.
    pub fn from_flag(flag: i32, default: CreateMode) -> CreateMode {
        match flag {
            0 => CreateMode::Persistent,
            1 => CreateMode::Ephemeral,
            2 => CreateMode::PersistentSequential,
            3 => CreateMode::EphemeralSequential,
            4 => CreateMode::Container,
            _ => default,
        }
    }
}

/// Permission bits carried by an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Perms(u32);

impl Perms {
    /// Read data and list children.
    pub const READ: Perms = Perms(1);
    /// Set data.
    pub const WRITE: Perms = Perms(1 << 1);
    /// Create children.
    pub const CREATE: Perms = Perms(1 << 2);
    /// Delete children.
    pub const DELETE: Perms = Perms(1 << 3);
    /// Change the ACL.
    pub const ADMIN: Perms = Perms(1 << 4);
    /// Every permission.
    pub const ALL: Perms = Perms(0b1_1111);
    /// No permission.
    pub const NONE: Perms = Perms(0);

    /// Creates a permission set from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Perms(bits & Self::ALL.0)
    }

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is present.
    pub const fn contains(&self, other: Perms) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two permission sets.
    #[must_use]
    pub const fn union(self, other: Perms) -> Perms {
        Perms(self.0 | other.0)
    }
}

/// An authenticated identity: `scheme:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    /// Authentication scheme (`world`, `digest`, `ip`, ...).
    pub scheme: String,
    /// Identity within the scheme.
    pub id: String,
}

impl Id {
    /// Creates a new identity.
    pub fn new(scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// The identity that matches every client.
    pub fn anyone() -> Self {
        Self::new("world", "anyone")
    }

    /// Returns true for `world:anyone`.
    pub fn is_anyone(&self) -> bool {
        self.scheme == "world" && self.id == "anyone"
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.id)
    }
}

/// A single ACL entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    /// Granted permissions.
    pub perms: Perms,
    /// Identity the permissions are granted to.
    pub id: Id,
}

impl Acl {
    /// Creates a new ACL entry.
    pub fn new(perms: Perms, id: Id) -> Self {
        Self { perms, id }
    }

    /// Every permission for everyone.
    pub fn open_unsafe() -> Vec<Acl> {
        vec![Acl::new(Perms::ALL, Id::anyone())]
    }

    /// Read-only for everyone.
    pub fn read_unsafe() -> Vec<Acl> {
        vec![Acl::new(Perms::READ, Id::anyone())]
    }
}

/// Node metadata returned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Transaction id that created the node.
    pub czxid: i64,
    /// Transaction id that last modified the node.
    pub mzxid: i64,
    /// Data version.
    pub version: i32,
    /// Child list version.
    pub cversion: i32,
    /// ACL version.
    pub aversion: i32,
    /// Owning session for ephemeral nodes, 0 otherwise.
    pub ephemeral_owner: i64,
    /// Length of the data payload.
    pub data_length: i32,
    /// Number of children.
    pub num_children: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_mode_flags() {
        assert!(CreateMode::EphemeralSequential.is_ephemeral());
        assert!(CreateMode::EphemeralSequential.is_sequential());
        assert!(!CreateMode::Container.is_ephemeral());
        assert_eq!(
            CreateMode::from_flag(CreateMode::Container.flag(), CreateMode::Persistent),
            CreateMode::Container
        );
        assert_eq!(
            CreateMode::from_flag(99, CreateMode::Persistent),
            CreateMode::Persistent
        );
    }

    #[test]
    fn perms_contains() {
        let rw = Perms::READ.union(Perms::WRITE);
        assert!(rw.contains(Perms::READ));
        assert!(!rw.contains(Perms::CREATE));
        assert!(Perms::ALL.contains(rw));
        assert_eq!(Perms::from_bits(0xff), Perms::ALL);
    }

    #[test]
    fn acl_helpers() {
        let acl = Acl::read_unsafe();
        assert_eq!(acl.len(), 1);
        assert!(acl[0].id.is_anyone());
        assert_eq!(acl[0].perms, Perms::READ);
        assert_eq!(Id::new("digest", "bob").to_string(), "digest:bob");
    }
}
