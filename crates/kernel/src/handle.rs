//! Object handles.
//!
//! A handle packs a slot index and a generation counter:
//!
//! ```text
//!  31 30            16 15             0
//! +--+----------------+----------------+
//! |0 |   generation   |   slot index   |
//! +--+----------------+----------------+
//! ```
//!
//! Bit 31 is always clear, so every handle is a positive `i32` and can be
//! passed through integer-valued attributes. Generations start at 1, which
//! keeps zero free as a "no object" value.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const INDEX_BITS: u32 = 16;
pub const MAX_INDEX: u32 = (1 << INDEX_BITS) - 1;
pub const MAX_GENERATION: u32 = 0x7FFF;

/// Opaque reference to one live object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Handle(u32);

impl Handle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        debug_assert!(index <= MAX_INDEX);
        debug_assert!((1..=MAX_GENERATION).contains(&generation));
        Handle((generation << INDEX_BITS) | index)
    }

    /// Reinterpret a raw integer. Returns `None` for values that can never
    /// name an object (zero, negative, generation zero).
    pub fn from_raw(raw: i32) -> Option<Self> {
        if raw <= 0 {
            return None;
        }
        let handle = Handle(raw as u32);
        if handle.generation() == 0 {
            return None;
        }
        Some(handle)
    }

    pub fn raw(self) -> i32 {
        self.0 as i32
    }

    pub fn index(self) -> u32 {
        self.0 & MAX_INDEX
    }

    pub fn generation(self) -> u32 {
        self.0 >> INDEX_BITS
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}#{})", self.index(), self.generation())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of object the kernel manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Context,
    Certificate,
    Keyset,
    Device,
    Envelope,
    Session,
    User,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 7] = [
        ObjectKind::Context,
        ObjectKind::Certificate,
        ObjectKind::Keyset,
        ObjectKind::Device,
        ObjectKind::Envelope,
        ObjectKind::Session,
        ObjectKind::User,
    ];

    pub fn bit(self) -> u8 {
        match self {
            ObjectKind::Context => 1 << 0,
            ObjectKind::Certificate => 1 << 1,
            ObjectKind::Keyset => 1 << 2,
            ObjectKind::Device => 1 << 3,
            ObjectKind::Envelope => 1 << 4,
            ObjectKind::Session => 1 << 5,
            ObjectKind::User => 1 << 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::Context => "context",
            ObjectKind::Certificate => "certificate",
            ObjectKind::Keyset => "keyset",
            ObjectKind::Device => "device",
            ObjectKind::Envelope => "envelope",
            ObjectKind::Session => "session",
            ObjectKind::User => "user",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of object kinds, used by attribute descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindSet(u8);

impl KindSet {
    pub const NONE: KindSet = KindSet(0);
    pub const ALL: KindSet = KindSet(0x7F);
    pub const CONTEXT: KindSet = KindSet(1 << 0);
    pub const CERTIFICATE: KindSet = KindSet(1 << 1);
    pub const KEYSET: KindSet = KindSet(1 << 2);
    pub const DEVICE: KindSet = KindSet(1 << 3);
    pub const ENVELOPE: KindSet = KindSet(1 << 4);
    pub const SESSION: KindSet = KindSet(1 << 5);
    pub const USER: KindSet = KindSet(1 << 6);

    pub const fn union(self, other: KindSet) -> KindSet {
        KindSet(self.0 | other.0)
    }

    pub const fn without(self, other: KindSet) -> KindSet {
        KindSet(self.0 & !other.0)
    }

    pub fn contains(self, kind: ObjectKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn kinds(self) -> impl Iterator<Item = ObjectKind> {
        ObjectKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}
