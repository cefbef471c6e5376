//! Latch identity and the engine-wide latch registry.
//!
//! Every latch in the engine is created with a [`LatchId`], an opaque tag
//! the registry resolves to a display name and a performance-schema key.
//! The id itself carries no behavior; it exists so diagnostics (wait-array
//! dumps, long-wait warnings, probe registration) can say *which* latch a
//! thread is stuck on without the latch storing a string.
//!
//! Registration happens once at engine startup. Lookups for unregistered
//! ids degrade to a placeholder name rather than failing, because latch
//! diagnostics must never themselves become a crash site.

use std::collections::BTreeMap;

use parking_lot::RwLock;

/// Opaque identifier of a latch class.
///
/// The zero id, [`LatchId::UNKNOWN`], is what zero-initialized latch
/// instances carry before `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LatchId(u16);

impl LatchId {
    /// The id carried by latches that were never initialized.
    pub const UNKNOWN: LatchId = LatchId(0);

    /// Creates a latch id from its raw tag.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw tag.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for LatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", name(*self))
    }
}

/// Opaque performance-schema key associated with a latch class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PfsKey(pub u32);

impl PfsKey {
    /// Key used for latch classes that were never registered.
    pub const NONE: PfsKey = PfsKey(0);
}

#[derive(Debug, Clone, Copy)]
struct LatchMeta {
    name: &'static str,
    pfs_key: PfsKey,
}

static REGISTRY: RwLock<BTreeMap<u16, LatchMeta>> = RwLock::new(BTreeMap::new());

/// Registers a latch class. Idempotent for identical metadata; a debug
/// build trips on conflicting re-registration.
pub fn register(id: LatchId, name: &'static str, pfs_key: PfsKey) {
    let mut registry = REGISTRY.write();
    if let Some(existing) = registry.get(&id.raw()) {
        debug_assert!(
            existing.name == name && existing.pfs_key == pfs_key,
            "latch id {} re-registered as {:?}, was {:?}",
            id.raw(),
            name,
            existing.name,
        );
        return;
    }
    registry.insert(id.raw(), LatchMeta { name, pfs_key });
}

/// Resolves a latch id to its display name.
#[must_use]
pub fn name(id: LatchId) -> &'static str {
    REGISTRY
        .read()
        .get(&id.raw())
        .map_or("unknown latch", |meta| meta.name)
}

/// Resolves a latch id to its performance-schema key.
#[must_use]
pub fn pfs_key(id: LatchId) -> PfsKey {
    REGISTRY
        .read()
        .get(&id.raw())
        .map_or(PfsKey::NONE, |meta| meta.pfs_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_id_degrades_gracefully() {
        let id = LatchId::new(u16::MAX);
        assert_eq!(name(id), "unknown latch");
        assert_eq!(pfs_key(id), PfsKey::NONE);
    }

    #[test]
    fn registered_id_resolves() {
        let id = LatchId::new(901);
        register(id, "test_latch_901", PfsKey(901));
        assert_eq!(name(id), "test_latch_901");
        assert_eq!(pfs_key(id), PfsKey(901));
        assert_eq!(format!("{id}"), "test_latch_901");
    }

    #[test]
    fn re_registration_is_idempotent() {
        let id = LatchId::new(902);
        register(id, "test_latch_902", PfsKey(902));
        register(id, "test_latch_902", PfsKey(902));
        assert_eq!(name(id), "test_latch_902");
    }

    #[test]
    fn default_id_is_unknown() {
        assert_eq!(LatchId::default(), LatchId::UNKNOWN);
    }
}
