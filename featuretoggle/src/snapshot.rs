use arc_swap::ArcSwapOption;
use std::collections::HashMap;
use std::sync::Arc;

/// Suffix of the sibling entry declaring how a flag's value is parsed.
pub const TYPE_TAG_SUFFIX: &str = ".type";

/// Immutable point-in-time copy of every entry of one namespace.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    entries: HashMap<String, String>,
}

impl Snapshot {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Snapshot { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// The raw type tag of `key`, read from `<key>.type`.
    pub fn type_tag(&self, key: &str) -> Option<&str> {
        self.get(&format!("{key}{TYPE_TAG_SUFFIX}"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<HashMap<String, String>> for Snapshot {
    fn from(entries: HashMap<String, String>) -> Self {
        Snapshot::new(entries)
    }
}

impl<K, V> FromIterator<(K, V)> for Snapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Snapshot::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Holds the current snapshot. Readers get an `Arc` to a complete snapshot
/// and keep it for the duration of their call; a rebuild swaps the pointer
/// and never mutates a published snapshot.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: ArcSwapOption<Snapshot>,
}

impl SnapshotStore {
    /// An empty store. Accessors see it as not initiated until the first install.
    pub fn new() -> Self {
        SnapshotStore {
            current: ArcSwapOption::empty(),
        }
    }

    pub fn load(&self) -> Option<Arc<Snapshot>> {
        self.current.load_full()
    }

    /// Publishes `snapshot`, replacing the previous one.
    pub fn install(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.current.store(Some(snapshot.clone()));
        snapshot
    }

    pub fn is_initiated(&self) -> bool {
        self.current.load().is_some()
    }
}
