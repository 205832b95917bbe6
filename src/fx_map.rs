//! The per-FX bijection and its on-disk store.
//!
//! An [`FxMap`] is a bijection between source parameter slots (the hardware
//! controller's 1..N) and target parameter slots (whatever the DAW exposes).
//! [`FxMapStore`] is a named collection of these, persisted as one YAML file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bimap::BiMap;
use log::{debug, info, warn};

use crate::error::{ProxyError, ProxyResult};

/// A bijective source↔target parameter mapping for a single FX.
#[derive(Debug, Clone, Default)]
pub struct FxMap {
    map: BiMap<u32, u32>,
}

impl FxMap {
    pub fn new() -> Self {
        FxMap { map: BiMap::new() }
    }

    fn from_pairs(fx_name: &str, pairs: BTreeMap<u32, u32>) -> ProxyResult<FxMap> {
        let mut map = BiMap::new();
        for (source, target) in pairs {
            map.insert_no_overwrite(source, target).map_err(|_| {
                ProxyError::DuplicateFxMapKey("source or target", source as i64, fx_name.to_string())
            })?;
        }
        Ok(FxMap { map })
    }

    /// Looks up the target bound to `source`.
    pub fn get(&self, source: u32) -> Option<u32> {
        self.map.get_by_left(&source).copied()
    }

    /// Looks up the source bound to `target`.
    pub fn inverse(&self, target: u32) -> Option<u32> {
        self.map.get_by_right(&target).copied()
    }

    /// Inserts `(source, target)`, first removing any prior binding that
    /// involves either value. This is the only mutator used in steady state.
    pub fn forceput(&mut self, source: u32, target: u32) {
        self.map.remove_by_left(&source);
        self.map.remove_by_right(&target);
        self.map.insert(source, target);
    }

    pub fn remove_by_source(&mut self, source: u32) -> Option<u32> {
        self.map.remove_by_left(&source).map(|(_, t)| t)
    }

    pub fn remove_by_target(&mut self, target: u32) -> Option<u32> {
        self.map.remove_by_right(&target).map(|(s, _)| s)
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.map.iter().map(|(&s, &t)| (s, t))
    }

    fn to_pairs(&self) -> BTreeMap<u32, u32> {
        self.map.iter().map(|(&s, &t)| (s, t)).collect()
    }
}

/// A named collection of [`FxMap`]s, one per FX the DAW has ever announced.
#[derive(Debug, Clone, Default)]
pub struct FxMapStore {
    maps: BTreeMap<String, FxMap>,
}

type RawStore = BTreeMap<String, BTreeMap<u32, u32>>;

impl FxMapStore {
    pub fn new() -> Self {
        FxMapStore {
            maps: BTreeMap::new(),
        }
    }

    /// Loads the store from `path`. A missing file yields an empty store, as
    /// does an empty YAML document (`---` or zero bytes).
    pub fn load(path: impl AsRef<Path>) -> ProxyResult<FxMapStore> {
        let path = path.as_ref();
        if !path.exists() {
            info!("no fx map store at {}, starting empty", path.display());
            return Ok(FxMapStore::new());
        }

        let text = fs::read_to_string(path).map_err(|source| ProxyError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;

        let raw: RawStore = if text.trim().is_empty() {
            RawStore::default()
        } else {
            serde_yaml::from_str::<Option<RawStore>>(&text)?.unwrap_or_default()
        };

        let mut maps = BTreeMap::new();
        for (fx_name, pairs) in raw {
            let fx_map = FxMap::from_pairs(&fx_name, pairs)?;
            maps.insert(fx_name, fx_map);
        }
        info!("loaded fx map store from {} ({} fx entries)", path.display(), maps.len());
        Ok(FxMapStore { maps })
    }

    /// Writes the store to `path` atomically: serialize to a temp file in the
    /// same directory, then rename over the destination. This guarantees
    /// `path` never contains a truncated or partially-written document, even
    /// if the process is killed mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> ProxyResult<()> {
        let path = path.as_ref();
        let raw: RawStore = self
            .maps
            .iter()
            .map(|(fx_name, fx_map)| (fx_name.clone(), fx_map.to_pairs()))
            .collect();

        let yaml = serde_yaml::to_string(&raw)?;

        let tmp_path = path.with_extension("yaml.tmp");
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ProxyError::ConfigRead {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        fs::write(&tmp_path, yaml).map_err(|source| ProxyError::ConfigRead {
            path: tmp_path.display().to_string(),
            source,
        })?;
        fs::rename(&tmp_path, path).map_err(|source| ProxyError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        debug!("saved fx map store to {}", path.display());
        Ok(())
    }

    /// Returns the existing entry for `fx_name`, inserting a fresh empty one
    /// if this FX has not been seen before.
    pub fn get_or_create(&mut self, fx_name: &str) -> &mut FxMap {
        if !self.maps.contains_key(fx_name) {
            warn!("no saved map for fx '{}', starting fresh", fx_name);
        }
        self.maps.entry(fx_name.to_string()).or_default()
    }

    pub fn get(&self, fx_name: &str) -> Option<&FxMap> {
        self.maps.get(fx_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forceput_is_bijective_and_evicts_conflicts() {
        let mut m = FxMap::new();
        m.forceput(2, 7);
        m.forceput(3, 9);
        assert_eq!(m.get(2), Some(7));
        assert_eq!(m.inverse(9), Some(3));

        // S5: forceput(2, 9) must evict both the old 2->7 and 3->9 bindings.
        m.forceput(2, 9);
        assert_eq!(m.len(), 1);
        assert_eq!(m.get(2), Some(9));
        assert_eq!(m.get(3), None);
        assert_eq!(m.inverse(7), None);
    }

    #[test]
    fn load_missing_file_is_empty_store() {
        let store = FxMapStore::load("/nonexistent/oscremap_fxmaps_test.yaml").unwrap();
        assert!(store.maps.is_empty());
    }

    #[test]
    fn load_rejects_duplicate_target_in_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fxmaps.yaml");
        fs::write(&path, "Reverb:\n  1: 5\n  2: 5\n").unwrap();
        let err = FxMapStore::load(&path).unwrap_err();
        assert!(matches!(err, ProxyError::DuplicateFxMapKey(..)));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fxmaps.yaml");

        let mut store = FxMapStore::new();
        store.get_or_create("Reverb").forceput(1, 5);
        store.get_or_create("Reverb").forceput(2, 7);
        store.get_or_create("Delay").forceput(1, 1);
        store.save(&path).unwrap();

        let loaded = FxMapStore::load(&path).unwrap();
        assert_eq!(loaded.get("Reverb").unwrap().get(1), Some(5));
        assert_eq!(loaded.get("Reverb").unwrap().get(2), Some(7));
        assert_eq!(loaded.get("Delay").unwrap().get(1), Some(1));
    }

    #[test]
    fn save_never_leaves_destination_missing_or_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fxmaps.yaml");

        let mut store = FxMapStore::new();
        store.get_or_create("Reverb").forceput(1, 5);
        store.save(&path).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        assert!(!first.is_empty());

        store.get_or_create("Reverb").forceput(2, 9);
        store.save(&path).unwrap();
        let second = fs::read_to_string(&path).unwrap();
        assert!(second.contains('9'));
        assert!(!dir.path().join("fxmaps.yaml.tmp").exists());
    }

    #[test]
    fn get_or_create_inserts_fresh_empty_map() {
        let mut store = FxMapStore::new();
        assert!(store.get("Unknown").is_none());
        let fx_map = store.get_or_create("Unknown");
        assert!(fx_map.is_empty());
        assert!(store.get("Unknown").is_some());
    }
}
