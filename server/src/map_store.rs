//! Catalog of dropper maps with write-through persistence
//!
//! Maps are keyed case-insensitively by name. Every successful mutation
//! rewrites the whole map record; a failed write is logged and the
//! in-memory catalog keeps the change, so the next autosave retries it.
//!
//! Each map carries a generation number assigned when it enters the
//! catalog. Edits keep it; deleting a map and creating another under the
//! same name does not, so sessions can tell the two apart.

use crate::error::DropperError;
use crate::storage::{is_valid_key, Collection, Storage};
use dropper_shared::{DropperMap, Level, LevelPoint, Location};
use log::{info, warn};
use std::collections::HashMap;

struct CatalogEntry {
    map: DropperMap,
    generation: u64,
}

pub struct MapStore {
    /// Maps indexed by lowercased name
    maps: HashMap<String, CatalogEntry>,
    next_generation: u64,
    storage: Box<dyn Storage>,
}

impl MapStore {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            maps: HashMap::new(),
            next_generation: 1,
            storage: Box::new(storage),
        }
    }

    fn insert(&mut self, index: String, map: DropperMap) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.maps.insert(index, CatalogEntry { map, generation });
    }

    /// Populates the catalog from storage.
    ///
    /// Records that cannot be read or decoded are skipped with a warning.
    /// Returns the number of maps loaded.
    pub fn load_all(&mut self) -> usize {
        let keys = match self.storage.keys(Collection::Maps) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Failed to list stored maps: {}", e);
                return 0;
            }
        };

        let mut loaded = 0;
        for key in keys {
            let map = match self.read_record(&key) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Failed to load map from {}: {}", key, e);
                    continue;
                }
            };

            let index = map.key();
            if self.maps.contains_key(&index) {
                warn!("Skipping map record {}: name '{}' already loaded", key, map.name);
                continue;
            }
            self.insert(index, map);
            loaded += 1;
        }

        info!("Loaded {} dropper map(s)", loaded);
        loaded
    }

    fn read_record(&self, key: &str) -> Result<DropperMap, DropperError> {
        let bytes = self
            .storage
            .read(Collection::Maps, key)?
            .ok_or_else(|| DropperError::MalformedRecord {
                key: key.to_string(),
                reason: "record vanished while loading".to_string(),
            })?;

        DropperMap::from_json(&bytes).map_err(|e| DropperError::MalformedRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Writes one map record. Failures are logged, not returned.
    fn persist(&mut self, index: &str) -> bool {
        let Some(CatalogEntry { map, .. }) = self.maps.get(index) else {
            return false;
        };

        let result = map
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                self.storage
                    .write(Collection::Maps, &map.name, &bytes)
                    .map_err(|e| e.to_string())
            });

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to save map {}: {}", map.name, e);
                false
            }
        }
    }

    /// Rewrites every map record; returns how many were written.
    pub fn save_all(&mut self) -> usize {
        let indices: Vec<String> = self.maps.keys().cloned().collect();
        indices
            .iter()
            .filter(|index| self.persist(index))
            .count()
    }

    /// Creates an empty map.
    ///
    /// The name doubles as the record key, so names that cannot be stored
    /// are refused along with names already taken.
    pub fn create(&mut self, name: &str, creator: &str) -> Result<(), DropperError> {
        if !is_valid_key(name) {
            return Err(DropperError::InvalidMapName(name.to_string()));
        }
        let index = DropperMap::key_for(name);
        if let Some(entry) = self.maps.get(&index) {
            return Err(DropperError::MapAlreadyExists(entry.map.name.clone()));
        }

        self.insert(index.clone(), DropperMap::new(name, creator));
        self.persist(&index);
        info!("Map '{}' created by {}", name, creator);
        Ok(())
    }

    /// Removes a map from the catalog and from storage.
    pub fn delete(&mut self, name: &str) -> bool {
        let Some(CatalogEntry { map, .. }) = self.maps.remove(&DropperMap::key_for(name)) else {
            return false;
        };

        if let Err(e) = self.storage.remove(Collection::Maps, &map.name) {
            warn!("Failed to delete stored map {}: {}", map.name, e);
        }
        info!("Map '{}' deleted", map.name);
        true
    }

    pub fn get(&self, name: &str) -> Option<&DropperMap> {
        self.maps
            .get(&DropperMap::key_for(name))
            .map(|entry| &entry.map)
    }

    /// Generation of the map currently stored under `name`.
    pub fn generation(&self, name: &str) -> Option<u64> {
        self.maps
            .get(&DropperMap::key_for(name))
            .map(|entry| entry.generation)
    }

    /// The map under `name`, only if it is still the given generation.
    pub fn get_at(&self, name: &str, generation: u64) -> Option<&DropperMap> {
        self.maps
            .get(&DropperMap::key_for(name))
            .filter(|entry| entry.generation == generation)
            .map(|entry| &entry.map)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.maps.contains_key(&DropperMap::key_for(name))
    }

    /// All maps, ordered by name.
    pub fn list(&self) -> Vec<&DropperMap> {
        let mut maps: Vec<&DropperMap> = self.maps.values().map(|entry| &entry.map).collect();
        maps.sort_by_key(|map| map.key());
        maps
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Applies `edit` to a map and persists the result.
    fn edit<T>(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut DropperMap) -> Result<T, DropperError>,
    ) -> Result<T, DropperError> {
        let index = DropperMap::key_for(name);
        let entry = self
            .maps
            .get_mut(&index)
            .ok_or_else(|| DropperError::MapNotFound(name.to_string()))?;

        let result = edit(&mut entry.map)?;
        self.persist(&index);
        Ok(result)
    }

    /// Places a start or end marker, creating the level if needed.
    pub fn set_level_point(
        &mut self,
        name: &str,
        level: u32,
        point: LevelPoint,
        location: Location,
    ) -> Result<(), DropperError> {
        if level == 0 {
            return Err(DropperError::InvalidLevelNumber(level));
        }
        self.edit(name, |map| {
            map.level_or_create(level).set_point(point, location);
            Ok(())
        })
    }

    /// Places a checkpoint on an existing level.
    pub fn set_checkpoint(
        &mut self,
        name: &str,
        level: u32,
        location: Location,
    ) -> Result<(), DropperError> {
        self.edit(name, |map| {
            let map_name = map.name.clone();
            let target = map
                .level_mut(level)
                .ok_or(DropperError::LevelNotFound {
                    map: map_name,
                    level,
                })?;
            target.checkpoint = Some(location);
            Ok(())
        })
    }

    pub fn remove_level(&mut self, name: &str, level: u32) -> Result<Level, DropperError> {
        self.edit(name, |map| {
            let map_name = map.name.clone();
            map.remove_level(level)
                .ok_or(DropperError::LevelNotFound {
                    map: map_name,
                    level,
                })
        })
    }
}
