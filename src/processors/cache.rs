//! Shared cache of lookup tables.
//!
//! Tables are immutable once built, so one table per (sensor model,
//! resolution) can be handed out to any number of threads as an `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::lookup::{ConfigurationError, LookupTable, TableKey};
use crate::core::metadata::CalibrationMetadata;

/// Thread-safe cache of built lookup tables.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: RwLock<HashMap<TableKey, Arc<LookupTable>>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached table for this sensor and resolution, building it
    /// on first use.
    ///
    /// Entries are keyed by [`TableKey`], which includes a fingerprint of
    /// the full calibration, so sensors sharing a model name never receive
    /// each other's tables.
    ///
    /// Tables are built outside the lock; if two threads race, the first
    /// insert wins and both receive the same `Arc`.
    pub fn get_or_build(
        &self,
        calibration: &CalibrationMetadata,
        rows: usize,
        columns: usize,
    ) -> Result<Arc<LookupTable>, ConfigurationError> {
        let key = TableKey::new(calibration, rows, columns);

        if let Some(table) = self.get(&key) {
            log::trace!("Lookup table cache hit for {:?}", key);
            return Ok(table);
        }

        let built = Arc::new(LookupTable::build(calibration, rows, columns)?);
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let table = Arc::clone(tables.entry(key).or_insert(built));
        Ok(table)
    }

    /// Cached table for `key`, if any.
    pub fn get(&self, key: &TableKey) -> Option<Arc<LookupTable>> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        self.tables.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached table. Outstanding `Arc`s stay valid.
    pub fn clear(&self) {
        self.tables.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cache_reuses_table() {
        let cache = TableCache::new();
        let calibration = CalibrationMetadata::uniform("OS-TEST", 4, 8, 5.0, -5.0);

        let a = cache.get_or_build(&calibration, 4, 8).unwrap();
        let b = cache.get_or_build(&calibration, 4, 8).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_keys_by_model() {
        let cache = TableCache::new();
        let first = CalibrationMetadata::uniform("OS-A", 2, 4, 5.0, -5.0);
        let second = CalibrationMetadata::uniform("OS-B", 2, 4, 5.0, -5.0);

        let a = cache.get_or_build(&first, 2, 4).unwrap();
        let b = cache.get_or_build(&second, 2, 4).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(a.len(), 8);
    }

    #[test]
    fn test_cache_separates_calibrations_of_one_model() {
        let cache = TableCache::new();
        let first = CalibrationMetadata::uniform("unknown", 2, 4, 5.0, -5.0);
        let mut second = first.clone();
        second.pixel_shift_by_row = vec![1, 0];

        let a = cache.get_or_build(&first, 2, 4).unwrap();
        let b = cache.get_or_build(&second, 2, 4).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.get(0, 0), b.get(0, 0));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_does_not_store_failures() {
        let cache = TableCache::new();
        let calibration = CalibrationMetadata::uniform("OS-TEST", 4, 8, 5.0, -5.0);
        assert!(cache.get_or_build(&calibration, 2, 8).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_shared_across_threads() {
        let cache = Arc::new(TableCache::new());
        let calibration = Arc::new(CalibrationMetadata::uniform("OS-TEST", 8, 16, 5.0, -5.0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calibration = Arc::clone(&calibration);
                thread::spawn(move || cache.get_or_build(&calibration, 8, 16).unwrap())
            })
            .collect();

        let tables: Vec<Arc<LookupTable>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.len(), 1);
        let cached = cache.get(tables[0].key()).unwrap();
        assert!(tables.iter().all(|t| Arc::ptr_eq(t, &cached)));
    }
}
