//! Sled-backed materialized-result cache.
//!
//! One metadata tree maps entry ids to encoded entry descriptors; each
//! entry's rows live in their own dynamically named tree, keyed by row
//! index. The cache is append-only: correctness assumes the underlying
//! sources are static for the process lifetime, so there is no
//! invalidation path at all.

use std::path::PathBuf;

use sled::{Db, Tree};
use tracing::{debug, warn};

use fedtab_types::Row;

use crate::codec::{decode_filters, decode_row, encode_filters, encode_row};
use crate::error::Error;
use crate::model::{ConceptId, Filter};

use super::mask::ConceptMask;
use super::subsume::residual;

/// Tree name for entry metadata.
const META_TREE: &str = "cache:meta";

/// Key in the default tree recording the mask width the cache was
/// built for.
const WIDTH_KEY: &[u8] = b"cache:concept_count";

/// Prefix for per-entry row trees.
const ROWS_TREE_PREFIX: &str = "cache:rows:";

/// Configuration for the result cache's backing store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Enable zstd compression.
    pub compression: bool,

    /// Temporary database (deleted on drop).
    pub temporary: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./fedtab_cache"),
            cache_capacity: 64 * 1024 * 1024,
            compression: true,
            temporary: false,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            ..Default::default()
        }
    }

    fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        config
    }
}

/// Metadata describing one cached entry.
struct CacheMeta {
    columns: Vec<ConceptId>,
    fields_mask: ConceptMask,
    filter_mask: ConceptMask,
    filters: Vec<Filter>,
    distinct: bool,
}

impl CacheMeta {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.columns.len() as u16).to_le_bytes());
        for concept in &self.columns {
            buf.extend_from_slice(&concept.0.to_le_bytes());
        }
        self.fields_mask.encode(&mut buf);
        self.filter_mask.encode(&mut buf);
        buf.push(u8::from(self.distinct));
        buf.extend_from_slice(&encode_filters(&self.filters));
        buf
    }

    fn decode(data: &[u8]) -> Result<Self, Error> {
        let count_bytes: [u8; 2] = data
            .get(..2)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| Error::Codec("truncated column count".into()))?;
        let count = u16::from_le_bytes(count_bytes) as usize;

        let mut cursor = 2;
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            let id_bytes: [u8; 4] = data
                .get(cursor..cursor + 4)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| Error::Codec("truncated column id".into()))?;
            columns.push(ConceptId(u32::from_le_bytes(id_bytes)));
            cursor += 4;
        }

        let (fields_mask, read) = ConceptMask::decode(&data[cursor..])?;
        cursor += read;
        let (filter_mask, read) = ConceptMask::decode(&data[cursor..])?;
        cursor += read;

        let distinct = *data
            .get(cursor)
            .ok_or_else(|| Error::Codec("truncated distinct flag".into()))?
            != 0;
        cursor += 1;

        let filters = decode_filters(&data[cursor..])?;

        Ok(Self {
            columns,
            fields_mask,
            filter_mask,
            filters,
            distinct,
        })
    }
}

/// Append-only store of materialized query results with
/// subsumption-aware lookup.
#[derive(Debug)]
pub struct ResultCache {
    db: Db,
    meta: Tree,
    bits: u32,
}

impl ResultCache {
    /// Open or create a cache sized to the given concept count.
    ///
    /// Reopening an existing cache against a model whose concept count
    /// changed is a hard error: bit positions would no longer line up
    /// with the stored masks.
    pub fn open(config: CacheConfig, concept_count: usize) -> Result<Self, Error> {
        let bits = concept_count as u32;
        let db = config.to_sled_config().open()?;
        let meta = db.open_tree(META_TREE)?;

        match db.get(WIDTH_KEY)? {
            Some(stored) => {
                let stored_bits: [u8; 4] = stored
                    .as_ref()
                    .try_into()
                    .map_err(|_| Error::Codec("malformed stored concept count".into()))?;
                let stored_bits = u32::from_le_bytes(stored_bits);
                if stored_bits != bits {
                    return Err(Error::ConceptCountChanged {
                        expected: stored_bits as usize,
                        actual: bits as usize,
                    });
                }
            }
            None => {
                db.insert(WIDTH_KEY, bits.to_le_bytes().to_vec())?;
            }
        }

        Ok(Self { db, meta, bits })
    }

    /// Look up a cached entry able to answer the request.
    ///
    /// On a hit, returns the entry's rows with the residual filters
    /// applied and columns projected down to `fields`, in order.
    /// Individually undecodable entries are skipped with a warning;
    /// storage faults propagate for the caller to downgrade.
    pub fn lookup(
        &self,
        fields: &[ConceptId],
        filters: &[Filter],
        distinct: bool,
    ) -> Result<Option<Vec<Row>>, Error> {
        let fields_mask = ConceptMask::from_concepts(self.bits, fields.iter().copied())?;
        let filter_mask =
            ConceptMask::from_concepts(self.bits, filters.iter().map(|f| f.concept()))?;

        for item in self.meta.iter() {
            let (key, value) = item?;
            let entry_id = match decode_entry_id(&key) {
                Some(id) => id,
                None => {
                    warn!("skipping cache entry with malformed key");
                    continue;
                }
            };
            let meta = match CacheMeta::decode(&value) {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(entry_id, %err, "skipping undecodable cache entry");
                    continue;
                }
            };

            // Mask prechecks: the entry's columns must cover the
            // request, every concept the entry filtered must be
            // filtered again, and the distinct flag must match.
            if meta.distinct != distinct
                || !meta.fields_mask.is_superset_of(&fields_mask)
                || !filter_mask.is_superset_of(&meta.filter_mask)
            {
                continue;
            }

            let extra = match residual(&meta.filters, filters) {
                Some(extra) => extra,
                None => continue,
            };
            // Residual filters and requested fields must land on
            // materialized columns.
            let positions: Option<Vec<usize>> = fields
                .iter()
                .map(|c| meta.columns.iter().position(|m| m == c))
                .collect();
            let projection = match positions {
                Some(p) => p,
                None => continue,
            };
            let residual_cols: Option<Vec<(usize, Filter)>> = extra
                .into_iter()
                .map(|f| {
                    meta.columns
                        .iter()
                        .position(|m| *m == f.concept())
                        .map(|col| (col, f))
                })
                .collect();
            let residual_cols = match residual_cols {
                Some(r) => r,
                None => continue,
            };

            let rows = match self.load_rows(entry_id) {
                Ok(rows) => rows,
                Err(Error::Codec(msg)) => {
                    warn!(entry_id, %msg, "skipping cache entry with undecodable rows");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let narrowed: Vec<Row> = rows
                .into_iter()
                .filter(|row| residual_cols.iter().all(|(col, f)| f.accepts(&row[*col])))
                .map(|row| projection.iter().map(|&c| row[c].clone()).collect())
                .collect();

            debug!(entry_id, rows = narrowed.len(), "cache hit");
            return Ok(Some(narrowed));
        }

        Ok(None)
    }

    /// Persist a materialized result as a new entry.
    pub fn store(
        &self,
        columns: &[ConceptId],
        filters: &[Filter],
        distinct: bool,
        rows: &[Row],
    ) -> Result<u64, Error> {
        let meta = CacheMeta {
            columns: columns.to_vec(),
            fields_mask: ConceptMask::from_concepts(self.bits, columns.iter().copied())?,
            filter_mask: ConceptMask::from_concepts(
                self.bits,
                filters.iter().map(|f| f.concept()),
            )?,
            filters: filters.to_vec(),
            distinct,
        };

        let entry_id = self.db.generate_id()?;
        let rows_tree = self.db.open_tree(rows_tree_name(entry_id))?;
        for (index, row) in rows.iter().enumerate() {
            rows_tree.insert((index as u64).to_be_bytes(), encode_row(row))?;
        }
        // Metadata lands last, so a half-written entry is never visible.
        self.meta
            .insert(entry_id.to_be_bytes(), meta.encode())?;

        debug!(entry_id, rows = rows.len(), "cache entry stored");
        Ok(entry_id)
    }

    /// Number of cached entries.
    pub fn entry_count(&self) -> usize {
        self.meta.len()
    }

    /// Drop every entry and its row tree.
    pub fn clear(&self) -> Result<(), Error> {
        for item in self.meta.iter() {
            let (key, _) = item?;
            if let Some(entry_id) = decode_entry_id(&key) {
                self.db.drop_tree(rows_tree_name(entry_id))?;
            }
        }
        self.meta.clear()?;
        Ok(())
    }

    fn load_rows(&self, entry_id: u64) -> Result<Vec<Row>, Error> {
        let tree = self.db.open_tree(rows_tree_name(entry_id))?;
        let mut rows = Vec::with_capacity(tree.len());
        // Big-endian index keys make iteration order the insert order.
        for item in tree.iter() {
            let (_, value) = item?;
            rows.push(decode_row(&value)?);
        }
        Ok(rows)
    }
}

fn rows_tree_name(entry_id: u64) -> String {
    format!("{ROWS_TREE_PREFIX}{entry_id}")
}

fn decode_entry_id(key: &[u8]) -> Option<u64> {
    key.try_into().ok().map(u64::from_be_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedtab_types::Value;

    fn open_cache(bits: usize) -> ResultCache {
        ResultCache::open(CacheConfig::temporary(), bits).unwrap()
    }

    fn int_rows(pairs: &[(i64, &str)]) -> Vec<Row> {
        pairs
            .iter()
            .map(|(a, b)| vec![Value::Int64(*a), Value::String((*b).into())])
            .collect()
    }

    #[test]
    fn test_roundtrip_hit_with_narrower_values_filter() {
        let cache = open_cache(2);
        let a = ConceptId(0);
        let b = ConceptId(1);
        let rows = int_rows(&[(1, "x"), (2, "y"), (3, "z")]);
        let cached_filter = Filter::values(
            a,
            vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)],
        );
        cache.store(&[a, b], &[cached_filter], false, &rows).unwrap();

        let narrower = Filter::values(a, vec![Value::Int64(1), Value::Int64(2)]);
        let hit = cache.lookup(&[a, b], &[narrower], false).unwrap().unwrap();
        assert_eq!(hit, int_rows(&[(1, "x"), (2, "y")]));
    }

    #[test]
    fn test_uncovered_value_misses() {
        let cache = open_cache(2);
        let a = ConceptId(0);
        let b = ConceptId(1);
        let cached_filter = Filter::values(
            a,
            vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)],
        );
        cache
            .store(&[a, b], &[cached_filter], false, &int_rows(&[(1, "x")]))
            .unwrap();

        let broader = Filter::values(
            a,
            vec![Value::Int64(1), Value::Int64(2), Value::Int64(4)],
        );
        assert!(cache.lookup(&[a, b], &[broader], false).unwrap().is_none());
    }

    #[test]
    fn test_reflexive_subsumption_hits() {
        let cache = open_cache(2);
        let a = ConceptId(0);
        let filter = Filter::values(a, vec![Value::Int64(1)]);
        cache
            .store(&[a], &[filter.clone()], false, &[vec![Value::Int64(1)]])
            .unwrap();

        let hit = cache.lookup(&[a], &[filter], false).unwrap();
        assert_eq!(hit, Some(vec![vec![Value::Int64(1)]]));
    }

    #[test]
    fn test_projection_down_to_requested_columns() {
        let cache = open_cache(3);
        let a = ConceptId(0);
        let b = ConceptId(1);
        cache
            .store(&[a, b], &[], false, &int_rows(&[(1, "x"), (2, "y")]))
            .unwrap();

        let hit = cache.lookup(&[b], &[], false).unwrap().unwrap();
        assert_eq!(
            hit,
            vec![
                vec![Value::String("x".into())],
                vec![Value::String("y".into())]
            ]
        );
    }

    #[test]
    fn test_residual_filter_on_projected_out_column() {
        // Filter on b, request only a: subsumption reads the cached b
        // column, the projection then drops it.
        let cache = open_cache(2);
        let a = ConceptId(0);
        let b = ConceptId(1);
        cache
            .store(&[a, b], &[], false, &int_rows(&[(1, "x"), (2, "y")]))
            .unwrap();

        let filter = Filter::values(b, vec![Value::String("y".into())]);
        let hit = cache.lookup(&[a], &[filter], false).unwrap().unwrap();
        assert_eq!(hit, vec![vec![Value::Int64(2)]]);
    }

    #[test]
    fn test_distinct_flag_must_match() {
        let cache = open_cache(1);
        let a = ConceptId(0);
        cache
            .store(&[a], &[], true, &[vec![Value::Int64(1)]])
            .unwrap();

        assert!(cache.lookup(&[a], &[], false).unwrap().is_none());
        assert!(cache.lookup(&[a], &[], true).unwrap().is_some());
    }

    #[test]
    fn test_missing_requested_column_misses() {
        let cache = open_cache(2);
        let a = ConceptId(0);
        let b = ConceptId(1);
        cache
            .store(&[a], &[], false, &[vec![Value::Int64(1)]])
            .unwrap();

        assert!(cache.lookup(&[a, b], &[], false).unwrap().is_none());
    }

    #[test]
    fn test_clear_removes_entries() {
        let cache = open_cache(1);
        let a = ConceptId(0);
        cache
            .store(&[a], &[], false, &[vec![Value::Int64(1)]])
            .unwrap();
        assert_eq!(cache.entry_count(), 1);

        cache.clear().unwrap();
        assert_eq!(cache.entry_count(), 0);
        assert!(cache.lookup(&[a], &[], false).unwrap().is_none());
    }

    #[test]
    fn test_concept_count_change_is_fatal_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig::new(dir.path());
        {
            let cache = ResultCache::open(config.clone(), 3).unwrap();
            drop(cache);
        }
        let err = ResultCache::open(config, 5).unwrap_err();
        assert!(matches!(
            err,
            Error::ConceptCountChanged {
                expected: 3,
                actual: 5
            }
        ));
    }
}
