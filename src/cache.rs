use crate::engine::{PipelineOptions, ReshapeRequest, Reshaper};
use crate::error::Result;
use crate::schema::{LongTable, TotalsTable, WideTable};
use log::debug;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    table: u64,
    options: PipelineOptions,
    request: ReshapeRequest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Memoizes pipeline results per (table fingerprint, options, request).
///
/// The fingerprint is a content hash, so an edited table never reuses results computed
/// for its earlier contents. Those older entries stay in memory until
/// [`retain_table`](Self::retain_table) or [`invalidate_table`](Self::invalidate_table)
/// (called before the edit) evicts them.
#[derive(Debug, Default)]
pub struct ReshapeCache {
    monthly: HashMap<CacheKey, LongTable>,
    totals: HashMap<CacheKey, TotalsTable>,
    hits: u64,
    misses: u64,
}

impl ReshapeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_reshape(
        &mut self,
        reshaper: &Reshaper,
        table: &WideTable,
        request: &ReshapeRequest,
    ) -> Result<&LongTable> {
        let key = CacheKey {
            table: table.fingerprint(),
            options: reshaper.options().clone(),
            request: request.clone(),
        };

        if self.monthly.contains_key(&key) {
            self.hits += 1;
            debug!("Cache hit for monthly request on table {:016x}", key.table);
            return Ok(&self.monthly[&key]);
        }

        self.misses += 1;
        debug!("Cache miss for monthly request on table {:016x}", key.table);
        let computed = reshaper.reshape(table, request)?;
        Ok(self.monthly.entry(key).or_insert(computed))
    }

    pub fn get_or_summarize(
        &mut self,
        reshaper: &Reshaper,
        table: &WideTable,
        request: &ReshapeRequest,
    ) -> Result<&TotalsTable> {
        let key = CacheKey {
            table: table.fingerprint(),
            options: reshaper.options().clone(),
            request: request.clone(),
        };

        if self.totals.contains_key(&key) {
            self.hits += 1;
            debug!("Cache hit for totals request on table {:016x}", key.table);
            return Ok(&self.totals[&key]);
        }

        self.misses += 1;
        debug!("Cache miss for totals request on table {:016x}", key.table);
        let computed = reshaper.summarize(table, request)?;
        Ok(self.totals.entry(key).or_insert(computed))
    }

    /// Drops every result computed for this table's current contents. Call it before
    /// editing the table; afterwards the old fingerprint is gone and only
    /// [`invalidate_fingerprint`](Self::invalidate_fingerprint) with a fingerprint taken
    /// earlier, or [`retain_table`](Self::retain_table), can reach the stale entries.
    pub fn invalidate_table(&mut self, table: &WideTable) {
        self.invalidate_fingerprint(table.fingerprint());
    }

    /// Keeps only the entries computed for this table's current contents. Use it after an
    /// edit or a re-upload to evict everything the old contents produced.
    pub fn retain_table(&mut self, table: &WideTable) {
        let fingerprint = table.fingerprint();
        let before = self.len();
        self.monthly.retain(|k, _| k.table == fingerprint);
        self.totals.retain(|k, _| k.table == fingerprint);
        debug!(
            "Evicted {} cached result(s) not belonging to table {:016x}",
            before - self.len(),
            fingerprint
        );
    }

    pub fn invalidate_fingerprint(&mut self, fingerprint: u64) {
        let before = self.len();
        self.monthly.retain(|k, _| k.table != fingerprint);
        self.totals.retain(|k, _| k.table != fingerprint);
        debug!(
            "Invalidated {} cached result(s) for table {:016x}",
            before - self.len(),
            fingerprint
        );
    }

    pub fn clear(&mut self) {
        self.monthly.clear();
        self.totals.clear();
    }

    pub fn len(&self) -> usize {
        self.monthly.len() + self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Filter;
    use crate::schema::{TableSchema, WideRecord};

    fn table() -> WideTable {
        WideTable::from_records(
            TableSchema::sales(),
            vec![
                WideRecord::sales("Actuals", "Sales", "Software", 2023, [10.0; 12]),
                WideRecord::sales("Budget", "Sales", "Software", 2023, [12.0; 12]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_second_call_is_a_hit() {
        let mut cache = ReshapeCache::new();
        let reshaper = Reshaper::default();
        let table = table();
        let request = ReshapeRequest::new(["Scenario"]).with_filter(Filter::eq("Year", 2023));

        let first = cache.get_or_reshape(&reshaper, &table, &request).unwrap().clone();
        let second = cache.get_or_reshape(&reshaper, &table, &request).unwrap().clone();

        assert_eq!(first, second);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_changed_table_misses() {
        let mut cache = ReshapeCache::new();
        let reshaper = Reshaper::default();
        let mut table = table();
        let request = ReshapeRequest::new(["Scenario"]);

        let before = cache.get_or_reshape(&reshaper, &table, &request).unwrap().total();
        table
            .push(WideRecord::sales("Actuals", "Sales", "Hardware", 2023, [1.0; 12]))
            .unwrap();
        let after = cache.get_or_reshape(&reshaper, &table, &request).unwrap().total();

        assert!((before - 264.0).abs() < 1e-9);
        assert!((after - 276.0).abs() < 1e-9);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_invalidate_and_errors_not_cached() {
        let mut cache = ReshapeCache::new();
        let reshaper = Reshaper::default();
        let table = table();

        cache
            .get_or_reshape(&reshaper, &table, &ReshapeRequest::new(["Scenario"]))
            .unwrap();
        cache
            .get_or_summarize(&reshaper, &table, &ReshapeRequest::new(["Scenario"]))
            .unwrap();
        assert_eq!(cache.len(), 2);

        assert!(cache
            .get_or_reshape(&reshaper, &table, &ReshapeRequest::new(["Region"]))
            .is_err());
        assert_eq!(cache.len(), 2);

        cache.invalidate_table(&table);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_edit_then_evict_stale_entries() {
        let mut cache = ReshapeCache::new();
        let reshaper = Reshaper::default();
        let mut table = table();
        let request = ReshapeRequest::new(["Scenario"]);

        cache.get_or_reshape(&reshaper, &table, &request).unwrap();
        cache.get_or_summarize(&reshaper, &table, &request).unwrap();
        table
            .push(WideRecord::sales("Actuals", "Sales", "Hardware", 2023, [1.0; 12]))
            .unwrap();

        // The edited table hashes differently, so this finds nothing to drop
        cache.invalidate_table(&table);
        assert_eq!(cache.len(), 2);

        cache.get_or_reshape(&reshaper, &table, &request).unwrap();
        assert_eq!(cache.len(), 3);

        cache.retain_table(&table);
        assert_eq!(cache.len(), 1);
        cache.get_or_reshape(&reshaper, &table, &request).unwrap();
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_invalidate_with_fingerprint_taken_before_edit() {
        let mut cache = ReshapeCache::new();
        let reshaper = Reshaper::default();
        let mut table = table();
        let request = ReshapeRequest::new(["Scenario"]);

        cache.get_or_reshape(&reshaper, &table, &request).unwrap();
        let old = table.fingerprint();
        table
            .push(WideRecord::sales("Budget", "Sales", "Hardware", 2023, [2.0; 12]))
            .unwrap();

        cache.invalidate_fingerprint(old);
        assert!(cache.is_empty());
    }
}
