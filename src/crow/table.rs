use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;

use crate::crow::policy::CrowConfig;
use crate::dram::AddrVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrowEntry {
    pub row: i64,
    pub total_hits: u64,
    /// The copy is not fully restored; a full-restore activation must
    /// precede its eviction.
    pub fr: bool,
}

impl CrowEntry {
    fn new(row: i64, fr: bool) -> Self {
        Self {
            row,
            total_hits: 0,
            fr,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CrowSet {
    /// Most recently used first.
    entries: Vec<CrowEntry>,
    /// Low-retention rows, permanently held.
    weak: Vec<CrowEntry>,
}

impl CrowSet {
    fn position(&self, row: i64) -> Option<usize> {
        self.entries.iter().position(|e| e.row == row)
    }

    fn find(&self, row: i64) -> Option<&CrowEntry> {
        self.entries
            .iter()
            .chain(self.weak.iter())
            .find(|e| e.row == row)
    }

    fn find_mut(&mut self, row: i64) -> Option<&mut CrowEntry> {
        self.entries
            .iter_mut()
            .chain(self.weak.iter_mut())
            .find(|e| e.row == row)
    }

    fn lru_victim(&self, threshold: u64) -> Option<usize> {
        self.entries.iter().rposition(|e| e.total_hits <= threshold)
    }
}

/// Row-copy cache for one channel. A set covers one bank and a group of
/// `table_grouped_sas` adjacent subarrays.
#[derive(Debug)]
pub struct CrowTable {
    row_level: usize,
    sa_size: i64,
    grouped_sas: i64,
    capacity: usize,
    weak_capacity: usize,
    evict_threshold: u64,
    sets: BTreeMap<AddrVec, CrowSet>,
    rng: StdRng,
}

impl CrowTable {
    pub fn new(config: &CrowConfig, row_level: usize, rows_per_bank: usize, subarrays: usize) -> Self {
        assert!(subarrays > 0, "subarrays must be > 0");
        assert!(
            rows_per_bank % subarrays == 0,
            "{rows_per_bank} rows do not split into {subarrays} subarrays"
        );
        let grouped = config.table_grouped_sas;
        Self {
            row_level,
            sa_size: (rows_per_bank / subarrays) as i64,
            grouped_sas: grouped as i64,
            capacity: (config.copy_rows_per_sa - config.weak_rows_per_sa) * grouped,
            weak_capacity: config.weak_rows_per_sa * grouped,
            evict_threshold: config.evict_hit_threshold,
            sets: BTreeMap::new(),
            rng: StdRng::seed_from_u64(config.weak_row_seed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn row(&self, addr: &[i64]) -> i64 {
        addr[self.row_level]
    }

    fn group_of(&self, row: i64) -> i64 {
        row / self.sa_size / self.grouped_sas
    }

    fn set_key(&self, addr: &[i64]) -> AddrVec {
        let mut key = AddrVec::from_slice(&addr[..self.row_level]);
        key.push(self.group_of(self.row(addr)));
        key
    }

    fn set(&self, addr: &[i64]) -> Option<&CrowSet> {
        self.sets.get(&self.set_key(addr))
    }

    fn set_mut(&mut self, addr: &[i64]) -> &mut CrowSet {
        let key = self.set_key(addr);
        let span = self.sa_size * self.grouped_sas;
        let (capacity, weak_capacity) = (self.capacity, self.weak_capacity);
        let rng = &mut self.rng;
        self.sets.entry(key).or_insert_with_key(|key| {
            let group = key[key.len() - 1];
            let weak = sample(rng, span as usize, weak_capacity)
                .into_iter()
                .map(|offset| CrowEntry::new(group * span + offset as i64, false))
                .collect();
            CrowSet {
                entries: Vec::with_capacity(capacity),
                weak,
            }
        })
    }

    pub fn is_hit(&self, addr: &[i64]) -> bool {
        self.get_hit_entry(addr).is_some()
    }

    pub fn get_hit_entry(&self, addr: &[i64]) -> Option<&CrowEntry> {
        let row = self.row(addr);
        self.set(addr).and_then(|set| set.find(row))
    }

    /// Regular copy of `addr`'s row. Weak-pool rows never match.
    pub fn get_cached_entry(&self, addr: &[i64]) -> Option<&CrowEntry> {
        let row = self.row(addr);
        self.set(addr)
            .and_then(|set| set.entries.iter().find(|e| e.row == row))
    }

    pub fn is_cached(&self, addr: &[i64]) -> bool {
        self.get_cached_entry(addr).is_some()
    }

    pub fn is_full(&self, addr: &[i64]) -> bool {
        self.set(addr)
            .map_or(self.capacity == 0, |set| set.entries.len() >= self.capacity)
    }

    /// Least recently used entry of `addr`'s set with at most `threshold`
    /// hits. `None` when every entry is protected.
    pub fn get_lru_entry(&self, addr: &[i64], threshold: u64) -> Option<CrowEntry> {
        let set = self.set(addr)?;
        set.lru_victim(threshold).map(|pos| set.entries[pos])
    }

    /// Pins `victim` at the least recently used end so the next insertion
    /// into the set discards it.
    pub fn make_lru(&mut self, addr: &[i64], victim: &CrowEntry) {
        let set = self.set_mut(addr);
        let pos = set
            .position(victim.row)
            .unwrap_or_else(|| panic!("row {} is not in its copy set", victim.row));
        let entry = set.entries.remove(pos);
        set.entries.push(entry);
    }

    /// Inserts `addr`'s row as most recently used, evicting the LRU entry
    /// within the hit threshold if the set is full.
    pub fn add_entry(&mut self, addr: &[i64], fr: bool) -> Option<CrowEntry> {
        let row = self.row(addr);
        let threshold = self.evict_threshold;
        let capacity = self.capacity;
        let set = self.set_mut(addr);
        assert!(set.find(row).is_none(), "row {row} is already cached");
        let evicted = if set.entries.len() >= capacity {
            let pos = set
                .lru_victim(threshold)
                .unwrap_or_else(|| panic!("no evictable copy for row {row}"));
            Some(set.entries.remove(pos))
        } else {
            None
        };
        set.entries.insert(0, CrowEntry::new(row, fr));
        evicted
    }

    /// A demand hit promotes the entry and counts the hit. A restore access
    /// moves the entry to the LRU end without counting. On a miss the LRU
    /// entry of the set ages by one hit.
    pub fn access(&mut self, addr: &[i64], is_restore: bool) {
        let row = self.row(addr);
        let set = self.set_mut(addr);
        if let Some(pos) = set.position(row) {
            let mut entry = set.entries.remove(pos);
            if is_restore {
                set.entries.push(entry);
            } else {
                entry.total_hits += 1;
                set.entries.insert(0, entry);
            }
        } else if let Some(weak) = set.weak.iter_mut().find(|e| e.row == row) {
            if !is_restore {
                weak.total_hits += 1;
            }
        } else if let Some(lru) = set.entries.last_mut() {
            lru.total_hits = lru.total_hits.saturating_sub(1);
        }
    }

    pub fn set_fr(&mut self, addr: &[i64], fr: bool) {
        let row = self.row(addr);
        let entry = self
            .set_mut(addr)
            .find_mut(row)
            .unwrap_or_else(|| panic!("FR update for uncached row {row}"));
        entry.fr = fr;
    }

    pub fn invalidate(&mut self, addr: &[i64]) {
        let row = self.row(addr);
        let set = self.set_mut(addr);
        let pos = set
            .position(row)
            .unwrap_or_else(|| panic!("invalidating uncached row {row}"));
        set.entries.remove(pos);
    }

    #[cfg(test)]
    pub(crate) fn rows(&self, addr: &[i64]) -> Vec<i64> {
        self.set(addr)
            .map(|set| set.entries.iter().map(|e| e.row).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn weak_rows(&self, addr: &[i64]) -> Vec<i64> {
        self.set(addr)
            .map(|set| set.weak.iter().map(|e| e.row).collect())
            .unwrap_or_default()
    }
}
