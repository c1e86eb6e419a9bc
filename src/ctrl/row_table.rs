use std::collections::BTreeMap;

use crate::dram::{AddrVec, Command, RowStatus};
use crate::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowEntry {
    pub row: i64,
    /// Column accesses since the row was opened.
    pub hits: u64,
    /// Cycle of the last access (or of the activation, before any access).
    pub timestamp: Cycle,
    pub opened_at: Cycle,
}

/// Open-row bookkeeping, keyed by the address prefix above the row level
/// (one key per bank).
#[derive(Debug, Clone)]
pub struct RowTable {
    row_level: usize,
    table: BTreeMap<AddrVec, RowEntry>,
}

impl RowTable {
    pub fn new(row_level: usize) -> Self {
        Self {
            row_level,
            table: BTreeMap::new(),
        }
    }

    fn bank_key(&self, addr: &[i64]) -> AddrVec {
        AddrVec::from_slice(&addr[..self.row_level])
    }

    pub fn update(&mut self, cmd: Command, addr: &[i64], clk: Cycle) {
        let key = self.bank_key(addr);
        let row = addr[self.row_level];

        if cmd.is_opening() {
            self.table.entry(key.clone()).or_insert(RowEntry {
                row,
                hits: 0,
                timestamp: clk,
                opened_at: clk,
            });
        }

        if cmd.is_accessing() {
            let entry = self
                .table
                .get_mut(&key)
                .unwrap_or_else(|| panic!("{} to bank {:?} with no open row", cmd.mnemonic(), key.as_slice()));
            assert_eq!(entry.row, row, "{} to row {row} while row {} is open", cmd.mnemonic(), entry.row);
            entry.hits += 1;
            entry.timestamp = clk;
        }

        if cmd.is_closing() {
            // RDA/WRA close their own bank, PRE its bank, PREA the whole rank
            let prefix_len = match cmd {
                Command::Prea => 2,
                _ => self.row_level,
            };
            let prefix = &addr[..prefix_len];
            self.table.retain(|k, _| &k[..prefix_len] != prefix);
        }
    }

    /// Hits on the open row of `addr`'s bank. Unless `to_opened_row`, a
    /// different open row counts as zero.
    pub fn get_hits(&self, addr: &[i64], to_opened_row: bool) -> u64 {
        match self.table.get(&self.bank_key(addr)) {
            Some(entry) if to_opened_row || entry.row == addr[self.row_level] => entry.hits,
            _ => 0,
        }
    }

    pub fn get_open_row(&self, addr: &[i64]) -> Option<i64> {
        self.table.get(&self.bank_key(addr)).map(|e| e.row)
    }

    pub fn cycles_since_open(&self, addr: &[i64], clk: Cycle) -> Option<Cycle> {
        self.table
            .get(&self.bank_key(addr))
            .map(|e| clk.saturating_sub(e.opened_at))
    }

    pub fn classify(&self, addr: &[i64]) -> RowStatus {
        match self.get_open_row(addr) {
            Some(row) if row == addr[self.row_level] => RowStatus::Hit,
            Some(_) => RowStatus::Conflict,
            None => RowStatus::Miss,
        }
    }

    /// Full address (row filled in, column untargeted) of every open row
    /// under `prefix`.
    pub fn open_rows_under(&self, prefix: &[i64]) -> Vec<AddrVec> {
        self.table
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| self.row_addr(k, e))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AddrVec, &RowEntry)> + '_ {
        self.table.iter().map(|(k, e)| (self.row_addr(k, e), e))
    }

    fn row_addr(&self, key: &AddrVec, entry: &RowEntry) -> AddrVec {
        let mut addr = key.clone();
        addr.push(entry.row);
        addr.push(-1);
        addr
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // DDR3 layout: channel, rank, bank, row, column
    const ROW: usize = 3;

    #[test]
    fn activate_access_precharge_lifecycle() {
        let mut rt = RowTable::new(ROW);
        let a = [0, 0, 2, 100, 5];
        rt.update(Command::Act, &a, 10);
        assert_eq!(rt.get_open_row(&a), Some(100));
        assert_eq!(rt.classify(&a), RowStatus::Hit);
        assert_eq!(rt.classify(&[0, 0, 2, 101, 5]), RowStatus::Conflict);
        assert_eq!(rt.classify(&[0, 0, 3, 100, 5]), RowStatus::Miss);

        rt.update(Command::Rd, &a, 30);
        rt.update(Command::Rd, &a, 34);
        assert_eq!(rt.get_hits(&a, false), 2);
        assert_eq!(rt.get_hits(&[0, 0, 2, 7, 0], false), 0);
        assert_eq!(rt.get_hits(&[0, 0, 2, 7, 0], true), 2);
        assert_eq!(rt.cycles_since_open(&a, 50), Some(40));

        rt.update(Command::Pre, &a, 60);
        assert_eq!(rt.get_open_row(&a), None);
        assert!(rt.is_empty());
    }

    #[test]
    fn precharge_all_clears_only_its_rank() {
        let mut rt = RowTable::new(ROW);
        rt.update(Command::Act, &[0, 0, 0, 1, 0], 0);
        rt.update(Command::Act, &[0, 0, 5, 2, 0], 1);
        rt.update(Command::Act, &[0, 1, 0, 3, 0], 2);
        assert_eq!(rt.open_rows_under(&[0, 0]).len(), 2);
        rt.update(Command::Prea, &[0, 0, -1, -1, -1], 50);
        assert_eq!(rt.len(), 1);
        assert_eq!(rt.get_open_row(&[0, 1, 0, 0, 0]), Some(3));
    }

    #[test]
    fn auto_precharge_closes_after_counting_access() {
        let mut rt = RowTable::new(ROW);
        let a = [0, 0, 1, 9, 3];
        rt.update(Command::Act, &a, 0);
        rt.update(Command::Rda, &a, 20);
        assert_eq!(rt.get_open_row(&a), None);
    }

    #[test]
    fn open_row_addresses_leave_column_untargeted() {
        let mut rt = RowTable::new(ROW);
        rt.update(Command::Act, &[0, 0, 4, 77, 12], 0);
        let rows: Vec<_> = rt.iter().map(|(addr, _)| addr).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_slice(), &[0, 0, 4, 77, -1]);
    }
}
