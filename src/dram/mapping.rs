use serde::{Deserialize, Serialize};

use crate::dram::standard::Standard;
use crate::dram::AddrVec;

/// Bit order of a linear address, most significant field first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum MappingScheme {
    #[default]
    ChRaBaRoCo,
    RoBaRaCoCh,
}

#[derive(Debug, Clone)]
pub struct AddressMapper {
    scheme: MappingScheme,
    bits: Vec<u32>,
    tx_bits: u32,
}

fn log2_exact(value: u64, what: &str) -> u32 {
    assert!(value.is_power_of_two(), "{what} ({value}) must be a power of two");
    value.ilog2()
}

fn slice_lower_bits(addr: &mut u64, bits: u32) -> i64 {
    let mask = (1u64 << bits) - 1;
    let value = *addr & mask;
    *addr >>= bits;
    value as i64
}

impl AddressMapper {
    pub fn new(spec: &Standard, scheme: MappingScheme) -> Self {
        let mut bits: Vec<u32> = spec
            .levels
            .iter()
            .zip(spec.count.iter())
            .map(|(level, &count)| log2_exact(count as u64, &format!("{level:?} count")))
            .collect();
        // a column command moves a whole burst
        let last = bits.len() - 1;
        bits[last] = bits[last].saturating_sub(log2_exact(spec.prefetch_size, "prefetch size"));
        Self {
            scheme,
            bits,
            tx_bits: log2_exact(spec.transaction_bytes(), "transaction size"),
        }
    }

    pub fn map(&self, addr: u64) -> AddrVec {
        let n = self.bits.len();
        let mut rest = addr >> self.tx_bits;
        let mut vec: AddrVec = smallvec::smallvec![0; n];
        match self.scheme {
            MappingScheme::ChRaBaRoCo => {
                for level in (0..n).rev() {
                    vec[level] = slice_lower_bits(&mut rest, self.bits[level]);
                }
            }
            MappingScheme::RoBaRaCoCh => {
                vec[0] = slice_lower_bits(&mut rest, self.bits[0]);
                vec[n - 1] = slice_lower_bits(&mut rest, self.bits[n - 1]);
                for level in 1..n - 1 {
                    vec[level] = slice_lower_bits(&mut rest, self.bits[level]);
                }
            }
        }
        vec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dram::standard::{Level, OrgPreset, SpeedPreset, StandardKind};

    fn ddr3(channels: usize) -> Standard {
        Standard::new(StandardKind::Ddr3, OrgPreset::Ddr3_2Gb_x8, SpeedPreset::Ddr3_1600K, channels, 1)
    }

    #[test]
    fn column_bits_sit_above_transaction_offset() {
        let spec = ddr3(1);
        let mapper = AddressMapper::new(&spec, MappingScheme::ChRaBaRoCo);
        // 64-byte transactions, 128 bursts per row
        let v = mapper.map(64 * 3);
        assert_eq!(v.as_slice(), &[0, 0, 0, 0, 3]);
        let row_stride = 64 * 128;
        let v = mapper.map(row_stride * 5);
        assert_eq!(v[spec.level_index(Level::Row)], 5);
    }

    #[test]
    fn interleaved_mapping_puts_channel_lowest() {
        let spec = ddr3(2);
        let mapper = AddressMapper::new(&spec, MappingScheme::RoBaRaCoCh);
        assert_eq!(mapper.map(0)[0], 0);
        assert_eq!(mapper.map(64)[0], 1);
        assert_eq!(mapper.map(128)[4], 1);
    }

    #[test]
    fn same_row_addresses_share_coordinates() {
        let spec = ddr3(1);
        let mapper = AddressMapper::new(&spec, MappingScheme::ChRaBaRoCo);
        let a = mapper.map(0x1234_0000);
        let b = mapper.map(0x1234_0040);
        assert_eq!(a[..4], b[..4]);
        assert_ne!(a[4], b[4]);
    }
}
