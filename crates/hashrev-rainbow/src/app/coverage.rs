//! Table statistics
//!
//! Summarizes the chains held by a store: how many there are, how many
//! distinct alphabets they cover and a rough coverage estimate.

use crate::domain::FastSet;
use crate::domain::chain::Chain;
use crate::domain::charset::Alphabet;
use serde::{Deserialize, Serialize};

/// Plaintexts covered at which the estimate reaches 100%
const COVERAGE_SCALE: f64 = 1e9;

/// Upper bound of the coverage estimate (percent)
const COVERAGE_CAP: f64 = 99.99;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub total_chains: usize,
    /// Number of distinct resolved alphabets
    pub distinct_charsets: usize,
    pub average_chain_length: f64,
    /// Rough percentage of the plaintext space covered
    pub coverage_estimate: f64,
}

/// Compute statistics over a chain list
pub fn table_stats(chains: &[Chain]) -> TableStats {
    if chains.is_empty() {
        return TableStats::default();
    }

    let charsets: FastSet<String> = chains
        .iter()
        .map(|c| Alphabet::resolve(c.charset_selector, &c.charset_range).as_string())
        .collect();

    let total_length: u64 = chains.iter().map(|c| c.chain_length as u64).sum();
    let average_chain_length = total_length as f64 / chains.len() as f64;
    let coverage = chains.len() as f64 * average_chain_length / COVERAGE_SCALE * 100.0;

    TableStats {
        total_chains: chains.len(),
        distinct_charsets: charsets.len(),
        average_chain_length,
        coverage_estimate: coverage.min(COVERAGE_CAP),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::charset::{CHARSET_DIGITS, CharsetSelector};

    fn chain(chain_length: u32, selector: CharsetSelector, range: &str) -> Chain {
        Chain {
            id: 0,
            chain_length,
            start_plaintext: "a".into(),
            end_hash: String::new(),
            reduction_variant: 0,
            charset_selector: selector,
            min_length: 1,
            max_length: 1,
            charset_range: range.into(),
        }
    }

    #[test]
    fn test_empty_stats() {
        assert_eq!(table_stats(&[]), TableStats::default());
    }

    #[test]
    fn test_stats_values() {
        let chains = vec![
            chain(1000, CharsetSelector::Digits, ""),
            chain(3000, CharsetSelector::Lowercase, ""),
            // Same alphabet as the first chain
            chain(2000, CharsetSelector::Full, CHARSET_DIGITS),
        ];
        let stats = table_stats(&chains);

        assert_eq!(stats.total_chains, 3);
        assert_eq!(stats.distinct_charsets, 2);
        assert!((stats.average_chain_length - 2000.0).abs() < 1e-9);
        assert!((stats.coverage_estimate - 3.0 * 2000.0 / 1e9 * 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_coverage_is_capped() {
        let chains = vec![chain(u32::MAX, CharsetSelector::Digits, ""); 100];
        assert_eq!(table_stats(&chains).coverage_estimate, 99.99);
    }
}
