//! Tier catalog of the sale.
//!
//! Tiers are addressed by a 1-based index, the same numbering used in the
//! account file (`3` or `3-5`). The table is built once and never mutated.

use alloy::primitives::U256;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A priced allocation bracket of the sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tier {
    /// 1-based position in the catalog
    pub index: usize,
    /// Identifier understood by the sale contract
    pub id: &'static str,
    /// Unit price in the smallest unit of the payment asset
    pub price: u64,
    pub max_allocation_per_account: u64,
    /// Informational only, enforced by the contract
    pub max_total_purchasable: u64,
}

impl Tier {
    /// Cost of `quantity` units of this tier.
    pub fn cost(&self, quantity: u64) -> U256 {
        U256::from(self.price) * U256::from(quantity)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.index, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierSelectionError {
    #[error("tier {0} does not exist")]
    UnknownTier(usize),

    #[error("minimum tier {min} is greater than maximum tier {max}")]
    InvertedRange { min: usize, max: usize },

    #[error("cannot parse tier range '{0}'")]
    Malformed(String),
}

/// Inclusive range of tier indices, `min <= max` once validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierRange {
    pub min: usize,
    pub max: usize,
}

impl TierRange {
    pub fn new(min: usize, max: usize) -> Result<Self, TierSelectionError> {
        if min > max {
            return Err(TierSelectionError::InvertedRange { min, max });
        }
        Ok(Self { min, max })
    }
}

impl FromStr for TierRange {
    type Err = TierSelectionError;

    /// Parses `N` or `N-M`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TierSelectionError::Malformed(s.to_string());
        let mut parts = s.trim().splitn(2, '-');

        let min = parts
            .next()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .ok_or_else(malformed)?;
        let max = match parts.next() {
            Some(p) => p.trim().parse::<usize>().map_err(|_| malformed())?,
            None => min,
        };

        Self::new(min, max)
    }
}

impl fmt::Display for TierRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Immutable, index-ordered tier table.
#[derive(Debug, Clone)]
pub struct TierCatalog {
    tiers: Vec<Tier>,
}

impl TierCatalog {
    /// Catalog from `(id, price, per-account cap, supply cap)` rows, indexed from 1.
    pub fn from_rows(rows: &[(&'static str, u64, u64, u64)]) -> Self {
        let tiers = rows
            .iter()
            .enumerate()
            .map(|(i, &(id, price, per_account, total))| Tier {
                index: i + 1,
                id,
                price,
                max_allocation_per_account: per_account,
                max_total_purchasable: total,
            })
            .collect();
        Self { tiers }
    }

    /// The public sale table.
    pub fn builtin() -> Self {
        Self::from_rows(BUILTIN_TIERS)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Tier> {
        index.checked_sub(1).and_then(|i| self.tiers.get(i))
    }

    /// Tiers of `range` in ascending index order.
    pub fn select(&self, range: TierRange) -> Result<Vec<Tier>, TierSelectionError> {
        for bound in [range.min, range.max] {
            if self.get(bound).is_none() {
                return Err(TierSelectionError::UnknownTier(bound));
            }
        }
        Ok(self.tiers[range.min - 1..range.max].to_vec())
    }
}

/// Smallest per-account cap across `tiers`.
pub fn min_allocation_cap(tiers: &[Tier]) -> Option<u64> {
    tiers.iter().map(|t| t.max_allocation_per_account).min()
}

const BUILTIN_TIERS: &[(&str, u64, u64, u64)] = &[
    ("Public0gTier1Arb", 157_000_000, 5, 754),
    ("Public0gTier2Arb", 182_000_000, 5, 1175),
    ("Public0gTier3Arb", 210_000_000, 10, 1490),
    ("Public0gTier4Arb", 244_000_000, 10, 1800),
    ("Public0gTier5Arb", 282_000_000, 20, 2098),
    ("Public0gTier6Arb", 322_000_000, 20, 2400),
    ("Public0gTier7Arb", 369_000_000, 40, 2400),
    ("Public0gTier8Arb", 423_000_000, 40, 2400),
    ("Public0gTier9Arb", 482_000_000, 50, 2400),
    ("Public0gTier10Arb", 548_000_000, 50, 2100),
    ("Public0gTier11Arb", 620_000_000, 100, 2100),
    ("Public0gTier12Arb", 701_000_000, 100, 2100),
    ("Public0gTier13Arb", 795_000_000, 500, 2100),
    ("Public0gTier14Arb", 901_000_000, 500, 1800),
    ("Public0gTier15Arb", 1_011_000_000, 500, 1800),
    ("Public0gTier16Arb", 1_133_000_000, 1800, 1800),
    ("Public0gTier17Arb", 1_271_000_000, 1800, 1800),
    ("Public0gTier18Arb", 1_424_000_000, 1800, 1800),
    ("Public0gTier19Arb", 1_596_000_000, 1800, 1800),
    ("Public0gTier20Arb", 1_678_000_000, 1800, 1800),
    ("Public0gTier21Arb", 1_762_000_000, 1500, 1500),
    ("Public0gTier22Arb", 1_853_000_000, 1500, 1500),
    ("Public0gTier23Arb", 1_947_000_000, 1500, 1500),
    ("Public0gTier24Arb", 2_047_000_000, 1200, 1200),
    ("Public0gTier25Arb", 2_150_000_000, 1200, 1200),
    ("Public0gTier26Arb", 2_260_000_000, 1200, 1200),
    ("Public0gTier27Arb", 2_376_000_000, 1200, 1200),
    ("Public0gTier28Arb", 2_495_000_000, 1050, 1050),
    ("Public0gTier29Arb", 2_620_000_000, 1050, 1050),
    ("Public0gTier30Arb", 2_751_000_000, 1050, 1050),
    ("Public0gTier31Arb", 2_889_000_000, 1050, 1050),
    ("Public0gTier32Arb", 3_036_000_000, 1050, 1050),
];
