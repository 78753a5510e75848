//! Candidate voucher code generation.
//!
//! Codes are 15 characters total: a tier prefix plus random uppercase
//! alphanumerics. Generated codes are candidates to classify, nothing
//! more; whether one is live is decided by the storefront.

use anyhow::{bail, Result};
use rand::Rng;
use std::fmt;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
/// Total code length, prefix included.
const CODE_LENGTH: usize = 15;

/// Voucher denomination tiers and their code prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Rs500,
    Rs1000,
    Rs2000,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Rs500, Tier::Rs1000, Tier::Rs2000];

    pub fn prefix(self) -> &'static str {
        match self {
            Tier::Rs500 => "SVI",
            Tier::Rs1000 => "SVDJ",
            Tier::Rs2000 => "SVCS",
        }
    }

    pub fn value(self) -> u32 {
        match self {
            Tier::Rs500 => 500,
            Tier::Rs1000 => 1000,
            Tier::Rs2000 => 2000,
        }
    }

    /// Tier for a rupee denomination.
    pub fn from_value(value: u32) -> Result<Self> {
        match value {
            500 => Ok(Tier::Rs500),
            1000 => Ok(Tier::Rs1000),
            2000 => Ok(Tier::Rs2000),
            other => bail!("no voucher tier worth {other}; valid tiers: 500, 1000, 2000"),
        }
    }

    /// Tier a code belongs to, judged by its prefix.
    pub fn of_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| code.starts_with(t.prefix()))
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rs.{}", self.value())
    }
}

/// Generate one random candidate code for a tier.
pub fn generate_code(tier: Tier) -> String {
    let mut rng = rand::thread_rng();
    let prefix = tier.prefix();
    let mut code = String::with_capacity(CODE_LENGTH);
    code.push_str(prefix);
    for _ in prefix.len()..CODE_LENGTH {
        let idx = rng.gen_range(0..CHARSET.len());
        code.push(CHARSET[idx] as char);
    }
    code
}

/// Generate `count` candidate codes for a tier.
pub fn generate_codes(tier: Tier, count: usize) -> Vec<String> {
    (0..count).map(|_| generate_code(tier)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_fifteen_chars_with_tier_prefix() {
        for tier in Tier::ALL {
            let code = generate_code(tier);
            assert_eq!(code.len(), CODE_LENGTH, "tier {tier}: {code}");
            assert!(code.starts_with(tier.prefix()), "tier {tier}: {code}");
        }
    }

    #[test]
    fn test_codes_use_uppercase_alphanumerics_only() {
        let code = generate_code(Tier::Rs1000);
        assert!(code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }

    #[test]
    fn test_generated_batch_has_requested_size_and_no_duplicates() {
        let batch = generate_codes(Tier::Rs2000, 50);
        assert_eq!(batch.len(), 50);
        let distinct: HashSet<&String> = batch.iter().collect();
        assert_eq!(distinct.len(), 50);
    }

    #[test]
    fn test_from_value_rejects_unknown_denominations() {
        assert_eq!(Tier::from_value(500).unwrap(), Tier::Rs500);
        assert_eq!(Tier::from_value(1000).unwrap(), Tier::Rs1000);
        assert_eq!(Tier::from_value(2000).unwrap(), Tier::Rs2000);
        assert!(Tier::from_value(750).is_err());
        assert!(Tier::from_value(0).is_err());
    }

    #[test]
    fn test_of_code_recognizes_every_prefix() {
        for tier in Tier::ALL {
            let code = generate_code(tier);
            assert_eq!(Tier::of_code(&code), Some(tier));
        }
        assert_eq!(Tier::of_code("WELCOME100"), None);
    }
}
