//! Purchasable bundles.
//!
//! Bundles are static configuration: loaded once at start-up, validated, and
//! never mutated afterwards.

use crate::error::{Error, Result};
use crate::ledger::format_sol;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An immutable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Unique identifier (the `tier` of a verification request).
    pub id: String,
    /// Units credited when the bundle is bought.
    pub units: u64,
    /// Price in lamports.
    pub price_lamports: u64,
    /// Optional display label, e.g. "Save 14%".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_label: Option<String>,
}

impl Bundle {
    /// Price rendered in SOL.
    #[must_use]
    pub fn price_sol(&self) -> String {
        format_sol(self.price_lamports)
    }
}

/// The validated set of bundles on offer.
#[derive(Debug, Clone)]
pub struct Catalog {
    bundles: Vec<Bundle>,
}

impl Catalog {
    /// Validate and build a catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty, an id repeats, or a bundle has a
    /// zero unit count or price.
    pub fn new(bundles: Vec<Bundle>) -> Result<Self> {
        if bundles.is_empty() {
            return Err(Error::Config("catalog has no bundles".to_string()));
        }

        let mut seen = HashSet::new();
        for bundle in &bundles {
            if bundle.id.is_empty() {
                return Err(Error::Config("bundle id must not be empty".to_string()));
            }
            if !seen.insert(bundle.id.as_str()) {
                return Err(Error::Config(format!("duplicate bundle id: {}", bundle.id)));
            }
            if bundle.units == 0 {
                return Err(Error::Config(format!("bundle {} credits zero units", bundle.id)));
            }
            if bundle.price_lamports == 0 {
                return Err(Error::Config(format!("bundle {} has zero price", bundle.id)));
            }
        }

        Ok(Self { bundles })
    }

    /// Look up a bundle by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Bundle> {
        self.bundles.iter().find(|b| b.id == id)
    }

    /// All bundles, in configuration order.
    #[must_use]
    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }
}

/// Bundles offered when the configuration names none.
#[must_use]
pub fn default_bundles() -> Vec<Bundle> {
    vec![
        Bundle {
            id: "single".to_string(),
            units: 1,
            price_lamports: 70_000_000,
            discount_label: None,
        },
        Bundle {
            id: "triple".to_string(),
            units: 3,
            price_lamports: 180_000_000,
            discount_label: Some("Save 14%".to_string()),
        },
        Bundle {
            id: "pack10".to_string(),
            units: 10,
            price_lamports: 500_000_000,
            discount_label: Some("Save 29%".to_string()),
        },
    ]
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            bundles: default_bundles(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bundle(id: &str, units: u64, price_lamports: u64) -> Bundle {
        Bundle {
            id: id.to_string(),
            units,
            price_lamports,
            discount_label: None,
        }
    }

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = Catalog::new(default_bundles()).expect("valid");
        let triple = catalog.get("triple").expect("triple");
        assert_eq!(triple.units, 3);
        assert_eq!(triple.price_sol(), "0.18");
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_rejects_bad_catalogs() {
        assert!(Catalog::new(Vec::new()).is_err());
        assert!(Catalog::new(vec![bundle("a", 1, 1), bundle("a", 2, 2)]).is_err());
        assert!(Catalog::new(vec![bundle("a", 0, 1)]).is_err());
        assert!(Catalog::new(vec![bundle("a", 1, 0)]).is_err());
        assert!(Catalog::new(vec![bundle("", 1, 1)]).is_err());
    }

    proptest! {
        #[test]
        fn distinct_positive_bundles_are_accepted(
            entries in proptest::collection::btree_map("[a-z]{1,8}", (1u64..1_000, 1u64..u64::MAX), 1..8)
        ) {
            let bundles: Vec<Bundle> = entries
                .iter()
                .map(|(id, (units, price))| bundle(id, *units, *price))
                .collect();
            let catalog = Catalog::new(bundles.clone());
            prop_assert!(catalog.is_ok());
            let catalog = catalog.expect("checked above");
            for b in &bundles {
                prop_assert_eq!(catalog.get(&b.id), Some(b));
            }
        }
    }
}
