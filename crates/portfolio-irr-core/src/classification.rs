use serde::{Deserialize, Serialize};

use crate::types::AssetClass;

/// One way of recognising an asset category from a row's symbol/description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherRule {
    /// Exact symbol match (case-sensitive, as exported).
    Symbol(String),
    /// Symbol prefix, only for symbols at least `min_len` characters long (CUSIPs).
    Prefix { prefix: String, min_len: usize },
    /// Case-insensitive substring of the description.
    Description(String),
}

impl MatcherRule {
    pub fn matches(&self, symbol: &str, description_upper: &str) -> bool {
        match self {
            MatcherRule::Symbol(s) => symbol == s,
            MatcherRule::Prefix { prefix, min_len } => {
                symbol.len() >= *min_len && symbol.starts_with(prefix.as_str())
            }
            MatcherRule::Description(needle) => {
                description_upper.contains(needle.to_uppercase().as_str())
            }
        }
    }
}

/// Rules for one asset class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRules {
    pub asset_class: AssetClass,
    pub rules: Vec<MatcherRule>,
}

/// Ordered category table; the first category with a matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRules {
    pub categories: Vec<CategoryRules>,
    #[serde(default)]
    pub fallback: AssetClass,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        let symbol = |s: &str| MatcherRule::Symbol(s.into());
        let desc = |s: &str| MatcherRule::Description(s.into());
        ClassificationRules {
            categories: vec![
                CategoryRules {
                    asset_class: AssetClass::Cash,
                    rules: vec![
                        symbol("FZFXX"),
                        symbol("FDRXX"),
                        symbol("SPAXX"),
                        // bank sweep
                        symbol("QUSBQ"),
                        desc("MONEY MARKET"),
                        desc("CASH RESERVES"),
                        desc("FDIC INSURED DEPOSIT"),
                    ],
                },
                CategoryRules {
                    asset_class: AssetClass::Bond,
                    rules: vec![
                        MatcherRule::Prefix {
                            prefix: "912".into(),
                            min_len: 8,
                        },
                        desc("TREAS BILL"),
                        desc("TREASURY BILL"),
                    ],
                },
            ],
            fallback: AssetClass::Stock,
        }
    }
}

impl ClassificationRules {
    pub fn classify(&self, symbol: &str, description: &str) -> AssetClass {
        let symbol = symbol.trim();
        let description_upper = description.to_uppercase();
        self.categories
            .iter()
            .find(|c| c.rules.iter().any(|r| r.matches(symbol, &description_upper)))
            .map(|c| c.asset_class)
            .unwrap_or(self.fallback)
    }
}
