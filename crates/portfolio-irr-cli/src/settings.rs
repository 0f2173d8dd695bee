use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use portfolio_irr_core::config::AnalysisConfig;

use crate::input;

/// Everything read from `--config`: the analysis configuration plus the
/// loader-only settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(flatten)]
    pub analysis: AnalysisConfig,
    /// Exact description -> symbol, for rows exported without a ticker.
    pub symbol_aliases: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        let symbol_aliases = [
            ("FID BLUE CHIP GR K6", "FBCGX"),
            ("SP 500 INDEX PL CL E", "84679P173"),
            ("SP 500 INDEX PL CL F", "84679P173"),
        ]
        .into_iter()
        .map(|(d, s)| (d.to_string(), s.to_string()))
        .collect();
        Settings {
            analysis: AnalysisConfig::default(),
            symbol_aliases,
        }
    }
}

impl Settings {
    /// Defaults when no path is given, otherwise the YAML/JSON file.
    pub fn load(path: Option<&str>) -> Result<Settings, Box<dyn std::error::Error>> {
        match path {
            Some(path) => {
                let settings: Settings = input::file::read_structured(path)?;
                debug!(
                    path,
                    accounts = settings.analysis.accounts.len(),
                    overrides = settings.analysis.funding_overrides.len(),
                    "loaded settings"
                );
                Ok(settings)
            }
            None => Ok(Settings::default()),
        }
    }
}
