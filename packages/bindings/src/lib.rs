use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use portfolio_irr_core::cash_flows::Entity;
use portfolio_irr_core::config::AnalysisConfig;
use portfolio_irr_core::data::PortfolioData;
use portfolio_irr_core::performance::{self, PortfolioAnalyzer, XirrInput};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Common request body: the normalised tables, optional configuration and,
/// for the per-account calls, an account number.
#[derive(Deserialize)]
struct AnalysisRequest {
    data: PortfolioData,
    #[serde(default)]
    config: AnalysisConfig,
    #[serde(default)]
    account: Option<String>,
    #[serde(default)]
    entity: Option<Entity>,
}

impl AnalysisRequest {
    fn parse(input_json: &str) -> NapiResult<Self> {
        let mut request: AnalysisRequest =
            serde_json::from_str(input_json).map_err(to_napi_error)?;
        request.config.register_missing_accounts(&request.data);
        Ok(request)
    }

    fn analyzer(&self) -> NapiResult<PortfolioAnalyzer<'_>> {
        PortfolioAnalyzer::new(&self.data, &self.config).map_err(to_napi_error)
    }

    fn account(&self) -> NapiResult<&str> {
        self.account
            .as_deref()
            .ok_or_else(|| to_napi_error("'account' is required"))
    }
}

// ---------------------------------------------------------------------------
// Portfolio analysis
// ---------------------------------------------------------------------------

#[napi]
pub fn analyze_portfolio(input_json: String) -> NapiResult<String> {
    let request = AnalysisRequest::parse(&input_json)?;
    let output = request
        .analyzer()?
        .analyze_portfolio()
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn analyze_accounts(input_json: String) -> NapiResult<String> {
    let request = AnalysisRequest::parse(&input_json)?;
    let output = request
        .analyzer()?
        .analyze_accounts()
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn analyze_holdings(input_json: String) -> NapiResult<String> {
    let request = AnalysisRequest::parse(&input_json)?;
    let output = request
        .analyzer()?
        .analyze_holdings(request.account()?)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn analyze_asset_classes(input_json: String) -> NapiResult<String> {
    let request = AnalysisRequest::parse(&input_json)?;
    let output = request
        .analyzer()?
        .analyze_asset_classes(request.account()?)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn analyze_portfolio_asset_classes(input_json: String) -> NapiResult<String> {
    let request = AnalysisRequest::parse(&input_json)?;
    let output = request
        .analyzer()?
        .analyze_portfolio_asset_classes()
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn portfolio_report(input_json: String) -> NapiResult<String> {
    let request = AnalysisRequest::parse(&input_json)?;
    let output = request.analyzer()?.analyze_all().map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn entity_metrics(input_json: String) -> NapiResult<String> {
    let request = AnalysisRequest::parse(&input_json)?;
    let entity = request.entity.clone().unwrap_or(Entity::Portfolio);
    let output = request
        .analyzer()?
        .analyze_entity(&entity)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

#[napi]
pub fn compute_xirr(input_json: String) -> NapiResult<String> {
    let input: XirrInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = performance::compute_xirr(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
