pub mod analysis;
pub mod metrics;

pub use analysis::{
    AccountBreakdown, MetricsRecord, MetricsTable, PortfolioAnalyzer, PortfolioReport,
};
pub use metrics::{
    calculate_metrics, compute_xirr, entity_metrics, holding_period_years, EntityMetrics,
    XirrInput, XirrOutput,
};
