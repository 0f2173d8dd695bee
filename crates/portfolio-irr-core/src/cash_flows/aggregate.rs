use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cash_flows::{CashFlowBuilder, Entity, EntitySeries};
use crate::error::PortfolioError;
use crate::types::{AssetClass, CashFlow};
use crate::PortfolioResult;

impl EntitySeries {
    /// Combine independently built series into a new one for a larger entity.
    ///
    /// Flow lists are concatenated (each part keeps its own terminal flow) and
    /// the scalar totals are summed. Sources are only borrowed. With no parts
    /// the result is an empty holding: a single zero terminal flow.
    pub fn aggregate<'s, I>(
        entity: Entity,
        valuation_date: NaiveDate,
        parts: I,
    ) -> PortfolioResult<EntitySeries>
    where
        I: IntoIterator<Item = &'s EntitySeries>,
    {
        let mut combined = EntitySeries {
            entity,
            flows: Vec::new(),
            total_invested: Decimal::ZERO,
            total_distributed: Decimal::ZERO,
            current_value: Decimal::ZERO,
            cost_basis: Decimal::ZERO,
            valuation_date,
        };

        let mut count = 0usize;
        for part in parts {
            if part.valuation_date != valuation_date {
                return Err(PortfolioError::InvalidInput {
                    field: "valuation_date".into(),
                    reason: format!(
                        "{} is valued at {}, expected {}",
                        part.entity, part.valuation_date, valuation_date
                    ),
                });
            }
            combined.flows.extend(part.flows.iter().cloned());
            combined.total_invested += part.total_invested;
            combined.total_distributed += part.total_distributed;
            combined.current_value += part.current_value;
            combined.cost_basis += part.cost_basis;
            count += 1;
        }

        if count == 0 {
            combined.flows.push(CashFlow::terminal(
                valuation_date,
                Decimal::ZERO,
                super::TERMINAL_LABEL,
            ));
        }

        debug!(
            entity = %combined.entity,
            parts = count,
            flows = combined.flows.len(),
            "aggregated series"
        );
        Ok(combined)
    }

    /// Pairwise form of [`EntitySeries::aggregate`].
    pub fn merge(&self, other: &EntitySeries, entity: Entity) -> PortfolioResult<EntitySeries> {
        EntitySeries::aggregate(entity, self.valuation_date, [self, other])
    }
}

impl CashFlowBuilder<'_> {
    /// Every account's funding series, built independently.
    pub fn account_series(&self) -> PortfolioResult<Vec<EntitySeries>> {
        let accounts = self.data().accounts();

        #[cfg(feature = "parallel")]
        let built = accounts.par_iter().map(|a| self.account(a)).collect();
        #[cfg(not(feature = "parallel"))]
        let built = accounts.iter().map(|a| self.account(a)).collect();

        built
    }

    /// The whole portfolio: the aggregate of all account series.
    ///
    /// Waits for every account series before combining them.
    pub fn portfolio(&self) -> PortfolioResult<EntitySeries> {
        let accounts = self.account_series()?;
        EntitySeries::aggregate(Entity::Portfolio, self.data().valuation_date, &accounts)
    }

    /// One asset class across all accounts: each account's class series,
    /// built independently and then combined.
    pub fn portfolio_asset_class(&self, asset_class: AssetClass) -> PortfolioResult<EntitySeries> {
        let accounts = self.data().accounts();

        #[cfg(feature = "parallel")]
        let parts: PortfolioResult<Vec<EntitySeries>> = accounts
            .par_iter()
            .map(|a| self.asset_class(a, asset_class))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let parts: PortfolioResult<Vec<EntitySeries>> = accounts
            .iter()
            .map(|a| self.asset_class(a, asset_class))
            .collect();

        EntitySeries::aggregate(
            Entity::portfolio_asset_class(asset_class),
            self.data().valuation_date,
            &parts?,
        )
    }
}
