use crate::cache::ReshapeCache;
use crate::engine::{MonthTransform, ReshapeRequest, Reshaper};
use crate::error::Result;
use crate::filters::Filter;
use crate::schema::{LongTable, TotalsTable, WideTable, ACCOUNT, BUSINESS_UNIT, SCENARIO, YEAR};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const SALES_ACCOUNT: &str = "Sales";

/// The charts of the sales dashboard, each a fixed reshape over the uploaded table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum DashboardView {
    #[schemars(description = "Grouped bar chart: sales totals per business unit and scenario")]
    SalesByBusinessUnit { year: i64 },

    #[schemars(description = "Line chart: monthly sales per scenario for one business unit")]
    MonthlySalesForUnit { year: i64, business_unit: String },

    #[schemars(
        description = "Stacked bar chart: absolute yearly totals of every non-sales account"
    )]
    YearlyTotalsPerAccount { scenario: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAggregation {
    Monthly,
    Totals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "table", rename_all = "snake_case")]
pub enum ViewData {
    Monthly(LongTable),
    Totals(TotalsTable),
}

impl ViewData {
    pub fn total(&self) -> f64 {
        match self {
            ViewData::Monthly(t) => t.total(),
            ViewData::Totals(t) => t.total(),
        }
    }

    pub fn as_monthly(&self) -> Option<&LongTable> {
        match self {
            ViewData::Monthly(t) => Some(t),
            ViewData::Totals(_) => None,
        }
    }

    pub fn as_totals(&self) -> Option<&TotalsTable> {
        match self {
            ViewData::Totals(t) => Some(t),
            ViewData::Monthly(_) => None,
        }
    }
}

impl DashboardView {
    /// The dashboard as originally laid out: 2023 figures, Software unit, Actuals.
    pub fn defaults() -> Vec<DashboardView> {
        vec![
            DashboardView::SalesByBusinessUnit { year: 2023 },
            DashboardView::MonthlySalesForUnit {
                year: 2023,
                business_unit: "Software".to_string(),
            },
            DashboardView::YearlyTotalsPerAccount {
                scenario: "Actuals".to_string(),
            },
        ]
    }

    pub fn title(&self) -> String {
        match self {
            DashboardView::SalesByBusinessUnit { year } => format!("Sales for Year {}", year),
            DashboardView::MonthlySalesForUnit {
                year,
                business_unit,
            } => format!("Monthly Budget vs Forecast {} ({})", year, business_unit),
            DashboardView::YearlyTotalsPerAccount { scenario } => {
                format!("{} Yearly Totals Per Account", scenario)
            }
        }
    }

    pub fn aggregation(&self) -> ViewAggregation {
        match self {
            DashboardView::MonthlySalesForUnit { .. } => ViewAggregation::Monthly,
            DashboardView::SalesByBusinessUnit { .. }
            | DashboardView::YearlyTotalsPerAccount { .. } => ViewAggregation::Totals,
        }
    }

    pub fn request(&self) -> ReshapeRequest {
        match self {
            DashboardView::SalesByBusinessUnit { year } => {
                ReshapeRequest::new([SCENARIO, BUSINESS_UNIT])
                    .with_filter(Filter::eq(YEAR, *year))
                    .with_filter(Filter::eq(ACCOUNT, SALES_ACCOUNT))
            }
            DashboardView::MonthlySalesForUnit {
                year,
                business_unit,
            } => ReshapeRequest::new([SCENARIO])
                .with_filter(Filter::eq(YEAR, *year))
                .with_filter(Filter::eq(ACCOUNT, SALES_ACCOUNT))
                .with_filter(Filter::eq(BUSINESS_UNIT, business_unit.as_str())),
            DashboardView::YearlyTotalsPerAccount { scenario } => {
                ReshapeRequest::new([ACCOUNT, YEAR])
                    .with_filter(Filter::eq(SCENARIO, scenario.as_str()))
                    .with_filter(Filter::ne(ACCOUNT, SALES_ACCOUNT))
                    .with_transform(MonthTransform::Absolute)
            }
        }
    }

    pub fn compute(&self, reshaper: &Reshaper, table: &WideTable) -> Result<ViewData> {
        let request = self.request();
        match self.aggregation() {
            ViewAggregation::Monthly => Ok(ViewData::Monthly(
                reshaper.reshape(table, &request)?.sorted_by_calendar(),
            )),
            ViewAggregation::Totals => Ok(ViewData::Totals(reshaper.summarize(table, &request)?)),
        }
    }

    pub fn compute_cached(
        &self,
        cache: &mut ReshapeCache,
        reshaper: &Reshaper,
        table: &WideTable,
    ) -> Result<ViewData> {
        let request = self.request();
        match self.aggregation() {
            ViewAggregation::Monthly => Ok(ViewData::Monthly(
                cache
                    .get_or_reshape(reshaper, table, &request)?
                    .sorted_by_calendar(),
            )),
            ViewAggregation::Totals => Ok(ViewData::Totals(
                cache.get_or_summarize(reshaper, table, &request)?.clone(),
            )),
        }
    }
}
