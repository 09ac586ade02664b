//! # Sales Dashboard Pipeline
//!
//! Turns a wide-format sales spreadsheet (one row per scenario/account/business unit/year,
//! one column per calendar month) into the long-format series a dashboard chart consumes.
//!
//! ## Core Concepts
//!
//! - **Wide table**: categorical columns plus twelve month columns, loaded once per upload
//! - **Unpivot**: each kept row becomes twelve (keys, month, value) records in calendar order
//! - **Group-by-sum**: records sharing the same retained keys (and month) are summed, so
//!   repeated data-entry batches add up instead of overwriting each other
//! - **Views**: the dashboard's charts expressed as fixed reshape requests
//!
//! The pipeline is pure: it borrows the table, never mutates it, and returns the same
//! output for the same input. Memoization lives outside it in [`ReshapeCache`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use sales_dashboard_pipeline::*;
//!
//! let table = read_wide_table_from_path("sales.csv")?;
//!
//! let request = ReshapeRequest::new(["Scenario"])
//!     .with_filter(Filter::eq("Year", 2023))
//!     .with_filter(Filter::eq("Account", "Sales"));
//!
//! let monthly = reshape(&table, &request)?;
//! for record in &monthly.sorted_by_calendar().records {
//!     println!("{:?} {} {}", record.keys, record.month, record.value);
//! }
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod filters;
pub mod ingestion;
pub mod schema;
pub mod utils;
pub mod views;

pub use cache::{CacheStats, ReshapeCache};
pub use engine::{
    reshape, summarize, MissingMonthPolicy, MonthTransform, PipelineOptions, ReshapeRequest,
    Reshaper,
};
pub use error::{DashboardError, Result};
pub use filters::{Filter, FilterValue, Predicate};
pub use ingestion::{
    read_wide_table, read_wide_table_from_path, read_wide_table_from_xlsx,
    read_wide_table_from_xlsx_bytes,
};
pub use schema::*;
pub use utils::*;
pub use views::{DashboardView, ViewAggregation, ViewData};

use log::{debug, info};

/// Computes dashboard views for one render pass over a borrowed table.
pub struct DashboardBuilder<'a> {
    table: &'a WideTable,
    reshaper: Reshaper,
}

impl<'a> DashboardBuilder<'a> {
    pub fn new(table: &'a WideTable, options: PipelineOptions) -> Self {
        Self {
            table,
            reshaper: Reshaper::new(options),
        }
    }

    pub fn build(&self, views: &[DashboardView]) -> Result<Vec<(DashboardView, ViewData)>> {
        info!(
            "Building {} dashboard view(s) over {} rows",
            views.len(),
            self.table.len()
        );

        views
            .iter()
            .map(|view| {
                let data = view.compute(&self.reshaper, self.table)?;
                debug!("View '{}' total {}", view.title(), data.total());
                Ok((view.clone(), data))
            })
            .collect()
    }

    pub fn build_cached(
        &self,
        cache: &mut ReshapeCache,
        views: &[DashboardView],
    ) -> Result<Vec<(DashboardView, ViewData)>> {
        info!(
            "Building {} dashboard view(s) over {} rows (cached)",
            views.len(),
            self.table.len()
        );

        let mut out = Vec::with_capacity(views.len());
        for view in views {
            let data = view.compute_cached(cache, &self.reshaper, self.table)?;
            out.push((view.clone(), data));
        }

        let stats = cache.stats();
        debug!(
            "Cache now holds {} result(s), {} hit(s), {} miss(es)",
            stats.entries, stats.hits, stats.misses
        );
        Ok(out)
    }
}

/// Computes the default dashboard views for an uploaded table.
pub fn build_dashboard(table: &WideTable) -> Result<Vec<(DashboardView, ViewData)>> {
    DashboardBuilder::new(table, PipelineOptions::default()).build(&DashboardView::defaults())
}
