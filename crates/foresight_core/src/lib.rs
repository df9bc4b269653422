//! Deterministic personal-finance projection engine.
//!
//! Given a declarative model of financial items (cash, assets, debts,
//! incomes, expenses, scheduled transactions, named settings and date
//! triggers) and a reporting window, the engine walks the window month by
//! month, applying growth, inflation, recurring and conditional transactions
//! and the configured tax rules, and produces:
//! - an ordered ledger of value evaluations for every item,
//! - "today's value" snapshots at a focus date,
//! - chart-ready series via the aggregation layer.
//!
//! A run is a pure function of (model, window): no I/O, no randomness, one
//! thread. Configuration errors fail the whole run closed - the public entry
//! point logs a diagnostic and returns an empty result rather than a partial
//! ledger.
//!
//! ```ignore
//! use foresight_core::model::{Asset, Expense, Model, Setting};
//! use foresight_core::{build_chart_data, evaluate};
//!
//! let model = Model::new()
//!     .with_view_range("2020-01-01", "2030-01-01")
//!     .setting(Setting::constant("cpi", "2.5"))
//!     .asset(Asset::cash(jiff::civil::date(2020, 1, 1), 5_000.0))
//!     .expense(Expense::new("Rent", jiff::civil::date(2020, 1, 1), 900.0));
//!
//! let result = evaluate(&model);
//! let charts = build_chart_data(&model, &result);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod chart;
pub mod date_math;
pub mod error;
pub mod growth;
pub mod settings;
pub mod simulation;
pub mod simulation_state;
pub mod tax;
pub mod transactions;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use chart::{
    AssetView, ChartOptions, Focus, ViewDetail, ViewFrequency, build_chart_data,
    build_chart_data_with,
};
pub use error::{EvaluationError, ModelError, SettingError};
pub use model::{DataForView, EvaluationResult, Model};
pub use simulation::{evaluate, try_evaluate, try_evaluate_at};
