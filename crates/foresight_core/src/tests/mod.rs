//! Scenario tests for the projection engine.
//!
//! Organized by topic:
//! - `growth` - growth/CPI compounding and unit-priced holdings
//! - `ordering` - ledger ordering guarantees
//! - `transfers` - custom/recurring transfers and revaluations
//! - `liquidation` - conditional liquidation and debt payoff
//! - `taxes` - income tax, NI and CGT settlement
//! - `rsu` - equity grant vesting and sell-to-cover withholding
//! - `pensions` - contributions, crystallization, tax-free splits
//! - `charts` - aggregation layer
//! - `failures` - fail-closed configuration errors

mod charts;
mod taxes;

use jiff::civil::Date;

use crate::model::{Asset, Model, SETTING_CPI, Setting};

/// A window, a zero-CPI setting and a cash item: the minimum viable model.
pub(crate) fn base_model(start: Date, end: Date, cash: f64) -> Model {
    Model::new()
        .with_view_range(&start.to_string(), &end.to_string())
        .setting(Setting::constant(SETTING_CPI, "0"))
        .asset(Asset::cash(start, cash))
}
