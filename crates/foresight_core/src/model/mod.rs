//! The declarative model the engine evaluates.

mod bands;
mod items;
mod results;
mod settings;
mod transactions;
mod triggers;

use serde::{Deserialize, Serialize};

pub use bands::{TaxBand, TaxBands};
pub use items::{
    Asset, CASH_NAME, Expense, Income, LiabilityKind, LiabilityTag, PENSION_CRYSTALLIZED_PREFIX,
    PENSION_DB_PREFIX, PENSION_DC_PREFIX, PENSION_TAX_FREE_PREFIX, PensionRole, RSU_CATEGORY,
    RateSpec, ValueSpec,
};
pub use results::{
    ChartDataPoint, ChartSeries, DataForView, EvalSource, Evaluation, EvaluationResult,
    TodaysValues,
};
pub use settings::{
    SETTING_CPI, SETTING_FOCUS_DATE, SETTING_VIEW_END, SETTING_VIEW_FREQUENCY, SETTING_VIEW_START,
    Setting, SettingExpr, SettingKind,
};
pub use transactions::{
    Recurrence, RecurrenceUnit, RevalueTarget, TargetSpec, Transaction, TransactionKind,
    TransferSide,
};
pub use triggers::{DateSpec, Trigger};

/// A complete plan: items, transactions, triggers, settings and band tables.
///
/// Read-only to the engine; a run is a pure function of (model, window).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub settings: Vec<Setting>,
    pub triggers: Vec<Trigger>,
    pub assets: Vec<Asset>,
    pub incomes: Vec<Income>,
    pub expenses: Vec<Expense>,
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub tax_bands: TaxBands,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn setting(mut self, setting: Setting) -> Self {
        self.settings.push(setting);
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    pub fn income(mut self, income: Income) -> Self {
        self.incomes.push(income);
        self
    }

    pub fn expense(mut self, expense: Expense) -> Self {
        self.expenses.push(expense);
        self
    }

    pub fn transaction(mut self, transaction: Transaction) -> Self {
        self.transactions.push(transaction);
        self
    }

    pub fn with_tax_bands(mut self, bands: TaxBands) -> Self {
        self.tax_bands = bands;
        self
    }

    /// The reporting window as a pair of view settings.
    pub fn with_view_range(self, start: &str, end: &str) -> Self {
        self.setting(Setting::view(SETTING_VIEW_START, start))
            .setting(Setting::view(SETTING_VIEW_END, end))
    }
}
