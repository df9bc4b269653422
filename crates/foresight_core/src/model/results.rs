//! Engine outputs: the evaluation ledger, today's-value snapshots, and the
//! chart-ready series the rendering layer consumes.

use jiff::civil::Date;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// What moved a value: seeding, monthly growth, a named transaction or flow,
/// or tax settlement. Chart delta views split per-bucket changes by this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalSource {
    Start,
    Growth,
    /// A transaction, income or expense, by name.
    Mover(String),
    Tax,
}

/// One ledger entry: an item's value at a date. Entries are append-only; an
/// item may appear more than once on one date (baseline snapshot, then
/// post-transaction updates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub name: String,
    pub date: Date,
    pub value: f64,
    pub source: EvalSource,
}

impl Evaluation {
    pub fn new(name: impl Into<String>, date: Date, value: f64, source: EvalSource) -> Self {
        Self {
            name: name.into(),
            date,
            value,
            source,
        }
    }
}

/// Per-class name → value snapshots at the focus date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodaysValues {
    pub assets: FxHashMap<String, f64>,
    pub debts: FxHashMap<String, f64>,
    pub incomes: FxHashMap<String, f64>,
    pub expenses: FxHashMap<String, f64>,
    pub settings: FxHashMap<String, f64>,
}

/// The complete result of one evaluation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub evaluations: Vec<Evaluation>,
    pub todays_values: TodaysValues,
}

impl EvaluationResult {
    pub fn is_empty(&self) -> bool {
        self.evaluations.is_empty()
    }

    /// All evaluations for one item, in ledger order.
    pub fn history<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Evaluation> {
        self.evaluations.iter().filter(move |e| e.name == name)
    }

    /// The latest value of an item at or before `as_of`.
    pub fn value_at(&self, name: &str, as_of: Date) -> Option<f64> {
        let mut latest = None;
        for evaluation in self.history(name) {
            if evaluation.date <= as_of {
                latest = Some(evaluation.value);
            }
        }
        latest
    }
}

/// One chart point: a formatted bucket date and a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataPoint {
    pub label: String,
    pub y: f64,
}

/// One labelled series of chart points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub item: String,
    pub data_points: Vec<ChartDataPoint>,
}

/// Everything the chart-rendering layer needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataForView {
    pub expenses_data: Vec<ChartSeries>,
    pub incomes_data: Vec<ChartSeries>,
    pub asset_data: Vec<ChartSeries>,
    pub debt_data: Vec<ChartSeries>,
    pub tax_data: Vec<ChartSeries>,
}
