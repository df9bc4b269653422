//! Chart aggregation.
//!
//! Consumes the evaluation ledger and produces per-bucket series for the
//! rendering layer. Stock-like items (assets, debts) sample the last known
//! value at each bucket date, forward-carried, zero before start. Flow-like
//! items (incomes, expenses, tax entries) sum their occurrences inside each
//! bucket. Asset delta views split per-bucket changes by mover, using the
//! ledger's source attribution.

use jiff::civil::Date;

use crate::date_math::{add_months, add_years};
use crate::model::{
    ChartDataPoint, ChartSeries, DataForView, EvalSource, Evaluation, EvaluationResult, Model,
    SETTING_VIEW_END, SETTING_VIEW_FREQUENCY, SETTING_VIEW_START,
};
use crate::settings::SettingsResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewFrequency {
    #[default]
    Monthly,
    Annual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewDetail {
    /// One series per item.
    #[default]
    Fine,
    /// Summed by category, falling back to item name.
    Coarse,
    /// Everything summed into one series.
    Total,
}

/// Restrict output to everything, one category, or one item.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    All,
    Category(String),
    Item(String),
}

/// How the asset bucket reports: level values, or per-bucket changes split
/// per mover and filtered by sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetView {
    #[default]
    Val,
    Deltas,
    Additions,
    Reductions,
    PlusMinus,
}

#[derive(Debug, Clone, Default)]
pub struct ChartOptions {
    pub frequency: ViewFrequency,
    pub detail: ViewDetail,
    pub focus: Focus,
    pub asset_view: AssetView,
}

impl ChartOptions {
    /// Defaults, with the bucketing frequency read from the model's
    /// `viewFrequency` setting when present.
    pub fn from_model(model: &Model) -> Self {
        let frequency = model
            .settings
            .iter()
            .find(|s| s.name == SETTING_VIEW_FREQUENCY)
            .map(|s| match s.value.trim() {
                "annual" | "yearly" => ViewFrequency::Annual,
                _ => ViewFrequency::Monthly,
            })
            .unwrap_or_default();
        Self {
            frequency,
            ..Self::default()
        }
    }

    pub fn with_detail(mut self, detail: ViewDetail) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_focus(mut self, focus: Focus) -> Self {
        self.focus = focus;
        self
    }

    pub fn with_asset_view(mut self, view: AssetView) -> Self {
        self.asset_view = view;
        self
    }
}

/// Build chart data with options read from the model's settings.
pub fn build_chart_data(model: &Model, result: &EvaluationResult) -> DataForView {
    build_chart_data_with(model, result, &ChartOptions::from_model(model))
}

/// Build chart data with explicit options.
pub fn build_chart_data_with(
    model: &Model,
    result: &EvaluationResult,
    options: &ChartOptions,
) -> DataForView {
    let resolver = match SettingsResolver::from_settings(&model.settings) {
        Ok(resolver) => resolver,
        Err(error) => {
            tracing::error!(%error, "cannot resolve settings for charting");
            return DataForView::default();
        }
    };
    let (start, end) = match (
        resolver.resolve_date(SETTING_VIEW_START),
        resolver.resolve_date(SETTING_VIEW_END),
    ) {
        (Ok(start), Ok(end)) if start <= end => (start, end),
        _ => {
            tracing::error!("invalid view range, returning empty chart data");
            return DataForView::default();
        }
    };

    let buckets = bucket_dates(start, end, options.frequency);

    let incomes: Vec<ChartItem> = model
        .incomes
        .iter()
        .map(|i| ChartItem::new(&i.name, &i.category))
        .collect();
    let expenses: Vec<ChartItem> = model
        .expenses
        .iter()
        .map(|e| ChartItem::new(&e.name, &e.category))
        .collect();
    let assets: Vec<ChartItem> = model
        .assets
        .iter()
        .filter(|a| !a.is_debt)
        .map(|a| ChartItem::new(&a.name, &a.category))
        .collect();
    let debts: Vec<ChartItem> = model
        .assets
        .iter()
        .filter(|a| a.is_debt)
        .map(|a| ChartItem::new(&a.name, &a.category))
        .collect();

    let asset_data = match options.asset_view {
        AssetView::Val => collapse(
            stock_rows(result, &assets, &buckets, options, 1.0),
            options.detail,
            &buckets,
        ),
        _ => delta_series(result, &assets, &buckets, start, options),
    };

    DataForView {
        expenses_data: collapse(
            flow_rows(result, &expenses, &buckets, options),
            options.detail,
            &buckets,
        ),
        incomes_data: collapse(
            flow_rows(result, &incomes, &buckets, options),
            options.detail,
            &buckets,
        ),
        asset_data,
        // Debts chart as positive amounts owed.
        debt_data: collapse(
            stock_rows(result, &debts, &buckets, options, -1.0),
            options.detail,
            &buckets,
        ),
        tax_data: tax_series(result, model, &buckets, options),
    }
}

struct ChartItem<'a> {
    name: &'a str,
    category: &'a str,
}

impl<'a> ChartItem<'a> {
    fn new(name: &'a str, category: &'a str) -> Self {
        Self { name, category }
    }

    fn group(&self) -> String {
        if self.category.is_empty() {
            self.name.to_string()
        } else {
            self.category.to_string()
        }
    }
}

fn focus_allows(focus: &Focus, item: &ChartItem) -> bool {
    match focus {
        Focus::All => true,
        Focus::Category(category) => item.category == category,
        Focus::Item(name) => item.name == name,
    }
}

fn bucket_dates(start: Date, end: Date, frequency: ViewFrequency) -> Vec<Date> {
    let mut out = Vec::new();
    let mut k = 0;
    loop {
        let date = match frequency {
            ViewFrequency::Monthly => add_months(start, k),
            ViewFrequency::Annual => add_years(start, k),
        };
        if date > end {
            break;
        }
        out.push(date);
        k += 1;
    }
    out
}

/// The exclusive upper edge of bucket `i`.
fn bucket_edge(buckets: &[Date], i: usize, frequency: ViewFrequency) -> Date {
    buckets.get(i + 1).copied().unwrap_or_else(|| match frequency {
        ViewFrequency::Monthly => add_months(buckets[i], 1),
        ViewFrequency::Annual => add_years(buckets[i], 1),
    })
}

/// (name, group, per-bucket values) rows sampling the forward-carried level
/// at each bucket date.
fn stock_rows(
    result: &EvaluationResult,
    items: &[ChartItem],
    buckets: &[Date],
    options: &ChartOptions,
    sign: f64,
) -> Vec<(String, String, Vec<f64>)> {
    items
        .iter()
        .filter(|item| focus_allows(&options.focus, item))
        .map(|item| {
            let history: Vec<&Evaluation> = result.history(item.name).collect();
            let mut cursor = 0;
            let mut last = 0.0;
            let values = buckets
                .iter()
                .map(|&bucket| {
                    while cursor < history.len() && history[cursor].date <= bucket {
                        last = history[cursor].value;
                        cursor += 1;
                    }
                    sign * last
                })
                .collect();
            (item.name.to_string(), item.group(), values)
        })
        .collect()
}

/// (name, group, per-bucket values) rows summing occurrences inside each
/// bucket window.
fn flow_rows(
    result: &EvaluationResult,
    items: &[ChartItem],
    buckets: &[Date],
    options: &ChartOptions,
) -> Vec<(String, String, Vec<f64>)> {
    items
        .iter()
        .filter(|item| focus_allows(&options.focus, item))
        .map(|item| {
            let mut values = vec![0.0; buckets.len()];
            for evaluation in result.history(item.name) {
                if let Some(i) = bucket_index(buckets, evaluation.date, options.frequency) {
                    values[i] += evaluation.value;
                }
            }
            (item.name.to_string(), item.group(), values)
        })
        .collect()
}

fn bucket_index(buckets: &[Date], date: Date, frequency: ViewFrequency) -> Option<usize> {
    if buckets.is_empty() || date < buckets[0] {
        return None;
    }
    let i = buckets.partition_point(|&b| b <= date) - 1;
    (date < bucket_edge(buckets, i, frequency)).then_some(i)
}

/// Collapse rows to series per the detail mode, preserving declaration order.
fn collapse(
    rows: Vec<(String, String, Vec<f64>)>,
    detail: ViewDetail,
    buckets: &[Date],
) -> Vec<ChartSeries> {
    let mut out: Vec<(String, Vec<f64>)> = Vec::new();
    for (name, group, values) in rows {
        let key = match detail {
            ViewDetail::Fine => name,
            ViewDetail::Coarse => group,
            ViewDetail::Total => "Total".to_string(),
        };
        match out.iter_mut().find(|(k, _)| *k == key) {
            Some((_, acc)) => {
                for (a, v) in acc.iter_mut().zip(values) {
                    *a += v;
                }
            }
            None => out.push((key, values)),
        }
    }
    out.into_iter()
        .map(|(item, values)| to_series(item, values, buckets))
        .collect()
}

fn to_series(item: String, values: Vec<f64>, buckets: &[Date]) -> ChartSeries {
    ChartSeries {
        item,
        data_points: buckets
            .iter()
            .zip(values)
            .map(|(date, y)| ChartDataPoint {
                label: date.to_string(),
                y,
            })
            .collect(),
    }
}

/// Per-bucket changes of each asset, one series per mover label, filtered by
/// sign per the view mode.
fn delta_series(
    result: &EvaluationResult,
    assets: &[ChartItem],
    buckets: &[Date],
    window_start: Date,
    options: &ChartOptions,
) -> Vec<ChartSeries> {
    let mut movers: Vec<(String, Vec<f64>)> = Vec::new();
    let mut add = |label: String, bucket: usize, delta: f64, len: usize| {
        let i = match movers.iter().position(|(k, _)| *k == label) {
            Some(i) => i,
            None => {
                movers.push((label, vec![0.0; len]));
                movers.len() - 1
            }
        };
        movers[i].1[bucket] += delta;
    };

    for item in assets
        .iter()
        .filter(|item| focus_allows(&options.focus, item))
    {
        let mut previous: Option<f64> = None;
        for evaluation in result.history(item.name) {
            let delta = match previous {
                Some(prev) => evaluation.value - prev,
                None => evaluation.value,
            };
            previous = Some(evaluation.value);
            if evaluation.date < window_start {
                continue;
            }
            let Some(bucket) = bucket_index(buckets, evaluation.date, options.frequency) else {
                continue;
            };
            let keep = match options.asset_view {
                AssetView::Additions => delta > 0.0,
                AssetView::Reductions => delta < 0.0,
                _ => delta != 0.0,
            };
            if !keep {
                continue;
            }
            let label = match &evaluation.source {
                EvalSource::Start => item.name.to_string(),
                EvalSource::Growth => format!("{}/growth", item.name),
                EvalSource::Mover(mover) => mover.clone(),
                EvalSource::Tax => format!("{}/tax", item.name),
            };
            add(label, bucket, delta, buckets.len());
        }
    }

    movers.sort_by(|a, b| a.0.cmp(&b.0));
    movers
        .into_iter()
        .map(|(item, values)| to_series(item, values, buckets))
        .collect()
}

/// The synthetic taxes bucket: every settlement entry whose name is not a
/// model item, summed per name into each bucket.
fn tax_series(
    result: &EvaluationResult,
    model: &Model,
    buckets: &[Date],
    options: &ChartOptions,
) -> Vec<ChartSeries> {
    let is_item = |name: &str| {
        model.assets.iter().any(|a| a.name == name)
            || model.incomes.iter().any(|i| i.name == name)
            || model.expenses.iter().any(|e| e.name == name)
    };

    let mut rows: Vec<(String, String, Vec<f64>)> = Vec::new();
    for evaluation in &result.evaluations {
        if evaluation.source != EvalSource::Tax || is_item(&evaluation.name) {
            continue;
        }
        let Some(i) = bucket_index(buckets, evaluation.date, options.frequency) else {
            continue;
        };
        match rows.iter_mut().find(|(name, _, _)| *name == evaluation.name) {
            Some((_, _, values)) => values[i] += evaluation.value,
            None => {
                let mut values = vec![0.0; buckets.len()];
                values[i] = evaluation.value;
                rows.push((evaluation.name.clone(), evaluation.name.clone(), values));
            }
        }
    }
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    // Tax entries have no categories, so coarse degenerates to fine here.
    collapse(rows, options.detail, buckets)
}
