//! The evaluation engine.
//!
//! One run lowers the model, generates every moment in the reporting window
//! (item seedings, monthly re-evaluations, transaction occurrences, tax-year
//! boundaries), sorts them into a single timeline and walks it. Same-date
//! ordering: tax settlement of the year just ended runs first (a payment
//! landing on 6 April belongs to the new year), then item evaluations (the
//! cash item ahead of the rest, then declaration order), then transactions in
//! declaration order.

use jiff::civil::Date;

use crate::date_math::{add_months, tax_year_boundaries};
use crate::error::EvaluationError;
use crate::growth::monthly_multiplier;
use crate::model::{
    CASH_NAME, EvalSource, EvaluationResult, LiabilityKind, Model, RateSpec, SETTING_FOCUS_DATE,
    TodaysValues, ValueSpec,
};
use crate::simulation_state::{ItemClass, RuntimeItem, RuntimeKind, SimulationState};
use crate::tax::settle_tax_year;
use crate::transactions::{apply_transaction, pension_deductions};

/// Run a projection, failing closed: configuration errors are logged and an
/// empty result is returned, never a partial ledger.
pub fn evaluate(model: &Model) -> EvaluationResult {
    match try_evaluate(model) {
        Ok(result) => result,
        Err(error) => {
            tracing::error!(%error, "projection failed, returning empty result");
            EvaluationResult::default()
        }
    }
}

/// Run a projection. The focus date for today's values comes from the
/// `focusDate` setting when present, otherwise the real today.
pub fn try_evaluate(model: &Model) -> Result<EvaluationResult, EvaluationError> {
    let state = SimulationState::from_model(model)?;
    let focus = if state.resolver.contains(SETTING_FOCUS_DATE) {
        state.resolver.resolve_date(SETTING_FOCUS_DATE)?
    } else {
        jiff::Zoned::now().date()
    };
    run(state, focus)
}

/// Run a projection with an explicit focus date for today's values.
pub fn try_evaluate_at(model: &Model, focus: Date) -> Result<EvaluationResult, EvaluationError> {
    let state = SimulationState::from_model(model)?;
    run(state, focus)
}

fn run(mut state: SimulationState, focus: Date) -> Result<EvaluationResult, EvaluationError> {
    let moments = build_moments(&state);
    for moment in moments {
        match moment.kind {
            MomentKind::Seed(i) => seed_item(&mut state, i, moment.date)?,
            MomentKind::Evaluate(i) => evaluate_item(&mut state, i, moment.date)?,
            MomentKind::Transaction(t) => apply_transaction(&mut state, t, moment.date)?,
            MomentKind::TaxYearEnd => settle_tax_year(&mut state, moment.date),
        }
    }
    let todays_values = todays_values(&state, focus);
    Ok(EvaluationResult {
        evaluations: state.evaluations,
        todays_values,
    })
}

#[derive(Debug, Clone, Copy)]
enum MomentKind {
    Seed(usize),
    Evaluate(usize),
    Transaction(usize),
    TaxYearEnd,
}

#[derive(Debug, Clone, Copy)]
struct Moment {
    date: Date,
    /// 0 tax settlement, 1 item evaluations, 2 transactions.
    phase: u8,
    /// Within a phase: the cash item, then declaration order.
    order: usize,
    kind: MomentKind,
}

fn build_moments(state: &SimulationState) -> Vec<Moment> {
    let mut moments = Vec::new();
    let window_end = state.window_end;

    let mut earliest = state.window_start;
    for (i, item) in state.items.iter().enumerate() {
        // Items outside the window are never evaluated.
        if item.start > window_end {
            continue;
        }
        if let Some(end) = item.end
            && end < state.window_start
        {
            continue;
        }
        earliest = earliest.min(item.start);

        let order = if item.name == CASH_NAME { 0 } else { i + 1 };
        moments.push(Moment {
            date: item.start,
            phase: 1,
            order,
            kind: MomentKind::Seed(i),
        });

        let mut k = 1;
        loop {
            let date = add_months(item.start, k);
            if date > window_end {
                break;
            }
            // End dates are exclusive: nothing falls due on the end date.
            if let Some(end) = item.end
                && date >= end
            {
                break;
            }
            moments.push(Moment {
                date,
                phase: 1,
                order,
                kind: MomentKind::Evaluate(i),
            });
            k += 1;
        }
    }

    for (t, tx) in state.transactions.iter().enumerate() {
        // Pension contributions ride income payments.
        if matches!(tx.kind, RuntimeKind::PensionContribution { .. }) {
            continue;
        }
        for date in tx.occurrences(window_end) {
            moments.push(Moment {
                date,
                phase: 2,
                order: t,
                kind: MomentKind::Transaction(t),
            });
        }
    }

    for date in tax_year_boundaries(earliest, window_end) {
        moments.push(Moment {
            date,
            phase: 0,
            order: 0,
            kind: MomentKind::TaxYearEnd,
        });
    }

    moments.sort_by(|a, b| {
        (a.date, a.phase, a.order).cmp(&(b.date, b.phase, b.order))
    });
    moments
}

fn seed_item(state: &mut SimulationState, i: usize, date: Date) -> Result<(), EvaluationError> {
    let item = state.items[i].clone();

    let mut value = if item.is_unit_priced() {
        let quantity = item.initial_quantity.unwrap_or(0.0);
        state.quantities.insert(item.name.clone(), quantity);
        quantity * state.unit_price(&item, date)?
    } else {
        match &item.value {
            ValueSpec::Amount(v) => *v,
            ValueSpec::Setting(name) => state.resolver.resolve(name, date)?,
        }
    };

    // Revaluations and pension credits that arrived before the start.
    if let Some(v) = state.seed_override.remove(&item.name) {
        value = v;
    }
    if let Some(scale) = state.seed_scale.remove(&item.name) {
        value *= scale;
    }
    if let Some(accrued) = state.accrued_before_start.remove(&item.name) {
        value += accrued;
    }

    if value < 0.0 && !item.allows_negative() {
        return Err(EvaluationError::NegativeNotAllowed {
            item: item.name.clone(),
            value,
        });
    }
    if let Some(cost) = item.purchase_price {
        state.cost_basis.insert(item.name.clone(), cost);
    }

    state.record(&item.name, date, value, EvalSource::Start);

    // A vesting grant delivers its full value into the party's income pool.
    if item.is_rsu
        && let Some(tag) = item.tag(LiabilityKind::IncomeTax)
    {
        state.pools.accrue_vested(&tag.party, value);
    }

    match item.class {
        ItemClass::Income => income_flow(state, &item, value, date),
        ItemClass::Expense => {
            expense_flow(state, &item, value, date);
            Ok(())
        }
        ItemClass::Asset => Ok(()),
    }
}

fn evaluate_item(state: &mut SimulationState, i: usize, date: Date) -> Result<(), EvaluationError> {
    let item = state.items[i].clone();
    if !state.started(&item.name) {
        return Ok(());
    }

    let value = if item.is_unit_priced() {
        // Priced holdings never compound; movement comes from the setting.
        state.units(&item.name) * state.unit_price(&item, date)?
    } else {
        let growth = match &item.growth {
            RateSpec::Rate(rate) => *rate,
            RateSpec::Setting(name) => state.resolver.resolve(name, date)?,
        };
        let multiplier = monthly_multiplier(growth, state.cpi, item.cpi_immune);
        state.current(&item.name).unwrap_or(0.0) * multiplier
    };
    state.record(&item.name, date, value, EvalSource::Growth);

    match item.class {
        ItemClass::Income => income_flow(state, &item, value, date),
        ItemClass::Expense => {
            expense_flow(state, &item, value, date);
            Ok(())
        }
        ItemClass::Asset => Ok(()),
    }
}

/// Deliver one income payment: pension deductions come off the top, the rest
/// is credited to cash and pooled for the income's liability tags.
fn income_flow(
    state: &mut SimulationState,
    item: &RuntimeItem,
    gross: f64,
    date: Date,
) -> Result<(), EvaluationError> {
    let deducted = pension_deductions(state, &item.name, gross, date)?;
    let delivered = gross - deducted;
    if delivered != 0.0 {
        state.adjust_cash(date, delivered, EvalSource::Mover(item.name.clone()));
    }
    for tag in &item.liabilities {
        match tag.kind {
            LiabilityKind::IncomeTax => state.pools.accrue_income(&tag.party, delivered),
            LiabilityKind::NationalInsurance => state.pools.accrue_ni(&tag.party, delivered),
            LiabilityKind::CapitalGains => {}
        }
    }
    Ok(())
}

fn expense_flow(state: &mut SimulationState, item: &RuntimeItem, amount: f64, date: Date) {
    if amount != 0.0 {
        state.adjust_cash(date, -amount, EvalSource::Mover(item.name.clone()));
    }
}

/// Snapshot every item class and numeric setting at the focus date.
fn todays_values(state: &SimulationState, focus: Date) -> TodaysValues {
    let mut values = TodaysValues::default();

    let mut latest: rustc_hash::FxHashMap<&str, f64> = rustc_hash::FxHashMap::default();
    for evaluation in &state.evaluations {
        if evaluation.date <= focus {
            latest.insert(evaluation.name.as_str(), evaluation.value);
        }
    }

    for item in &state.items {
        let Some(&value) = latest.get(item.name.as_str()) else {
            continue;
        };
        // An ended income or expense is no longer a today's value.
        if item.end.is_some_and(|end| focus >= end) {
            continue;
        }
        let bucket = match item.class {
            ItemClass::Asset if item.is_debt => &mut values.debts,
            ItemClass::Asset => &mut values.assets,
            ItemClass::Income => &mut values.incomes,
            ItemClass::Expense => &mut values.expenses,
        };
        bucket.insert(item.name.clone(), value);
    }

    for name in state.resolver.names() {
        if let Ok(value) = state.resolver.resolve(name, focus) {
            values.settings.insert(name.to_string(), value);
        }
    }

    values
}
