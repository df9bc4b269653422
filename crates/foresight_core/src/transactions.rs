//! Transaction processing.
//!
//! One exhaustive match over the lowered transaction kinds. Every mutation
//! goes through [`draw_from`]/[`credit_to`], which append evaluations and
//! update the snapshot map immediately, so later same-date steps observe the
//! transfer. Depletion clamps and continues; only configuration failures
//! (such as revaluing a non-negative item below zero) abort the run.

use jiff::civil::Date;

use crate::error::EvaluationError;
use crate::model::{EvalSource, LiabilityKind, PensionRole, RevalueTarget};
use crate::settings::Revaluation;
use crate::simulation_state::{RuntimeKind, RuntimeSide, SimulationState};

const EPSILON: f64 = 1e-9;

/// Apply one occurrence of a transaction.
pub fn apply_transaction(
    state: &mut SimulationState,
    tx_index: usize,
    date: Date,
) -> Result<(), EvaluationError> {
    let tx = state.transactions[tx_index].clone();
    let mover = tx.name.as_str();

    match &tx.kind {
        RuntimeKind::Transfer { from, to } => apply_transfer(state, from, to, date, mover),

        RuntimeKind::LiquidateConditional { sources, target } => {
            apply_liquidation(state, sources, target, date, mover)
        }

        RuntimeKind::PayOffDebt { from, to } => {
            let debt = &to.names[0];
            let owed = state.current(debt).unwrap_or(0.0);
            if owed >= 0.0 {
                return Ok(());
            }
            let source = &from.names[0];
            let balance = state.current(source).unwrap_or(0.0);
            let requested = if from.absolute {
                from.value
            } else {
                (from.value * balance).max(0.0)
            };
            // A single payment may overshoot zero: the credit is not clamped
            // to the remaining debt.
            let paid = draw_from(state, source, requested, date, mover, true)?;
            if paid > 0.0 {
                credit_to(state, debt, paid * to.value, date, mover)?;
            }
            Ok(())
        }

        // Contributions ride each income payment, not their own occurrences.
        RuntimeKind::PensionContribution { .. } => Ok(()),

        RuntimeKind::Revalue {
            target,
            names,
            value,
            absolute,
        } => apply_revalue(state, *target, names, *value, *absolute, date, mover),

        RuntimeKind::Crystallize {
            from,
            to,
            value,
            absolute,
        }
        | RuntimeKind::PensionTransfer {
            from,
            to,
            value,
            absolute,
        } => {
            let held = state.current(from).unwrap_or(0.0).max(0.0);
            let requested = if *absolute { *value } else { *value * held };
            let amount = requested.clamp(0.0, held);
            move_pot_value(state, from, to, amount, date, mover)
        }

        RuntimeKind::MoveTaxFreePart { from, to, fraction } => {
            let held = state.current(from).unwrap_or(0.0).max(0.0);
            let amount = (fraction * held).clamp(0.0, held);
            move_pot_value(state, from, to, amount, date, mover)
        }
    }
}

fn apply_transfer(
    state: &mut SimulationState,
    from: &Option<RuntimeSide>,
    to: &Option<RuntimeSide>,
    date: Date,
    mover: &str,
) -> Result<(), EvaluationError> {
    match (from, to) {
        (Some(from), to) => {
            let mut moved = 0.0;
            for name in &from.names {
                let balance = state.current(name).unwrap_or(0.0);
                let requested = if from.absolute {
                    from.value
                } else {
                    (from.value * balance).max(0.0)
                };
                moved += draw_from(state, name, requested, date, mover, false)?;
            }
            if let Some(to) = to
                && moved > 0.0
            {
                let share = moved / to.names.len() as f64;
                for name in &to.names {
                    let amount = if to.absolute {
                        to.value
                    } else {
                        share * to.value
                    };
                    credit_to(state, name, amount, date, mover)?;
                }
            }
            Ok(())
        }
        (None, Some(to)) => {
            // Pure injection from outside the model.
            for name in &to.names {
                let amount = if to.absolute {
                    to.value
                } else {
                    to.value * state.current(name).unwrap_or(0.0)
                };
                credit_to(state, name, amount, date, mover)?;
            }
            Ok(())
        }
        (None, None) => Ok(()),
    }
}

fn apply_liquidation(
    state: &mut SimulationState,
    sources: &RuntimeSide,
    target: &RuntimeSide,
    date: Date,
    mover: &str,
) -> Result<(), EvaluationError> {
    let target_name = &target.names[0];
    let shortfall = state.current(target_name).unwrap_or(0.0);
    if shortfall >= 0.0 {
        return Ok(());
    }

    let friction = if target.absolute { 1.0 } else { target.value };
    if friction <= 0.0 {
        tracing::warn!(transaction = mover, "non-positive receiving factor, skipping");
        return Ok(());
    }
    let needed = if target.absolute {
        target.value
    } else {
        -shortfall
    };

    let mut credited = 0.0;
    for source in &sources.names {
        if credited >= needed - EPSILON {
            break;
        }
        let balance = state.current(source).unwrap_or(0.0);
        let cap = if sources.absolute {
            sources.value
        } else {
            (sources.value * balance).max(0.0)
        };
        let want = ((needed - credited) / friction).min(cap);
        if want <= 0.0 {
            continue;
        }
        let drawn = draw_from(state, source, want, date, mover, true)?;
        credited += drawn * friction;
    }

    if credited > 0.0 {
        credit_to(state, target_name, credited, date, mover)?;
    }
    Ok(())
}

fn apply_revalue(
    state: &mut SimulationState,
    target: RevalueTarget,
    names: &[String],
    value: f64,
    absolute: bool,
    date: Date,
    mover: &str,
) -> Result<(), EvaluationError> {
    if target == RevalueTarget::Setting {
        let revaluation = if absolute {
            Revaluation::Set(value)
        } else {
            Revaluation::Scale(value)
        };
        for name in names {
            state.resolver.revalue(name, date, revaluation)?;
        }
        return Ok(());
    }

    for name in names {
        if !state.started(name) {
            // Not seeded yet: fold into the eventual seed value.
            if absolute {
                state.seed_override.insert(name.clone(), value);
            } else {
                *state.seed_scale.entry(name.clone()).or_insert(1.0) *= value;
            }
            continue;
        }

        let item = state.item(name).expect("validated at load");
        let allows_negative = item.allows_negative();
        let price_setting = item.price_setting().map(str::to_string);
        let current = state.current(name).unwrap_or(0.0);
        let next = if absolute { value } else { current * value };
        if next < 0.0 && !allows_negative {
            return Err(EvaluationError::NegativeNotAllowed {
                item: name.clone(),
                value: next,
            });
        }
        // A unit-priced holding keeps value = quantity x price coherent by
        // adjusting its quantity.
        if let Some(setting) = price_setting {
            let price = state.resolver.resolve(&setting, date)?;
            if price > 0.0 {
                state.quantities.insert(name.clone(), next / price);
            }
        }
        state.record(name, date, next, EvalSource::Mover(mover.to_string()));
    }
    Ok(())
}

fn move_pot_value(
    state: &mut SimulationState,
    from: &str,
    to: &str,
    amount: f64,
    date: Date,
    mover: &str,
) -> Result<(), EvaluationError> {
    if amount <= 0.0 {
        return Ok(());
    }
    let remaining = state.current(from).unwrap_or(0.0) - amount;
    state.record(from, date, remaining, EvalSource::Mover(mover.to_string()));
    credit_to(state, to, amount, date, mover)
}

/// Remove up to `requested` of value from an item and return what was
/// actually removed. `clamp_at_zero` forces draining semantics even for items
/// allowed to go negative (liquidation, debt payments).
///
/// Side effects beyond the balance change: unit-priced holdings shed units,
/// CGT-liable disposals accrue pro-rata gains, and withdrawals from a
/// crystallized pot accrue taxable income.
fn draw_from(
    state: &mut SimulationState,
    name: &str,
    requested: f64,
    date: Date,
    mover: &str,
    clamp_at_zero: bool,
) -> Result<f64, EvaluationError> {
    if requested <= 0.0 {
        return Ok(0.0);
    }
    if !state.started(name) {
        tracing::warn!(item = name, date = %date, "transfer from an item before its start, skipping");
        return Ok(0.0);
    }

    let item = state.item(name).expect("validated at load");
    let allows_negative = item.allows_negative() && !clamp_at_zero;
    let unit_priced = item.is_unit_priced();
    let role = item.role;
    let gains_party = item
        .tag(LiabilityKind::CapitalGains)
        .map(|t| t.party.clone());
    let income_party = item
        .tag(LiabilityKind::IncomeTax)
        .map(|t| t.party.clone());
    let initial_quantity = item.initial_quantity;
    let purchase_price = item.purchase_price;
    let price_setting = item.price_setting().map(str::to_string);

    let current = state.current(name).unwrap_or(0.0);
    let taken;

    if unit_priced {
        let price = match &price_setting {
            Some(setting) => state.resolver.resolve(setting, date)?,
            None => 0.0,
        };
        if price <= 0.0 {
            return Ok(0.0);
        }
        let held = state.units(name);
        let available = held * price;
        taken = requested.min(available).max(0.0);
        if taken <= 0.0 {
            return Ok(0.0);
        }
        if taken < requested - EPSILON {
            tracing::warn!(item = name, requested, available, "partial disposal, holding depleted");
        }
        let sold = taken / price;
        state.quantities.insert(name.to_string(), held - sold);
        // Gain is proceeds less pro-rata purchase cost.
        if let (Some(party), Some(cost), Some(initial)) =
            (&gains_party, purchase_price, initial_quantity)
            && initial > 0.0
        {
            let cost_per_unit = cost / initial;
            state.pools.accrue_gain(party, sold * (price - cost_per_unit));
        }
        let value = (held - sold) * price;
        state.record(name, date, value, EvalSource::Mover(mover.to_string()));
    } else {
        taken = if allows_negative {
            requested
        } else {
            let available = current.max(0.0);
            if requested > available + EPSILON {
                tracing::warn!(item = name, requested, available, "source depleted, clamping draw");
            }
            requested.min(available)
        };
        if taken <= 0.0 {
            return Ok(0.0);
        }
        if let (Some(party), Some(_)) = (&gains_party, purchase_price)
            && current > 0.0
        {
            let fraction = (taken / current).min(1.0);
            let basis = state.cost_basis.get(name).copied().unwrap_or(0.0);
            let used = basis * fraction;
            state.cost_basis.insert(name.to_string(), basis - used);
            state.pools.accrue_gain(party, taken - used);
        }
        state.record(
            name,
            date,
            current - taken,
            EvalSource::Mover(mover.to_string()),
        );
    }

    // Withdrawals from a crystallized pot are income for its liable party.
    if role == PensionRole::CrystallizedTaxable
        && let Some(party) = &income_party
    {
        state.pools.accrue_income(party, taken);
    }

    Ok(taken)
}

/// Add value to an item. Credits arriving before the item has started are
/// folded into its eventual seed value.
fn credit_to(
    state: &mut SimulationState,
    name: &str,
    amount: f64,
    date: Date,
    mover: &str,
) -> Result<(), EvaluationError> {
    if amount <= 0.0 {
        return Ok(());
    }
    if !state.started(name) {
        *state.accrued_before_start.entry(name.to_string()).or_insert(0.0) += amount;
        return Ok(());
    }

    let item = state.item(name).expect("validated at load");
    let price_setting = item.price_setting().map(str::to_string);
    let current = state.current(name).unwrap_or(0.0);

    if let Some(setting) = price_setting {
        let price = state.resolver.resolve(&setting, date)?;
        if price > 0.0 {
            let held = state.units(name);
            let bought = amount / price;
            state.quantities.insert(name.to_string(), held + bought);
            state.record(
                name,
                date,
                (held + bought) * price,
                EvalSource::Mover(mover.to_string()),
            );
            return Ok(());
        }
    }

    state.record(
        name,
        date,
        current + amount,
        EvalSource::Mover(mover.to_string()),
    );
    Ok(())
}

/// Deduct active pension contributions from an income payment, crediting the
/// receiving pot or DB accrual. Returns the total deducted from delivery.
pub fn pension_deductions(
    state: &mut SimulationState,
    income_name: &str,
    gross: f64,
    date: Date,
) -> Result<f64, EvaluationError> {
    let schemes: Vec<(String, String, f64, f64)> = state
        .transactions
        .iter()
        .filter(|tx| tx.active_at(date))
        .filter_map(|tx| match &tx.kind {
            RuntimeKind::PensionContribution {
                from,
                to,
                rate,
                boost,
                ..
            } if from == income_name => {
                Some((tx.name.clone(), to.clone(), *rate, *boost))
            }
            _ => None,
        })
        .collect();

    let mut total = 0.0;
    for (tx_name, to, rate, boost) in schemes {
        let contribution = rate * gross;
        if contribution <= 0.0 {
            continue;
        }
        total += contribution;
        let credit = boost * contribution;
        if state.started(&to) {
            let current = state.current(&to).unwrap_or(0.0);
            state.record(&to, date, current + credit, EvalSource::Mover(tx_name));
        } else {
            *state
                .accrued_before_start
                .entry(to.clone())
                .or_insert(0.0) += credit;
        }
    }
    Ok(total)
}
