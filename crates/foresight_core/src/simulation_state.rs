//! Runtime state for one evaluation run.
//!
//! [`SimulationState::from_model`] lowers the declarative model into runtime
//! items and transactions, resolving triggers, expanding categories and
//! rejecting invalid kind/target combinations up front. The state then owns
//! the only mutable data of a run: the current-value snapshot map, quantity
//! counters, liability pools and the growing evaluation ledger. The snapshot
//! map is updated as each evaluation is appended, so later same-date steps
//! observe earlier updates.

use jiff::civil::Date;
use rustc_hash::FxHashMap;

use crate::error::{EvaluationError, ModelError, SettingError};
use crate::model::{
    Asset, CASH_NAME, EvalSource, Evaluation, Expense, Income, LiabilityKind, LiabilityTag, Model,
    PensionRole, RateSpec, Recurrence, RevalueTarget, SETTING_CPI, SETTING_VIEW_END,
    SETTING_VIEW_START, TargetSpec, TaxBands, Transaction, TransactionKind, TransferSide,
    ValueSpec,
};
use crate::settings::SettingsResolver;
use crate::tax::LiabilityPools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemClass {
    Asset,
    Income,
    Expense,
}

/// A model item lowered for the walk: dates resolved, role tags attached.
#[derive(Debug, Clone)]
pub struct RuntimeItem {
    pub name: String,
    pub class: ItemClass,
    pub category: String,
    pub start: Date,
    pub end: Option<Date>,
    pub value: ValueSpec,
    pub growth: RateSpec,
    pub cpi_immune: bool,
    pub can_be_negative: bool,
    pub is_debt: bool,
    pub initial_quantity: Option<f64>,
    pub purchase_price: Option<f64>,
    pub liabilities: Vec<LiabilityTag>,
    pub role: PensionRole,
    pub is_rsu: bool,
}

impl RuntimeItem {
    pub fn allows_negative(&self) -> bool {
        self.can_be_negative || self.is_debt
    }

    /// Unit-priced holdings pair a quantity with a price setting; they never
    /// compound growth themselves.
    pub fn is_unit_priced(&self) -> bool {
        self.initial_quantity.is_some() && matches!(self.value, ValueSpec::Setting(_))
    }

    pub fn price_setting(&self) -> Option<&str> {
        match &self.value {
            ValueSpec::Setting(name) if self.initial_quantity.is_some() => Some(name),
            _ => None,
        }
    }

    pub fn tag(&self, kind: LiabilityKind) -> Option<&LiabilityTag> {
        self.liabilities.iter().find(|t| t.kind == kind)
    }
}

/// A transfer side with its target list already expanded, in declared order.
#[derive(Debug, Clone)]
pub struct RuntimeSide {
    pub names: Vec<String>,
    pub value: f64,
    pub absolute: bool,
}

#[derive(Debug, Clone)]
pub enum RuntimeKind {
    Transfer {
        from: Option<RuntimeSide>,
        to: Option<RuntimeSide>,
    },
    LiquidateConditional {
        sources: RuntimeSide,
        target: RuntimeSide,
    },
    PayOffDebt {
        from: RuntimeSide,
        to: RuntimeSide,
    },
    PensionContribution {
        from: String,
        to: String,
        rate: f64,
        boost: f64,
        defined_benefit: bool,
    },
    Revalue {
        target: RevalueTarget,
        names: Vec<String>,
        value: f64,
        absolute: bool,
    },
    Crystallize {
        from: String,
        to: String,
        value: f64,
        absolute: bool,
    },
    MoveTaxFreePart {
        from: String,
        to: String,
        fraction: f64,
    },
    PensionTransfer {
        from: String,
        to: String,
        value: f64,
        absolute: bool,
    },
}

#[derive(Debug, Clone)]
pub struct RuntimeTransaction {
    pub name: String,
    pub decl: usize,
    pub first: Date,
    pub stop: Option<Date>,
    pub recurrence: Option<Recurrence>,
    pub kind: RuntimeKind,
}

impl RuntimeTransaction {
    /// Whether the transaction window covers `date` (stop date exclusive for
    /// continuously-applied kinds such as pension contributions).
    pub fn active_at(&self, date: Date) -> bool {
        self.first <= date && self.stop.is_none_or(|s| date < s)
    }

    /// Occurrence dates: `first`, then recurrence steps through the stop date
    /// inclusive or the window end.
    pub fn occurrences(&self, through: Date) -> Vec<Date> {
        let limit = match self.stop {
            Some(stop) => stop.min(through),
            None => through,
        };
        if self.first > limit {
            return Vec::new();
        }
        match self.recurrence {
            None => vec![self.first],
            Some(rec) => {
                let step = rec.months();
                let mut out = Vec::new();
                let mut k = 0;
                loop {
                    let date = crate::date_math::add_months(self.first, k * step);
                    if date > limit {
                        break;
                    }
                    out.push(date);
                    k += 1;
                }
                out
            }
        }
    }
}

/// All mutable state of one run plus the lowered model.
#[derive(Debug, Clone)]
pub struct SimulationState {
    pub window_start: Date,
    pub window_end: Date,
    pub cpi: f64,
    pub resolver: SettingsResolver,
    pub triggers: FxHashMap<String, Date>,
    pub bands: TaxBands,
    pub items: Vec<RuntimeItem>,
    pub item_index: FxHashMap<String, usize>,
    pub transactions: Vec<RuntimeTransaction>,

    /// Current value per item, seeded at start and updated with every
    /// evaluation appended.
    pub values: FxHashMap<String, f64>,
    /// Remaining units per unit-priced holding.
    pub quantities: FxHashMap<String, f64>,
    /// Remaining acquisition cost per item, consumed pro rata on disposal.
    pub cost_basis: FxHashMap<String, f64>,
    /// Absolute revaluations arriving before an item has started.
    pub seed_override: FxHashMap<String, f64>,
    /// Proportional revaluations arriving before an item has started.
    pub seed_scale: FxHashMap<String, f64>,
    /// Pension credits accrued before the receiving pot or DB income starts.
    pub accrued_before_start: FxHashMap<String, f64>,
    pub pools: LiabilityPools,
    pub evaluations: Vec<Evaluation>,
}

impl SimulationState {
    pub fn from_model(model: &Model) -> Result<Self, EvaluationError> {
        let resolver = SettingsResolver::from_settings(&model.settings)?;

        let mut triggers = FxHashMap::default();
        for trigger in &model.triggers {
            if triggers.insert(trigger.name.clone(), trigger.date).is_some() {
                return Err(ModelError::DuplicateName(trigger.name.clone()).into());
            }
        }

        let window_start = resolver.resolve_date(SETTING_VIEW_START)?;
        let window_end = resolver.resolve_date(SETTING_VIEW_END)?;

        let cpi = if resolver.contains(SETTING_CPI) {
            resolver.resolve(SETTING_CPI, window_start)?
        } else {
            tracing::warn!("model has no {SETTING_CPI} setting, assuming 0");
            0.0
        };

        let (items, item_index) = lower_items(model, &triggers)?;
        if !item_index.contains_key(CASH_NAME) {
            return Err(ModelError::MissingCashItem.into());
        }

        let transactions = lower_transactions(model, &items, &item_index, &triggers, &resolver)?;

        Ok(Self {
            window_start,
            window_end,
            cpi,
            resolver,
            triggers,
            bands: model.tax_bands.clone(),
            items,
            item_index,
            transactions,
            values: FxHashMap::default(),
            quantities: FxHashMap::default(),
            cost_basis: FxHashMap::default(),
            seed_override: FxHashMap::default(),
            seed_scale: FxHashMap::default(),
            accrued_before_start: FxHashMap::default(),
            pools: LiabilityPools::default(),
            evaluations: Vec::new(),
        })
    }

    pub fn item(&self, name: &str) -> Option<&RuntimeItem> {
        self.item_index.get(name).map(|&i| &self.items[i])
    }

    /// Current snapshot value; `None` until the item has been seeded.
    pub fn current(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn started(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn units(&self, name: &str) -> f64 {
        self.quantities.get(name).copied().unwrap_or(0.0)
    }

    pub fn unit_price(&self, item: &RuntimeItem, date: Date) -> Result<f64, SettingError> {
        match item.price_setting() {
            Some(setting) => self.resolver.resolve(setting, date),
            None => Ok(0.0),
        }
    }

    /// Append an evaluation and update the snapshot so later same-date steps
    /// see the new value.
    pub fn record(&mut self, name: &str, date: Date, value: f64, source: EvalSource) {
        self.values.insert(name.to_string(), value);
        self.evaluations
            .push(Evaluation::new(name, date, value, source));
    }

    /// Append a tax-settlement entry under a synthetic (non-item) name.
    pub fn record_tax_entry(&mut self, name: String, date: Date, value: f64) {
        self.evaluations
            .push(Evaluation::new(name, date, value, EvalSource::Tax));
    }

    /// Move the cash item by `delta` and record the update.
    pub fn adjust_cash(&mut self, date: Date, delta: f64, source: EvalSource) {
        let current = self.current(CASH_NAME).unwrap_or(0.0);
        let cash = &self.items[self.item_index[CASH_NAME]];
        let mut next = current + delta;
        if next < 0.0 && !cash.allows_negative() {
            tracing::warn!(
                date = %date,
                shortfall = -next,
                "cash cannot go negative, clamping to zero"
            );
            next = 0.0;
        }
        self.record(CASH_NAME, date, next, source);
    }
}

fn lower_items(
    model: &Model,
    triggers: &FxHashMap<String, Date>,
) -> Result<(Vec<RuntimeItem>, FxHashMap<String, usize>), EvaluationError> {
    let mut items = Vec::new();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();

    let mut push = |item: RuntimeItem, index: &mut FxHashMap<String, usize>| {
        if index.contains_key(&item.name) {
            return Err(EvaluationError::from(ModelError::DuplicateName(
                item.name.clone(),
            )));
        }
        index.insert(item.name.clone(), items.len());
        items.push(item);
        Ok(())
    };

    for asset in &model.assets {
        push(lower_asset(asset, triggers)?, &mut index)?;
    }
    for income in &model.incomes {
        push(lower_income(income, triggers)?, &mut index)?;
    }
    for expense in &model.expenses {
        push(lower_expense(expense, triggers)?, &mut index)?;
    }

    Ok((items, index))
}

fn lower_asset(asset: &Asset, triggers: &FxHashMap<String, Date>) -> Result<RuntimeItem, EvaluationError> {
    let item = RuntimeItem {
        name: asset.name.clone(),
        class: ItemClass::Asset,
        category: asset.category.clone(),
        start: asset.start.resolve(triggers)?,
        end: None,
        value: asset.value.clone(),
        growth: asset.growth.clone(),
        cpi_immune: asset.cpi_immune,
        can_be_negative: asset.can_be_negative,
        is_debt: asset.is_debt,
        initial_quantity: asset.quantity,
        purchase_price: asset.purchase_price,
        liabilities: asset.liabilities.clone(),
        role: asset.role(),
        is_rsu: asset.is_rsu(),
    };
    if item.is_rsu
        && (!item.is_unit_priced() || item.tag(LiabilityKind::IncomeTax).is_none())
    {
        return Err(ModelError::MalformedRsu {
            asset: item.name.clone(),
        }
        .into());
    }
    Ok(item)
}

fn lower_income(
    income: &Income,
    triggers: &FxHashMap<String, Date>,
) -> Result<RuntimeItem, EvaluationError> {
    Ok(RuntimeItem {
        name: income.name.clone(),
        class: ItemClass::Income,
        category: income.category.clone(),
        start: income.start.resolve(triggers)?,
        end: income
            .end
            .as_ref()
            .map(|e| e.resolve(triggers))
            .transpose()?,
        value: income.value.clone(),
        growth: income.growth.clone(),
        cpi_immune: income.cpi_immune,
        can_be_negative: false,
        is_debt: false,
        initial_quantity: None,
        purchase_price: None,
        liabilities: income.liabilities.clone(),
        role: income.role(),
        is_rsu: false,
    })
}

fn lower_expense(
    expense: &Expense,
    triggers: &FxHashMap<String, Date>,
) -> Result<RuntimeItem, EvaluationError> {
    Ok(RuntimeItem {
        name: expense.name.clone(),
        class: ItemClass::Expense,
        category: expense.category.clone(),
        start: expense.start.resolve(triggers)?,
        end: expense
            .end
            .as_ref()
            .map(|e| e.resolve(triggers))
            .transpose()?,
        value: expense.value.clone(),
        growth: expense.growth.clone(),
        cpi_immune: expense.cpi_immune,
        can_be_negative: false,
        is_debt: false,
        initial_quantity: None,
        purchase_price: None,
        liabilities: Vec::new(),
        role: PensionRole::None,
        is_rsu: false,
    })
}

/// Expand a target spec into item names, in declared order.
fn expand_targets(
    spec: &TargetSpec,
    transaction: &str,
    items: &[RuntimeItem],
    index: &FxHashMap<String, usize>,
) -> Result<Vec<String>, EvaluationError> {
    let names = match spec {
        TargetSpec::Item(name) => vec![name.clone()],
        TargetSpec::Items(names) => names.clone(),
        TargetSpec::Category(category) => items
            .iter()
            .filter(|i| i.category == *category)
            .map(|i| i.name.clone())
            .collect(),
    };
    if names.is_empty() {
        return Err(ModelError::EmptyTransferSide {
            transaction: transaction.to_string(),
        }
        .into());
    }
    for name in &names {
        if !index.contains_key(name) {
            return Err(ModelError::UnknownItem {
                transaction: transaction.to_string(),
                item: name.clone(),
            }
            .into());
        }
    }
    Ok(names)
}

fn lower_side(
    side: &TransferSide,
    transaction: &str,
    items: &[RuntimeItem],
    index: &FxHashMap<String, usize>,
) -> Result<RuntimeSide, EvaluationError> {
    Ok(RuntimeSide {
        names: expand_targets(&side.target, transaction, items, index)?,
        value: side.value,
        absolute: side.absolute,
    })
}

fn lower_transactions(
    model: &Model,
    items: &[RuntimeItem],
    index: &FxHashMap<String, usize>,
    triggers: &FxHashMap<String, Date>,
    resolver: &SettingsResolver,
) -> Result<Vec<RuntimeTransaction>, EvaluationError> {
    let mut seen = FxHashMap::default();
    let mut out = Vec::with_capacity(model.transactions.len());

    for (decl, tx) in model.transactions.iter().enumerate() {
        if seen.insert(tx.name.clone(), ()).is_some() {
            return Err(ModelError::DuplicateName(tx.name.clone()).into());
        }
        let kind = lower_kind(tx, items, index, resolver)?;
        out.push(RuntimeTransaction {
            name: tx.name.clone(),
            decl,
            first: tx.date.resolve(triggers)?,
            stop: tx
                .stop_date
                .as_ref()
                .map(|d| d.resolve(triggers))
                .transpose()?,
            recurrence: tx.recurrence,
            kind,
        });
    }
    Ok(out)
}

fn lower_kind(
    tx: &Transaction,
    items: &[RuntimeItem],
    index: &FxHashMap<String, usize>,
    resolver: &SettingsResolver,
) -> Result<RuntimeKind, EvaluationError> {
    let item = |name: &str| -> Result<&RuntimeItem, EvaluationError> {
        index
            .get(name)
            .map(|&i| &items[i])
            .ok_or_else(|| {
                ModelError::UnknownItem {
                    transaction: tx.name.clone(),
                    item: name.to_string(),
                }
                .into()
            })
    };

    match &tx.kind {
        TransactionKind::Transfer { from, to } => Ok(RuntimeKind::Transfer {
            from: from
                .as_ref()
                .map(|s| lower_side(s, &tx.name, items, index))
                .transpose()?,
            to: to
                .as_ref()
                .map(|s| lower_side(s, &tx.name, items, index))
                .transpose()?,
        }),

        TransactionKind::LiquidateConditional { sources, target } => {
            Ok(RuntimeKind::LiquidateConditional {
                sources: lower_side(sources, &tx.name, items, index)?,
                target: lower_side(target, &tx.name, items, index)?,
            })
        }

        TransactionKind::PayOffDebt { from, to } => {
            let from = lower_side(from, &tx.name, items, index)?;
            let to = lower_side(to, &tx.name, items, index)?;
            let debt = item(&to.names[0])?;
            if !debt.is_debt {
                return Err(ModelError::NotADebt {
                    transaction: tx.name.clone(),
                    target: debt.name.clone(),
                }
                .into());
            }
            Ok(RuntimeKind::PayOffDebt { from, to })
        }

        TransactionKind::PensionContribution {
            from,
            to,
            rate,
            boost,
        } => {
            let source = item(from)?;
            if source.class != ItemClass::Income {
                return Err(ModelError::PensionSourceNotIncome {
                    transaction: tx.name.clone(),
                    source: from.clone(),
                }
                .into());
            }
            let dest = item(to)?;
            let defined_benefit = match (dest.class, dest.role) {
                (ItemClass::Asset, PensionRole::DcPot) => false,
                (ItemClass::Income, PensionRole::DbAccrual) => true,
                _ => {
                    return Err(ModelError::PensionTargetRole {
                        transaction: tx.name.clone(),
                        target: to.clone(),
                    }
                    .into());
                }
            };
            Ok(RuntimeKind::PensionContribution {
                from: from.clone(),
                to: to.clone(),
                rate: *rate,
                boost: *boost,
                defined_benefit,
            })
        }

        TransactionKind::Revalue {
            target,
            names,
            value,
            absolute,
        } => {
            let expanded = match target {
                RevalueTarget::Setting => {
                    let names = match names {
                        TargetSpec::Item(name) => vec![name.clone()],
                        TargetSpec::Items(list) => list.clone(),
                        TargetSpec::Category(_) => Vec::new(),
                    };
                    if names.is_empty() {
                        return Err(ModelError::EmptyTransferSide {
                            transaction: tx.name.clone(),
                        }
                        .into());
                    }
                    for name in &names {
                        if !resolver.contains(name) {
                            return Err(
                                SettingError::UnknownSetting(name.clone()).into()
                            );
                        }
                    }
                    names
                }
                _ => {
                    let names = expand_targets(names, &tx.name, items, index)?;
                    let wanted = match target {
                        RevalueTarget::Asset => ItemClass::Asset,
                        RevalueTarget::Income => ItemClass::Income,
                        RevalueTarget::Expense => ItemClass::Expense,
                        RevalueTarget::Setting => unreachable!(),
                    };
                    for name in &names {
                        if item(name)?.class != wanted {
                            return Err(ModelError::UnknownItem {
                                transaction: tx.name.clone(),
                                item: name.clone(),
                            }
                            .into());
                        }
                    }
                    names
                }
            };
            Ok(RuntimeKind::Revalue {
                target: *target,
                names: expanded,
                value: *value,
                absolute: *absolute,
            })
        }

        TransactionKind::Crystallize {
            from,
            to,
            value,
            absolute,
        } => {
            if item(from)?.role != PensionRole::DcPot {
                return Err(ModelError::PensionTargetRole {
                    transaction: tx.name.clone(),
                    target: from.clone(),
                }
                .into());
            }
            if item(to)?.role != PensionRole::CrystallizedTaxable {
                return Err(ModelError::PensionTargetRole {
                    transaction: tx.name.clone(),
                    target: to.clone(),
                }
                .into());
            }
            Ok(RuntimeKind::Crystallize {
                from: from.clone(),
                to: to.clone(),
                value: *value,
                absolute: *absolute,
            })
        }

        TransactionKind::MoveTaxFreePart { from, to, fraction } => {
            if !item(from)?.role.is_pension_pot() {
                return Err(ModelError::PensionTargetRole {
                    transaction: tx.name.clone(),
                    target: from.clone(),
                }
                .into());
            }
            if item(to)?.role != PensionRole::TaxFreePot {
                return Err(ModelError::PensionTargetRole {
                    transaction: tx.name.clone(),
                    target: to.clone(),
                }
                .into());
            }
            Ok(RuntimeKind::MoveTaxFreePart {
                from: from.clone(),
                to: to.clone(),
                fraction: *fraction,
            })
        }

        TransactionKind::PensionTransfer {
            from,
            to,
            value,
            absolute,
        } => {
            for name in [from, to] {
                if !item(name)?.role.is_pension_pot() {
                    return Err(ModelError::PensionTargetRole {
                        transaction: tx.name.clone(),
                        target: name.clone(),
                    }
                    .into());
                }
            }
            Ok(RuntimeKind::PensionTransfer {
                from: from.clone(),
                to: to.clone(),
                value: *value,
                absolute: *absolute,
            })
        }
    }
}
