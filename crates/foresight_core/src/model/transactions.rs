//! Scheduled transactions.
//!
//! Each kind is a variant carrying only its needed fields, dispatched through
//! one exhaustive match in the processor, so an invalid kind/target
//! combination is a load-time error rather than a silent empty ledger.

use serde::{Deserialize, Serialize};

use super::triggers::DateSpec;

/// One item, an ordered list of items, or a category expanded to its members
/// in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TargetSpec {
    Item(String),
    Items(Vec<String>),
    Category(String),
}

impl TargetSpec {
    pub fn item(name: impl Into<String>) -> Self {
        TargetSpec::Item(name.into())
    }

    pub fn category(name: impl Into<String>) -> Self {
        TargetSpec::Category(name.into())
    }
}

impl From<&str> for TargetSpec {
    fn from(name: &str) -> Self {
        TargetSpec::Item(name.to_string())
    }
}

/// One side of a transfer: who, how much, and whether the amount is absolute
/// or a fraction of the side's current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSide {
    pub target: TargetSpec,
    pub value: f64,
    pub absolute: bool,
}

impl TransferSide {
    pub fn absolute(target: impl Into<TargetSpec>, value: f64) -> Self {
        Self {
            target: target.into(),
            value,
            absolute: true,
        }
    }

    pub fn proportional(target: impl Into<TargetSpec>, fraction: f64) -> Self {
        Self {
            target: target.into(),
            value: fraction,
            absolute: false,
        }
    }
}

/// Recurrence period: `<N><unit>`, unit `m` (months) or `y` (years).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub count: u32,
    pub unit: RecurrenceUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceUnit {
    Months,
    Years,
}

impl Recurrence {
    pub fn monthly() -> Self {
        Self {
            count: 1,
            unit: RecurrenceUnit::Months,
        }
    }

    pub fn yearly() -> Self {
        Self {
            count: 1,
            unit: RecurrenceUnit::Years,
        }
    }

    /// Parse a period token such as `"1m"`, `"6m"`, `"2y"`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        let unit = match token.chars().last()? {
            'm' => RecurrenceUnit::Months,
            'y' => RecurrenceUnit::Years,
            _ => return None,
        };
        let count: u32 = token[..token.len() - 1].parse().ok()?;
        if count == 0 {
            return None;
        }
        Some(Self { count, unit })
    }

    /// The recurrence step in whole months.
    pub fn months(&self) -> i32 {
        match self.unit {
            RecurrenceUnit::Months => self.count as i32,
            RecurrenceUnit::Years => self.count as i32 * 12,
        }
    }
}

/// What a revalue transaction retargets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevalueTarget {
    Asset,
    Setting,
    Income,
    Expense,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Move value between items; either side may be absent for pure
    /// injections or pure spends.
    Transfer {
        from: Option<TransferSide>,
        to: Option<TransferSide>,
    },

    /// Fires only while the target's running value is negative; draws from
    /// sources in declared order until the shortfall is met. The target
    /// side's `value` below 1 models friction on the receiving side.
    LiquidateConditional {
        sources: TransferSide,
        target: TransferSide,
    },

    /// Pay a cash-like source into a debt while the debt is negative. A
    /// single payment may overshoot zero.
    PayOffDebt {
        from: TransferSide,
        to: TransferSide,
    },

    /// Autogenerated from a pension scheme: deducts `rate` of the named
    /// income at each payment and credits `boost` times the deduction to a
    /// DC pot or DB accrual income.
    PensionContribution {
        from: String,
        to: String,
        rate: f64,
        boost: f64,
    },

    /// Set (absolute) or scale (proportional) the named items or settings.
    Revalue {
        target: RevalueTarget,
        names: TargetSpec,
        value: f64,
        absolute: bool,
    },

    /// Move value from an uncrystallized DC pot into a crystallized pot
    /// whose withdrawals are taxed as income.
    Crystallize {
        from: String,
        to: String,
        value: f64,
        absolute: bool,
    },

    /// Split a fraction of a pot into its tax-free part.
    MoveTaxFreePart {
        from: String,
        to: String,
        fraction: f64,
    },

    /// Move value between pension pots without changing phase.
    PensionTransfer {
        from: String,
        to: String,
        value: f64,
        absolute: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub name: String,
    pub category: String,
    pub date: DateSpec,
    pub stop_date: Option<DateSpec>,
    pub recurrence: Option<Recurrence>,
    pub kind: TransactionKind,
}

impl Transaction {
    pub fn new(name: impl Into<String>, date: impl Into<DateSpec>, kind: TransactionKind) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
            date: date.into(),
            stop_date: None,
            recurrence: None,
            kind,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_stop(mut self, stop: impl Into<DateSpec>) -> Self {
        self.stop_date = Some(stop.into());
        self
    }

    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = Some(recurrence);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recurrence_parse() {
        assert_eq!(Recurrence::parse("1m"), Some(Recurrence::monthly()));
        assert_eq!(Recurrence::parse("1y"), Some(Recurrence::yearly()));
        assert_eq!(
            Recurrence::parse("6m"),
            Some(Recurrence {
                count: 6,
                unit: RecurrenceUnit::Months
            })
        );
        assert_eq!(Recurrence::parse("0m"), None);
        assert_eq!(Recurrence::parse("m"), None);
        assert_eq!(Recurrence::parse("3w"), None);
        assert_eq!(Recurrence::parse(""), None);
    }

    #[test]
    fn test_recurrence_months() {
        assert_eq!(Recurrence::parse("3m").unwrap().months(), 3);
        assert_eq!(Recurrence::parse("2y").unwrap().months(), 24);
    }
}
