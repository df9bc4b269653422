//! Financial items: assets (including debts), incomes and expenses.
//!
//! Pension and equity-compensation semantics are encoded in item names and
//! categories; [`PensionRole`] resolves those conventions once at load time so
//! the engine branches on a tag instead of re-parsing names.

use serde::{Deserialize, Serialize};

use super::triggers::DateSpec;

/// The designated cash item. It evaluates first among same-date entries and
/// receives income / pays expenses and settled tax.
pub const CASH_NAME: &str = "Cash";

/// Category marking a unit-priced equity grant that vests to taxable income.
pub const RSU_CATEGORY: &str = "rsu";

/// Name prefix of a defined-contribution pension pot.
pub const PENSION_DC_PREFIX: &str = "-PEN ";
/// Name prefix of a defined-benefit accrual income.
pub const PENSION_DB_PREFIX: &str = "-PDB ";
/// Name prefix of a crystallized pot; withdrawals are taxed as income.
pub const PENSION_CRYSTALLIZED_PREFIX: &str = "-CPT ";
/// Name prefix of the tax-free part split out of a pot.
pub const PENSION_TAX_FREE_PREFIX: &str = "-TFP ";

/// An item's value: a plain amount or the value of a named setting.
///
/// Unit-priced holdings pair a `Setting` value (the unit price) with a
/// `quantity` on the asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueSpec {
    Amount(f64),
    Setting(String),
}

impl From<f64> for ValueSpec {
    fn from(v: f64) -> Self {
        ValueSpec::Amount(v)
    }
}

/// An annual growth rate: a plain percentage or a setting reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RateSpec {
    Rate(f64),
    Setting(String),
}

impl Default for RateSpec {
    fn default() -> Self {
        RateSpec::Rate(0.0)
    }
}

impl From<f64> for RateSpec {
    fn from(v: f64) -> Self {
        RateSpec::Rate(v)
    }
}

/// Which tax a liable amount pools into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiabilityKind {
    IncomeTax,
    NationalInsurance,
    CapitalGains,
}

/// A party + tax-kind pair, e.g. `Joe/incomeTax`. Amounts sharing one tag are
/// pooled before banding; distinct parties settle independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LiabilityTag {
    pub party: String,
    pub kind: LiabilityKind,
}

impl LiabilityTag {
    pub fn income_tax(party: impl Into<String>) -> Self {
        Self {
            party: party.into(),
            kind: LiabilityKind::IncomeTax,
        }
    }

    pub fn ni(party: impl Into<String>) -> Self {
        Self {
            party: party.into(),
            kind: LiabilityKind::NationalInsurance,
        }
    }

    pub fn capital_gains(party: impl Into<String>) -> Self {
        Self {
            party: party.into(),
            kind: LiabilityKind::CapitalGains,
        }
    }

    /// Parse the `party/kind` form: `Joe/incomeTax`, `Joe/NI`, `Joe/CGT`.
    pub fn parse(tag: &str) -> Option<Self> {
        let (party, kind) = tag.split_once('/')?;
        let kind = match kind.trim() {
            "incomeTax" => LiabilityKind::IncomeTax,
            "NI" => LiabilityKind::NationalInsurance,
            "CGT" => LiabilityKind::CapitalGains,
            _ => return None,
        };
        Some(Self {
            party: party.trim().to_string(),
            kind,
        })
    }
}

impl std::fmt::Display for LiabilityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            LiabilityKind::IncomeTax => "incomeTax",
            LiabilityKind::NationalInsurance => "NI",
            LiabilityKind::CapitalGains => "CGT",
        };
        write!(f, "{}/{}", self.party, kind)
    }
}

/// Role a name-convention gives an item, resolved once at model load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PensionRole {
    #[default]
    None,
    /// Defined-contribution pot (asset).
    DcPot,
    /// Defined-benefit accrual (income).
    DbAccrual,
    /// Crystallized pot: withdrawals taxed as income.
    CrystallizedTaxable,
    /// Tax-free part split out of a pot.
    TaxFreePot,
}

impl PensionRole {
    /// Resolve a role from an item name's prefix.
    pub fn from_name(name: &str) -> PensionRole {
        if name.starts_with(PENSION_DC_PREFIX) {
            PensionRole::DcPot
        } else if name.starts_with(PENSION_DB_PREFIX) {
            PensionRole::DbAccrual
        } else if name.starts_with(PENSION_CRYSTALLIZED_PREFIX) {
            PensionRole::CrystallizedTaxable
        } else if name.starts_with(PENSION_TAX_FREE_PREFIX) {
            PensionRole::TaxFreePot
        } else {
            PensionRole::None
        }
    }

    pub fn is_pension_pot(self) -> bool {
        matches!(
            self,
            PensionRole::DcPot | PensionRole::CrystallizedTaxable | PensionRole::TaxFreePot
        )
    }
}

/// An asset or, with `is_debt`, a debt. Debts carry negative values; interest
/// compounds them more negative through the same growth path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    pub category: String,
    pub start: DateSpec,
    pub value: ValueSpec,
    /// Unit count for holdings priced via a setting.
    pub quantity: Option<f64>,
    pub growth: RateSpec,
    pub cpi_immune: bool,
    pub can_be_negative: bool,
    pub is_debt: bool,
    /// Acquisition cost, for capital-gain calculation on disposal.
    pub purchase_price: Option<f64>,
    pub liabilities: Vec<LiabilityTag>,
}

impl Asset {
    pub fn new(name: impl Into<String>, start: impl Into<DateSpec>, value: impl Into<ValueSpec>) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
            start: start.into(),
            value: value.into(),
            quantity: None,
            growth: RateSpec::default(),
            cpi_immune: false,
            can_be_negative: false,
            is_debt: false,
            purchase_price: None,
            liabilities: Vec::new(),
        }
    }

    /// The designated cash item; may go negative so shortfalls are visible.
    pub fn cash(start: impl Into<DateSpec>, value: f64) -> Self {
        let mut asset = Self::new(CASH_NAME, start, value);
        asset.can_be_negative = true;
        asset
    }

    pub fn debt(name: impl Into<String>, start: impl Into<DateSpec>, owed: f64) -> Self {
        let mut asset = Self::new(name, start, -owed.abs());
        asset.is_debt = true;
        asset.can_be_negative = true;
        asset
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_growth(mut self, growth: impl Into<RateSpec>) -> Self {
        self.growth = growth.into();
        self
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_purchase_price(mut self, price: f64) -> Self {
        self.purchase_price = Some(price);
        self
    }

    pub fn with_liability(mut self, tag: LiabilityTag) -> Self {
        self.liabilities.push(tag);
        self
    }

    pub fn cpi_immune(mut self) -> Self {
        self.cpi_immune = true;
        self
    }

    pub fn can_be_negative(mut self) -> Self {
        self.can_be_negative = true;
        self
    }

    pub fn role(&self) -> PensionRole {
        PensionRole::from_name(&self.name)
    }

    pub fn is_rsu(&self) -> bool {
        self.category.eq_ignore_ascii_case(RSU_CATEGORY)
    }
}

/// A recurring monthly income, delivered to cash until `end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Income {
    pub name: String,
    pub category: String,
    pub start: DateSpec,
    pub end: Option<DateSpec>,
    pub value: ValueSpec,
    pub growth: RateSpec,
    pub cpi_immune: bool,
    pub liabilities: Vec<LiabilityTag>,
}

impl Income {
    pub fn new(name: impl Into<String>, start: impl Into<DateSpec>, value: impl Into<ValueSpec>) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
            start: start.into(),
            end: None,
            value: value.into(),
            growth: RateSpec::default(),
            cpi_immune: false,
            liabilities: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_end(mut self, end: impl Into<DateSpec>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn with_growth(mut self, growth: impl Into<RateSpec>) -> Self {
        self.growth = growth.into();
        self
    }

    pub fn with_liability(mut self, tag: LiabilityTag) -> Self {
        self.liabilities.push(tag);
        self
    }

    pub fn cpi_immune(mut self) -> Self {
        self.cpi_immune = true;
        self
    }

    pub fn role(&self) -> PensionRole {
        PensionRole::from_name(&self.name)
    }
}

/// A recurring monthly expense, paid from cash until `end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub name: String,
    pub category: String,
    pub start: DateSpec,
    pub end: Option<DateSpec>,
    pub value: ValueSpec,
    pub growth: RateSpec,
    pub cpi_immune: bool,
}

impl Expense {
    pub fn new(name: impl Into<String>, start: impl Into<DateSpec>, value: impl Into<ValueSpec>) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
            start: start.into(),
            end: None,
            value: value.into(),
            growth: RateSpec::default(),
            cpi_immune: false,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_end(mut self, end: impl Into<DateSpec>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn with_growth(mut self, growth: impl Into<RateSpec>) -> Self {
        self.growth = growth.into();
        self
    }

    pub fn cpi_immune(mut self) -> Self {
        self.cpi_immune = true;
        self
    }
}
