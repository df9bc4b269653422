//! Tax settlement.
//!
//! Liable amounts pool per (party × liability kind) through the tax year and
//! are settled at each 6 April boundary: banded tax is computed, a tax entry
//! and a net entry are appended to the ledger, and the due amount is deducted
//! from the cash item. RSU withholding sells grant units instead of drawing
//! cash for the part of the bill attributable to vested value.

use jiff::civil::Date;
use rustc_hash::FxHashMap;

use crate::model::{EvalSource, LiabilityKind, TaxBand, TaxBands};
use crate::simulation_state::SimulationState;

/// Progressive tax over ascending bands: each band's rate applies to the
/// slice between its threshold and the next band's threshold.
pub fn banded_tax(amount: f64, bands: &[TaxBand]) -> f64 {
    if amount <= 0.0 || bands.is_empty() {
        return 0.0;
    }
    let mut tax = 0.0;
    for (i, band) in bands.iter().enumerate() {
        if amount <= band.threshold {
            break;
        }
        let upper = bands
            .get(i + 1)
            .map(|b| b.threshold)
            .unwrap_or(f64::INFINITY);
        tax += (amount.min(upper) - band.threshold) * band.rate;
    }
    tax
}

/// Personal allowance after high-income tapering, floored at zero.
pub fn tapered_allowance(gross_income: f64, bands: &TaxBands) -> f64 {
    let over = (gross_income - bands.allowance_taper_threshold).max(0.0);
    (bands.personal_allowance - over * bands.allowance_taper_rate).max(0.0)
}

/// Income tax due on a year's pooled gross income.
pub fn income_tax_due(gross_income: f64, bands: &TaxBands) -> f64 {
    let taxable = (gross_income - tapered_allowance(gross_income, bands)).max(0.0);
    banded_tax(taxable, &bands.income_bands)
}

/// National Insurance due on a year's pooled gross income.
pub fn ni_due(gross_income: f64, bands: &TaxBands) -> f64 {
    banded_tax(gross_income, &bands.ni_bands)
}

/// Capital gains tax due on a year's pooled net gains.
pub fn cgt_due(gains: f64, bands: &TaxBands) -> f64 {
    (gains.max(0.0) - bands.cgt_allowance).max(0.0) * bands.cgt_rate
}

/// One party's income pool for the year. `vested` is the part delivered as
/// vested equity value, covered by selling units at settlement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IncomePool {
    pub taxable: f64,
    pub vested: f64,
}

/// Per-party, per-kind accumulators, reset at each tax-year boundary.
#[derive(Debug, Clone, Default)]
pub struct LiabilityPools {
    income: FxHashMap<String, IncomePool>,
    ni: FxHashMap<String, f64>,
    gains: FxHashMap<String, f64>,
}

impl LiabilityPools {
    pub fn accrue_income(&mut self, party: &str, amount: f64) {
        self.income.entry(party.to_string()).or_default().taxable += amount;
    }

    /// Vested equity value: taxable now, withheld by selling units later.
    pub fn accrue_vested(&mut self, party: &str, amount: f64) {
        let pool = self.income.entry(party.to_string()).or_default();
        pool.taxable += amount;
        pool.vested += amount;
    }

    pub fn accrue_ni(&mut self, party: &str, amount: f64) {
        *self.ni.entry(party.to_string()).or_default() += amount;
    }

    pub fn accrue_gain(&mut self, party: &str, amount: f64) {
        *self.gains.entry(party.to_string()).or_default() += amount;
    }

    pub fn income(&self, party: &str) -> IncomePool {
        self.income.get(party).copied().unwrap_or_default()
    }

    /// Parties with any activity this year, sorted for a deterministic ledger.
    fn parties(&self) -> Vec<String> {
        let mut parties: Vec<String> = self
            .income
            .keys()
            .chain(self.ni.keys())
            .chain(self.gains.keys())
            .cloned()
            .collect();
        parties.sort();
        parties.dedup();
        parties
    }

    fn take(&mut self, party: &str) -> (IncomePool, f64, f64) {
        (
            self.income.remove(party).unwrap_or_default(),
            self.ni.remove(party).unwrap_or(0.0),
            self.gains.remove(party).unwrap_or(0.0),
        )
    }
}

/// Settle every party's pools at a tax-year boundary.
pub fn settle_tax_year(state: &mut SimulationState, date: Date) {
    let parties = state.pools.parties();
    for party in parties {
        let (income, ni_gross, gains) = state.pools.take(&party);
        settle_income_tax(state, date, &party, income);
        settle_ni(state, date, &party, ni_gross);
        settle_cgt(state, date, &party, gains);
    }
}

fn settle_income_tax(state: &mut SimulationState, date: Date, party: &str, pool: IncomePool) {
    if pool.taxable <= 0.0 {
        return;
    }
    let tax = income_tax_due(pool.taxable, &state.bands);
    if tax > 0.0 {
        // The slice of the bill attributable to vested equity is withheld by
        // selling units; the rest is drawn from cash.
        let vested_tax =
            (tax - income_tax_due(pool.taxable - pool.vested, &state.bands)).max(0.0);
        let uncovered = sell_units_to_cover(state, date, party, vested_tax);
        let cash_tax = tax - vested_tax + uncovered;
        if cash_tax > 0.0 {
            state.adjust_cash(date, -cash_tax, EvalSource::Tax);
        }
        state.record_tax_entry(format!("{party} income tax"), date, tax);
    }
    state.record_tax_entry(format!("{party} income net"), date, pool.taxable - tax);
}

fn settle_ni(state: &mut SimulationState, date: Date, party: &str, gross: f64) {
    if gross <= 0.0 {
        return;
    }
    let tax = ni_due(gross, &state.bands);
    if tax > 0.0 {
        state.adjust_cash(date, -tax, EvalSource::Tax);
        state.record_tax_entry(format!("{party} NI"), date, tax);
    }
}

fn settle_cgt(state: &mut SimulationState, date: Date, party: &str, gains: f64) {
    if gains <= 0.0 {
        return;
    }
    let tax = cgt_due(gains, &state.bands);
    if tax > 0.0 {
        state.adjust_cash(date, -tax, EvalSource::Tax);
        state.record_tax_entry(format!("{party} CGT"), date, tax);
    }
    state.record_tax_entry(format!("{party} gains net"), date, gains - tax);
}

/// Sell units across the party's started RSU grants, in declaration order, to
/// cover `due`. Returns the uncovered remainder (drawn from cash instead).
fn sell_units_to_cover(state: &mut SimulationState, date: Date, party: &str, due: f64) -> f64 {
    if due <= 0.0 {
        return 0.0;
    }
    let mut remaining = due;

    let grants: Vec<usize> = (0..state.items.len())
        .filter(|&i| {
            let item = &state.items[i];
            item.is_rsu
                && item.start <= date
                && item
                    .tag(LiabilityKind::IncomeTax)
                    .is_some_and(|t| t.party == party)
        })
        .collect();

    for i in grants {
        if remaining <= 0.0 {
            break;
        }
        let (name, price) = {
            let item = &state.items[i];
            let price = match state.unit_price(item, date) {
                Ok(p) => p,
                Err(_) => continue,
            };
            (item.name.clone(), price)
        };
        if price <= 0.0 {
            continue;
        }
        let held = state.units(&name);
        if held <= 0.0 {
            continue;
        }
        let sold = (remaining / price).min(held);
        state.quantities.insert(name.clone(), held - sold);
        remaining -= sold * price;
        let value = (held - sold) * price;
        state.record(&name, date, value, EvalSource::Tax);
    }

    if remaining > 0.0 {
        tracing::warn!(
            party,
            uncovered = remaining,
            "vested grants exhausted, drawing remaining withholding from cash"
        );
    }
    remaining.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_banded_tax_single_band() {
        let bands = [TaxBand::new(0.0, 0.20)];
        assert_relative_eq!(banded_tax(10_000.0, &bands), 2_000.0);
        assert_eq!(banded_tax(0.0, &bands), 0.0);
        assert_eq!(banded_tax(-5.0, &bands), 0.0);
    }

    #[test]
    fn test_banded_tax_spans_bands() {
        let bands = TaxBands::default();
        // 37,600 taxable: 37,500 at 20% + 100 at 40%
        assert_relative_eq!(banded_tax(37_600.0, &bands.income_bands), 7_540.0);
    }

    #[test]
    fn test_income_tax_scenario_50100() {
        let bands = TaxBands::default();
        assert_relative_eq!(income_tax_due(50_100.0, &bands), 7_540.0, epsilon = 1e-9);
    }

    #[test]
    fn test_income_below_allowance_untaxed() {
        let bands = TaxBands::default();
        assert_eq!(income_tax_due(12_000.0, &bands), 0.0);
    }

    #[test]
    fn test_allowance_tapers_above_threshold() {
        let bands = TaxBands::default();
        assert_relative_eq!(tapered_allowance(50_000.0, &bands), 12_500.0);
        assert_relative_eq!(tapered_allowance(110_000.0, &bands), 7_500.0);
        // Fully tapered away, floored at zero
        assert_relative_eq!(tapered_allowance(200_000.0, &bands), 0.0);
    }

    #[test]
    fn test_ni_bands() {
        let bands = TaxBands::default();
        assert_eq!(ni_due(8_000.0, &bands), 0.0);
        // 12% on the slice between 8,632 and 50,000, 2% above
        assert_relative_eq!(ni_due(50_000.0, &bands), (50_000.0 - 8_632.0) * 0.12);
        assert_relative_eq!(
            ni_due(60_000.0, &bands),
            (50_000.0 - 8_632.0) * 0.12 + 10_000.0 * 0.02
        );
    }

    #[test]
    fn test_cgt_allowance_and_rate() {
        let bands = TaxBands::default();
        assert_eq!(cgt_due(10_000.0, &bands), 0.0);
        assert_relative_eq!(cgt_due(22_000.0, &bands), 2_000.0);
        assert_eq!(cgt_due(-4_000.0, &bands), 0.0);
    }

    #[test]
    fn test_pools_accumulate_and_reset_per_party() {
        let mut pools = LiabilityPools::default();
        pools.accrue_income("Joe", 1_000.0);
        pools.accrue_income("Joe", 500.0);
        pools.accrue_vested("Joe", 200.0);
        pools.accrue_income("Jane", 100.0);

        assert_eq!(pools.income("Joe").taxable, 1_700.0);
        assert_eq!(pools.income("Joe").vested, 200.0);
        assert_eq!(pools.income("Jane").taxable, 100.0);

        let (joe, _, _) = pools.take("Joe");
        assert_eq!(joe.taxable, 1_700.0);
        assert_eq!(pools.income("Joe"), IncomePool::default());
        assert_eq!(pools.income("Jane").taxable, 100.0);
    }

    #[test]
    fn test_parties_sorted_and_deduped() {
        let mut pools = LiabilityPools::default();
        pools.accrue_income("Zoe", 1.0);
        pools.accrue_ni("Abe", 1.0);
        pools.accrue_gain("Zoe", 1.0);
        assert_eq!(pools.parties(), vec!["Abe".to_string(), "Zoe".to_string()]);
    }
}
