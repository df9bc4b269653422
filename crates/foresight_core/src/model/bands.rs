//! Tax band tables.
//!
//! The engine is not a tax-law interpreter: it computes from whatever band
//! tables the model carries. The defaults are the UK 2019/20 figures.

use serde::{Deserialize, Serialize};

/// One progressive band: the rate applied to the slice above `threshold`
/// up to the next band's threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxBand {
    pub threshold: f64,
    pub rate: f64,
}

impl TaxBand {
    pub fn new(threshold: f64, rate: f64) -> Self {
        Self { threshold, rate }
    }
}

/// Band tables for one jurisdiction's income tax, NI and capital gains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBands {
    /// Income-tax bands over taxable (post-allowance) income, ascending.
    pub income_bands: Vec<TaxBand>,
    /// Personal allowance deducted before banding.
    pub personal_allowance: f64,
    /// Income level above which the allowance tapers away.
    pub allowance_taper_threshold: f64,
    /// Allowance lost per unit of income over the threshold.
    pub allowance_taper_rate: f64,
    /// NI bands over gross income, ascending; the first threshold is the
    /// point where contributions begin.
    pub ni_bands: Vec<TaxBand>,
    /// Annual exempt amount for capital gains.
    pub cgt_allowance: f64,
    /// Flat rate on gains above the allowance.
    pub cgt_rate: f64,
}

impl Default for TaxBands {
    fn default() -> Self {
        Self {
            income_bands: vec![
                TaxBand::new(0.0, 0.20),
                TaxBand::new(37_500.0, 0.40),
                TaxBand::new(137_500.0, 0.45),
            ],
            personal_allowance: 12_500.0,
            allowance_taper_threshold: 100_000.0,
            allowance_taper_rate: 0.5,
            ni_bands: vec![TaxBand::new(8_632.0, 0.12), TaxBand::new(50_000.0, 0.02)],
            cgt_allowance: 12_000.0,
            cgt_rate: 0.20,
        }
    }
}
