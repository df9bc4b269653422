//! Income tax, NI and CGT settlement at tax-year boundaries.

use approx::assert_relative_eq;
use jiff::civil::date;

use super::base_model;
use crate::model::{
    Asset, Evaluation, Income, LiabilityTag, Transaction, TransactionKind, TransferSide,
};
use crate::simulation::try_evaluate_at;

fn tax_entries<'a>(
    result: &'a crate::model::EvaluationResult,
    name: &'a str,
) -> Vec<&'a Evaluation> {
    result.history(name).collect()
}

#[test]
fn test_single_year_income_50100_under_default_bands() {
    // 12 monthly payments of 4175 across one tax year: 7540 tax, 42560 net
    let model = base_model(date(2018, 4, 1), date(2019, 6, 1), 0.0).income(
        Income::new("Salary", date(2018, 4, 6), 4_175.0)
            .with_end(date(2019, 4, 6))
            .with_liability(LiabilityTag::income_tax("Joe")),
    );
    let result = try_evaluate_at(&model, date(2018, 4, 1)).unwrap();

    let tax = tax_entries(&result, "Joe income tax");
    assert_eq!(tax.len(), 1);
    assert_eq!(tax[0].date, date(2019, 4, 6));
    assert_relative_eq!(tax[0].value, 7_540.0, epsilon = 1e-6);

    let net = tax_entries(&result, "Joe income net");
    assert_eq!(net.len(), 1);
    assert_relative_eq!(net[0].value, 42_560.0, epsilon = 1e-6);

    // The bill is drawn from cash at the boundary
    assert_relative_eq!(
        result.value_at("Cash", date(2019, 6, 1)).unwrap(),
        50_100.0 - 7_540.0,
        epsilon = 1e-6
    );
}

#[test]
fn test_income_below_allowance_settles_net_only() {
    let model = base_model(date(2018, 4, 1), date(2019, 6, 1), 0.0).income(
        Income::new("Part time", date(2018, 4, 6), 1_000.0)
            .with_end(date(2019, 4, 6))
            .with_liability(LiabilityTag::income_tax("Joe")),
    );
    let result = try_evaluate_at(&model, date(2018, 4, 1)).unwrap();

    assert!(tax_entries(&result, "Joe income tax").is_empty());
    let net = tax_entries(&result, "Joe income net");
    assert_eq!(net.len(), 1);
    assert_relative_eq!(net[0].value, 12_000.0, epsilon = 1e-9);
    // Nothing deducted: the income arrived intact
    assert_relative_eq!(
        result.value_at("Cash", date(2019, 6, 1)).unwrap(),
        12_000.0,
        epsilon = 1e-9
    );
}

#[test]
fn test_ni_has_its_own_thresholds() {
    let model = base_model(date(2018, 4, 1), date(2019, 6, 1), 0.0).income(
        Income::new("Salary", date(2018, 4, 6), 4_175.0)
            .with_end(date(2019, 4, 6))
            .with_liability(LiabilityTag::ni("Joe")),
    );
    let result = try_evaluate_at(&model, date(2018, 4, 1)).unwrap();

    let ni = tax_entries(&result, "Joe NI");
    assert_eq!(ni.len(), 1);
    // 12% between 8632 and 50000, 2% on the last 100
    let expected = (50_000.0 - 8_632.0) * 0.12 + 100.0 * 0.02;
    assert_relative_eq!(ni[0].value, expected, epsilon = 1e-6);
    assert!(tax_entries(&result, "Joe income tax").is_empty());
}

#[test]
fn test_distinct_parties_settle_independently() {
    let model = base_model(date(2018, 4, 1), date(2019, 6, 1), 0.0)
        .income(
            Income::new("Salary Joe", date(2018, 4, 6), 2_000.0)
                .with_end(date(2019, 4, 6))
                .with_liability(LiabilityTag::income_tax("Joe")),
        )
        .income(
            Income::new("Salary Jane", date(2018, 4, 6), 3_000.0)
                .with_end(date(2019, 4, 6))
                .with_liability(LiabilityTag::income_tax("Jane")),
        );
    let result = try_evaluate_at(&model, date(2018, 4, 1)).unwrap();

    let joe = tax_entries(&result, "Joe income net");
    let jane = tax_entries(&result, "Jane income net");
    assert_relative_eq!(joe[0].value, 24_000.0, epsilon = 1e-9);
    assert_relative_eq!(jane[0].value, 36_000.0, epsilon = 1e-9);
    // 36000 taxable = 23500 over the allowance at 20%
    let jane_tax = tax_entries(&result, "Jane income tax");
    assert_relative_eq!(jane_tax[0].value, (36_000.0 - 12_500.0) * 0.2, epsilon = 1e-6);
    assert!(tax_entries(&result, "Joe income tax").is_empty());
}

#[test]
fn test_capital_gain_prorated_on_partial_disposal() {
    // Sell 30000 of a 40000 holding bought for 10000: gain 22500,
    // taxable 10500 over the allowance, 2100 due at 20%
    let model = base_model(date(2018, 4, 1), date(2019, 6, 1), 0.0)
        .asset(
            Asset::new("Shares", date(2018, 4, 1), 40_000.0)
                .with_purchase_price(10_000.0)
                .with_liability(LiabilityTag::capital_gains("Jane")),
        )
        .transaction(Transaction::new(
            "Sell down",
            date(2018, 6, 1),
            TransactionKind::Transfer {
                from: Some(TransferSide::absolute("Shares", 30_000.0)),
                to: Some(TransferSide::proportional("Cash", 1.0)),
            },
        ));
    let result = try_evaluate_at(&model, date(2018, 4, 1)).unwrap();

    let cgt = tax_entries(&result, "Jane CGT");
    assert_eq!(cgt.len(), 1);
    assert_eq!(cgt[0].date, date(2019, 4, 6));
    assert_relative_eq!(cgt[0].value, 2_100.0, epsilon = 1e-6);

    let net = tax_entries(&result, "Jane gains net");
    assert_relative_eq!(net[0].value, 22_500.0 - 2_100.0, epsilon = 1e-6);

    assert_relative_eq!(
        result.value_at("Shares", date(2018, 6, 2)).unwrap(),
        10_000.0,
        epsilon = 1e-9
    );
}

#[test]
fn test_gains_below_allowance_untaxed() {
    let model = base_model(date(2018, 4, 1), date(2019, 6, 1), 0.0)
        .asset(
            Asset::new("Shares", date(2018, 4, 1), 20_000.0)
                .with_purchase_price(8_000.0)
                .with_liability(LiabilityTag::capital_gains("Jane")),
        )
        .transaction(Transaction::new(
            "Trim",
            date(2018, 6, 1),
            TransactionKind::Transfer {
                from: Some(TransferSide::absolute("Shares", 15_000.0)),
                to: Some(TransferSide::proportional("Cash", 1.0)),
            },
        ));
    let result = try_evaluate_at(&model, date(2018, 4, 1)).unwrap();

    // Gain 15000 - 6000 = 9000, under the 12000 exemption
    assert!(tax_entries(&result, "Jane CGT").is_empty());
    let net = tax_entries(&result, "Jane gains net");
    assert_relative_eq!(net[0].value, 9_000.0, epsilon = 1e-9);
}

#[test]
fn test_allowance_tapers_for_high_income() {
    // 10000/month = 120000/year: allowance 12500 - (20000/2) = 2500
    let model = base_model(date(2018, 4, 1), date(2019, 6, 1), 0.0).income(
        Income::new("Big salary", date(2018, 4, 6), 10_000.0)
            .with_end(date(2019, 4, 6))
            .with_liability(LiabilityTag::income_tax("Joe")),
    );
    let result = try_evaluate_at(&model, date(2018, 4, 1)).unwrap();

    // 117500 taxable: 37500 at 20% plus 80000 at 40%
    let tax = tax_entries(&result, "Joe income tax");
    assert_relative_eq!(tax[0].value, 37_500.0 * 0.2 + 80_000.0 * 0.4, epsilon = 1e-6);
}
