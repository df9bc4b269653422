//! Aggregation layer: bucketing, detail modes, focus, delta views.

use approx::assert_relative_eq;
use jiff::civil::date;

use super::base_model;
use crate::chart::{
    AssetView, ChartOptions, Focus, ViewDetail, ViewFrequency, build_chart_data,
    build_chart_data_with,
};
use crate::model::{
    Asset, Expense, Income, LiabilityTag, Setting, Transaction, TransactionKind, TransferSide,
};
use crate::simulation::try_evaluate_at;

fn series<'a>(data: &'a [crate::model::ChartSeries], item: &str) -> &'a crate::model::ChartSeries {
    data.iter()
        .find(|s| s.item == item)
        .unwrap_or_else(|| panic!("missing series {item:?}"))
}

#[test]
fn test_monthly_expense_buckets_match_payments() {
    let model = base_model(date(2020, 1, 1), date(2020, 6, 1), 0.0)
        .expense(Expense::new("Rent", date(2020, 1, 1), 800.0));
    let result = try_evaluate_at(&model, date(2020, 1, 1)).unwrap();
    let charts = build_chart_data(&model, &result);

    let rent = series(&charts.expenses_data, "Rent");
    assert_eq!(rent.data_points.len(), 6);
    assert_eq!(rent.data_points[0].label, "2020-01-01");
    for point in &rent.data_points {
        assert_relative_eq!(point.y, 800.0);
    }
}

#[test]
fn test_annual_buckets_sum_monthly_flows() {
    let model = base_model(date(2020, 1, 1), date(2021, 12, 31), 0.0)
        .setting(Setting::view("viewFrequency", "annual"))
        .income(Income::new("Salary", date(2020, 1, 1), 1_000.0));
    let result = try_evaluate_at(&model, date(2020, 1, 1)).unwrap();
    let charts = build_chart_data(&model, &result);

    let salary = series(&charts.incomes_data, "Salary");
    assert_eq!(salary.data_points.len(), 2);
    assert_relative_eq!(salary.data_points[0].y, 12_000.0);
    assert_relative_eq!(salary.data_points[1].y, 12_000.0);
}

#[test]
fn test_assets_forward_carry_and_zero_before_start() {
    let model = base_model(date(2020, 1, 1), date(2020, 6, 1), 0.0)
        .asset(Asset::new("Bonus pot", date(2020, 3, 15), 1_000.0));
    let result = try_evaluate_at(&model, date(2020, 1, 1)).unwrap();
    let charts = build_chart_data(&model, &result);

    let pot = series(&charts.asset_data, "Bonus pot");
    let ys: Vec<f64> = pot.data_points.iter().map(|p| p.y).collect();
    // Zero before start, forward-carried afterwards
    assert_eq!(ys, vec![0.0, 0.0, 0.0, 1_000.0, 1_000.0, 1_000.0]);
}

#[test]
fn test_debts_chart_as_positive_amounts() {
    let model = base_model(date(2020, 1, 1), date(2020, 3, 1), 0.0)
        .asset(Asset::debt("Mortgage", date(2020, 1, 1), 150_000.0));
    let result = try_evaluate_at(&model, date(2020, 1, 1)).unwrap();
    let charts = build_chart_data(&model, &result);

    let mortgage = series(&charts.debt_data, "Mortgage");
    assert_relative_eq!(mortgage.data_points[0].y, 150_000.0);
    assert!(charts.asset_data.iter().all(|s| s.item != "Mortgage"));
}

#[test]
fn test_total_detail_conserves_fine_sum() {
    let model = base_model(date(2020, 1, 1), date(2020, 12, 1), 500.0)
        .asset(Asset::new("ISA", date(2020, 1, 1), 1_000.0).with_growth(6.0))
        .asset(Asset::new("GIA", date(2020, 4, 1), 2_000.0).with_growth(3.0));
    let result = try_evaluate_at(&model, date(2020, 1, 1)).unwrap();

    let fine = build_chart_data_with(&model, &result, &ChartOptions::default());
    let total = build_chart_data_with(
        &model,
        &result,
        &ChartOptions::default().with_detail(ViewDetail::Total),
    );

    let total_series = series(&total.asset_data, "Total");
    for (i, point) in total_series.data_points.iter().enumerate() {
        let fine_sum: f64 = fine.asset_data.iter().map(|s| s.data_points[i].y).sum();
        assert_relative_eq!(point.y, fine_sum, epsilon = 1e-9);
    }
}

#[test]
fn test_coarse_groups_by_category() {
    let model = base_model(date(2020, 1, 1), date(2020, 3, 1), 0.0)
        .asset(Asset::new("ISA", date(2020, 1, 1), 1_000.0).with_category("investments"))
        .asset(Asset::new("GIA", date(2020, 1, 1), 2_000.0).with_category("investments"))
        .asset(Asset::new("Boat", date(2020, 1, 1), 7_000.0));
    let result = try_evaluate_at(&model, date(2020, 1, 1)).unwrap();
    let charts = build_chart_data_with(
        &model,
        &result,
        &ChartOptions::default().with_detail(ViewDetail::Coarse),
    );

    assert_relative_eq!(series(&charts.asset_data, "investments").data_points[0].y, 3_000.0);
    // No category falls back to the item name
    assert_relative_eq!(series(&charts.asset_data, "Boat").data_points[0].y, 7_000.0);
}

#[test]
fn test_focus_restricts_to_one_item() {
    let model = base_model(date(2020, 1, 1), date(2020, 3, 1), 0.0)
        .asset(Asset::new("ISA", date(2020, 1, 1), 1_000.0))
        .asset(Asset::new("GIA", date(2020, 1, 1), 2_000.0));
    let result = try_evaluate_at(&model, date(2020, 1, 1)).unwrap();
    let charts = build_chart_data_with(
        &model,
        &result,
        &ChartOptions::default().with_focus(Focus::Item("ISA".to_string())),
    );

    // Cash is an asset too, hence the focus filter leaves exactly one series
    assert_eq!(charts.asset_data.len(), 1);
    assert_eq!(charts.asset_data[0].item, "ISA");
}

#[test]
fn test_delta_view_splits_per_mover() {
    let model = base_model(date(2020, 1, 1), date(2020, 6, 1), 0.0)
        .asset(Asset::new("Savings", date(2020, 1, 1), 10_000.0).with_growth(12.0))
        .transaction(Transaction::new(
            "Gift",
            date(2020, 3, 15),
            TransactionKind::Transfer {
                from: Some(TransferSide::absolute("Savings", 500.0)),
                to: Some(TransferSide::proportional("Cash", 1.0)),
            },
        ));
    let result = try_evaluate_at(&model, date(2020, 1, 1)).unwrap();

    let focus = Focus::Item("Savings".to_string());
    let deltas = build_chart_data_with(
        &model,
        &result,
        &ChartOptions::default()
            .with_focus(focus.clone())
            .with_asset_view(AssetView::Deltas),
    );

    // Setup, growth and the transfer each get a labelled series
    let setup = series(&deltas.asset_data, "Savings");
    assert_relative_eq!(setup.data_points[0].y, 10_000.0);

    let growth = series(&deltas.asset_data, "Savings/growth");
    assert!(growth.data_points[1].y > 0.0);

    let gift = series(&deltas.asset_data, "Gift");
    assert_relative_eq!(gift.data_points[2].y, -500.0);

    // Additions filters the negative mover out, reductions keeps only it
    let additions = build_chart_data_with(
        &model,
        &result,
        &ChartOptions::default()
            .with_focus(focus.clone())
            .with_asset_view(AssetView::Additions),
    );
    assert!(additions.asset_data.iter().all(|s| s.item != "Gift"));

    let reductions = build_chart_data_with(
        &model,
        &result,
        &ChartOptions::default()
            .with_focus(focus)
            .with_asset_view(AssetView::Reductions),
    );
    assert_eq!(reductions.asset_data.len(), 1);
    assert_eq!(reductions.asset_data[0].item, "Gift");
}

#[test]
fn test_tax_bucket_collects_settlement_entries() {
    let model = base_model(date(2018, 4, 1), date(2019, 6, 1), 0.0).income(
        Income::new("Salary", date(2018, 4, 6), 4_175.0)
            .with_end(date(2019, 4, 6))
            .with_liability(LiabilityTag::income_tax("Joe")),
    );
    let result = try_evaluate_at(&model, date(2018, 4, 1)).unwrap();
    let charts = build_chart_data(&model, &result);

    let tax = series(&charts.tax_data, "Joe income tax");
    let total: f64 = tax.data_points.iter().map(|p| p.y).sum();
    assert_relative_eq!(total, 7_540.0, epsilon = 1e-6);

    let net = series(&charts.tax_data, "Joe income net");
    let total: f64 = net.data_points.iter().map(|p| p.y).sum();
    assert_relative_eq!(total, 42_560.0, epsilon = 1e-6);
}

#[test]
fn test_frequency_read_from_setting() {
    let model = base_model(date(2020, 1, 1), date(2021, 12, 31), 0.0)
        .setting(Setting::view("viewFrequency", "annual"));
    let options = ChartOptions::from_model(&model);
    assert_eq!(options.frequency, ViewFrequency::Annual);
    assert_eq!(
        ChartOptions::default().frequency,
        ViewFrequency::Monthly
    );
}
