//! Property-based integration tests for the analytics engine.
//!
//! These tests check invariants that must hold for every valid input, using the
//! `proptest` crate for random test case generation, plus a few fixed scenarios.

use chrono::NaiveDate;
use folio_analytics::backtest::{BacktestConfig, Backtester, RebalanceFrequency};
use folio_analytics::metrics::RiskMetricsCalculator;
use folio_analytics::optimization::{
    AssetUniverse, Constraints, MeanVarianceOptimizer, OptimizationObjective, SectorConstraint,
};
use folio_analytics::rebalancing::{RebalancingAdvisor, TradeAction};
use folio_analytics::returns::{ReturnKind, ReturnMatrix, ReturnSeries};
use folio_analytics::scenario::{ScenarioDefinition, ScenarioEngine};
use folio_analytics::utils::time_utils::get_weekdays_between;
use folio_analytics::var::{historical_var, VarEngine, VarMethod};
use folio_analytics::AnalyticsConfig;
use proptest::prelude::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

// =============================================================================
// Helpers
// =============================================================================

fn symbol(i: usize) -> String {
    format!("S{}", i)
}

fn config() -> AnalyticsConfig {
    let mut config = AnalyticsConfig::default().with_risk_free_rate(0.0).with_seed(11);
    config.frontier_points = 6;
    config.monte_carlo.simulations = 1_000;
    config
}

/// Constant-correlation universe, positive definite for `rho < 1`.
fn universe(expected: &[f64], vols: &[f64], rho: f64) -> AssetUniverse {
    let n = vols.len();
    let covariance = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let c = if i == j { 1.0 } else { rho };
                    c * vols[i] * vols[j]
                })
                .collect()
        })
        .collect();
    AssetUniverse::new((0..n).map(symbol).collect(), expected.to_vec(), covariance).unwrap()
}

fn matrix(columns: Vec<Vec<f64>>) -> ReturnMatrix {
    let periods = columns[0].len();
    let dates: Vec<NaiveDate> = get_weekdays_between(
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
        NaiveDate::from_ymd_opt(2025, 12, 31).unwrap(),
    )
    .into_iter()
    .take(periods)
    .collect();
    let symbols = (0..columns.len()).map(symbol).collect();
    ReturnMatrix::new(symbols, ReturnKind::Simple, dates, columns).unwrap()
}

fn equal_targets(n: usize) -> BTreeMap<String, f64> {
    (0..n).map(|i| (symbol(i), 1.0 / n as f64)).collect()
}

/// Unconstrained, capped long-only, long/short, or a 40% cap on the first half.
fn constraint_set(kind: usize, n: usize) -> Constraints {
    match kind {
        0 => Constraints::default(),
        1 => Constraints::long_only(0.0, (1.5 / n as f64).max(0.25)),
        2 => Constraints::long_only(-0.5, 1.0),
        _ => Constraints::default().with_sector(SectorConstraint {
            sector: "Front".to_string(),
            symbols: (0..n / 2).map(symbol).collect(),
            min_weight: 0.0,
            max_weight: 0.4,
        }),
    }
}

// =============================================================================
// Generators
// =============================================================================

/// Expected returns, volatilities and a common correlation for 2-4 assets.
fn arb_universe() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, f64)> {
    (2usize..=4).prop_flat_map(|n| {
        (
            proptest::collection::vec(0.02f64..0.15, n),
            proptest::collection::vec(0.08f64..0.35, n),
            0.0f64..0.6,
        )
    })
}

/// Universes of 5-20 assets with one of the constraint sets from `constraint_set`.
fn arb_large_universe() -> impl Strategy<Value = (Vec<f64>, Vec<f64>, f64, usize)> {
    (5usize..=20).prop_flat_map(|n| {
        (
            proptest::collection::vec(0.02f64..0.15, n),
            proptest::collection::vec(0.08f64..0.35, n),
            0.0f64..0.95,
            0usize..4,
        )
    })
}

/// Return columns for 2-3 assets over 30-80 periods.
fn arb_returns() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (2usize..=3, 30usize..=80).prop_flat_map(|(n, t)| {
        proptest::collection::vec(proptest::collection::vec(-0.05f64..0.05, t), n)
    })
}

/// Positive integer parts turned into weights by the caller.
fn arb_parts() -> impl Strategy<Value = (Vec<u32>, Vec<u32>)> {
    (2usize..=6).prop_flat_map(|n| {
        (
            proptest::collection::vec(1u32..100, n),
            proptest::collection::vec(0u32..100, n),
        )
    })
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Optimizer weights sum to one and respect the global bounds.
    #[test]
    fn prop_optimizer_weights_are_feasible(
        (expected, vols, rho) in arb_universe(),
        cap in 0.5f64..1.0,
    ) {
        let universe = universe(&expected, &vols, rho);
        let constraints = Constraints::long_only(0.0, cap);
        let optimizer = MeanVarianceOptimizer::new(&config());
        for objective in [
            OptimizationObjective::MinVolatility,
            OptimizationObjective::MaxSharpe,
            OptimizationObjective::MaxQuadraticUtility { risk_aversion: 3.0 },
        ] {
            let portfolio = optimizer.optimize(&universe, &constraints, &objective).unwrap();
            prop_assert!((portfolio.weight_sum() - 1.0).abs() < 1e-6);
            for weight in portfolio.weights.values() {
                prop_assert!(*weight >= -1e-9 && *weight <= cap + 1e-9);
            }
        }
    }

    /// Volatility never falls as the target return rises along the frontier.
    #[test]
    fn prop_frontier_is_monotonic((expected, vols, rho) in arb_universe()) {
        let universe = universe(&expected, &vols, rho);
        let frontier = MeanVarianceOptimizer::new(&config())
            .efficient_frontier(&universe, &Constraints::default(), None)
            .unwrap();
        for pair in frontier.points.windows(2) {
            prop_assert!(pair[0].target_return <= pair[1].target_return);
            prop_assert!(pair[1].volatility >= pair[0].volatility - 1e-6);
        }
    }

    /// The 99% VaR threshold is at least as extreme as the 95% one.
    #[test]
    fn prop_var_is_ordered_by_confidence(
        values in proptest::collection::vec(-0.1f64..0.1, 10..200)
    ) {
        let (var95, _) = historical_var(&values, 0.95);
        let (var99, cvar99) = historical_var(&values, 0.99);
        prop_assert!(var99 <= var95);
        prop_assert!(cvar99 <= var99);

        let series = ReturnSeries::from_values("p", values).unwrap();
        let engine = VarEngine::new(&config());
        let p95 = engine.estimate(&series, VarMethod::Parametric, 0.95).unwrap();
        let p99 = engine.estimate(&series, VarMethod::Parametric, 0.99).unwrap();
        prop_assert!(p99.loss() >= p95.loss());
    }

    /// Executing a plan leaves nothing to rebalance.
    #[test]
    fn prop_rebalancing_is_idempotent(
        (current_parts, target_parts) in arb_parts(),
        tolerance in 0.0f64..0.1,
    ) {
        prop_assume!(target_parts.iter().any(|p| *p > 0));
        let current_total: u32 = current_parts.iter().sum();
        let target_total: u32 = target_parts.iter().sum();
        let current: BTreeMap<String, Decimal> = current_parts
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let weight = Decimal::from(*p) / Decimal::from(current_total);
                (symbol(i), weight.round_dp(6))
            })
            .collect();
        let targets: BTreeMap<String, f64> = target_parts
            .iter()
            .enumerate()
            .map(|(i, p)| (symbol(i), f64::from(*p) / f64::from(target_total)))
            .collect();
        let prices: BTreeMap<String, Decimal> =
            current.keys().map(|s| (s.clone(), dec!(25))).collect();

        let advisor = RebalancingAdvisor::default();
        let plan = advisor
            .plan_for_weights(&current, &targets, tolerance, dec!(100000), &prices)
            .unwrap();
        let after = RebalancingAdvisor::apply_trades(&current, &plan.trades);

        let tolerance_dec = Decimal::from_f64(tolerance).unwrap().round_dp(6);
        for (symbol, target) in &targets {
            let target = Decimal::from_f64(*target).unwrap().round_dp(6);
            let weight = after.get(symbol).copied().unwrap_or(Decimal::ZERO);
            prop_assert!((weight - target).abs() <= tolerance_dec);
        }
        let again = advisor
            .plan_for_weights(&after, &targets, tolerance, dec!(100000), &prices)
            .unwrap();
        prop_assert!(!again.rebalancing_needed);
    }

    /// Drawdowns stay within [-1, 0].
    #[test]
    fn prop_drawdown_is_bounded(
        values in proptest::collection::vec(-0.99f64..1.0, 2..150)
    ) {
        let series = ReturnSeries::from_values("p", values).unwrap();
        let analysis = RiskMetricsCalculator::new(&config()).drawdown_analysis(&series).unwrap();
        prop_assert!(analysis.max_drawdown <= 0.0 && analysis.max_drawdown >= -1.0);
        for point in &analysis.points {
            prop_assert!(point.drawdown <= 0.0 && point.drawdown >= -1.0);
        }
    }

    /// Identical backtest inputs give identical value paths.
    #[test]
    fn prop_backtest_is_deterministic(columns in arb_returns(), cost in 0.0f64..0.01) {
        let returns = matrix(columns);
        let targets = equal_targets(returns.n_assets());
        let settings = BacktestConfig {
            frequency: RebalanceFrequency::Monthly,
            transaction_cost_rate: cost,
            ..BacktestConfig::default()
        };
        let backtester = Backtester::new(&config());
        let first = backtester.run(&returns, &targets, &settings).unwrap();
        let second = backtester.run(&returns, &targets, &settings).unwrap();
        prop_assert_eq!(first.value_path, second.value_path);
        prop_assert_eq!(first.final_value, second.final_value);
    }

    /// Running scenarios leaves the unshocked statistics unchanged.
    #[test]
    fn prop_scenarios_do_not_mutate_inputs(
        columns in arb_returns(),
        shock in -0.02f64..0.02,
        multiplier in 0.1f64..3.0,
    ) {
        let returns = matrix(columns);
        let snapshot = returns.clone();
        let weights: Vec<f64> = vec![1.0 / returns.n_assets() as f64; returns.n_assets()];
        let calculator = RiskMetricsCalculator::new(&config());
        let before = calculator
            .calculate(&returns.portfolio_series("p", &weights).unwrap(), None)
            .unwrap();

        let scenarios = vec![
            ScenarioDefinition::new("shift").with_return_shock(shock, None),
            ScenarioDefinition::new("scale").with_volatility_shock(multiplier, None),
            ScenarioDefinition::new("couple").with_correlation_shock(0.5),
        ];
        ScenarioEngine::new(&config())
            .run(&returns, &equal_targets(returns.n_assets()), &scenarios)
            .unwrap();

        let after = calculator
            .calculate(&returns.portfolio_series("p", &weights).unwrap(), None)
            .unwrap();
        prop_assert_eq!(&returns, &snapshot);
        prop_assert_eq!(before, after);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Every objective succeeds on larger universes with caps, shorting and sectors.
    #[test]
    fn prop_large_universe_objectives_are_feasible(
        (expected, vols, rho, kind) in arb_large_universe(),
    ) {
        let n = vols.len();
        let universe = universe(&expected, &vols, rho);
        let constraints = constraint_set(kind, n);
        let resolved = constraints.resolve(universe.symbols()).unwrap();
        let optimizer = MeanVarianceOptimizer::new(&config());
        let min_vol = optimizer
            .optimize(&universe, &constraints, &OptimizationObjective::MinVolatility)
            .unwrap();
        for objective in [
            OptimizationObjective::MaxSharpe,
            OptimizationObjective::TargetReturn { target: min_vol.expected_return },
            OptimizationObjective::TargetVolatility { target: min_vol.volatility + 0.02 },
            OptimizationObjective::MaxQuadraticUtility { risk_aversion: 3.0 },
        ] {
            let portfolio = optimizer.optimize(&universe, &constraints, &objective).unwrap();
            prop_assert!((portfolio.weight_sum() - 1.0).abs() < 1e-6);
            for (i, s) in universe.symbols().iter().enumerate() {
                let w = portfolio.weight(s);
                prop_assert!(w >= resolved.lower[i] && w <= resolved.upper[i]);
            }
            if kind == 3 {
                let front: f64 = (0..n / 2).map(|i| portfolio.weight(&symbol(i))).sum();
                prop_assert!(front <= 0.4 + 1e-5);
            }
        }
    }

    /// Larger frontiers return every requested point in target order.
    #[test]
    fn prop_large_frontier_is_complete_and_ordered(
        (expected, vols, rho, kind) in arb_large_universe(),
    ) {
        let n = vols.len();
        let mut settings = config();
        settings.frontier_points = 12;
        let frontier = MeanVarianceOptimizer::new(&settings)
            .efficient_frontier(&universe(&expected, &vols, rho), &constraint_set(kind, n), None)
            .unwrap();
        prop_assert_eq!(frontier.skipped_points, 0);
        prop_assert_eq!(frontier.points.len(), 12);
        for pair in frontier.points.windows(2) {
            prop_assert!(pair[0].target_return < pair[1].target_return);
            prop_assert!(pair[0].volatility <= pair[1].volatility + 1e-5);
        }
    }
}

// =============================================================================
// Fixed Scenarios
// =============================================================================

#[test]
fn test_five_observation_series() {
    let series =
        ReturnSeries::from_values("p", vec![0.01, -0.02, 0.015, -0.01, 0.03]).unwrap();
    let metrics = RiskMetricsCalculator::new(&config())
        .calculate(&series, None)
        .unwrap();
    assert!(metrics.annualized_return.is_finite());
    assert!(metrics.annualized_volatility > 0.0);
    assert!(metrics.sharpe_ratio.is_finite());

    let estimate = VarEngine::new(&config())
        .estimate(&series, VarMethod::Historical, 0.95)
        .unwrap();
    assert!((estimate.var - (-0.018)).abs() < 1e-12);
}

#[test]
fn test_perfectly_correlated_twins_split_evenly() {
    let universe = universe(&[0.08, 0.08], &[0.2, 0.2], 1.0);
    let portfolio = MeanVarianceOptimizer::new(&config())
        .optimize(
            &universe,
            &Constraints::default(),
            &OptimizationObjective::MinVolatility,
        )
        .unwrap();
    assert!((portfolio.weight("S0") - 0.5).abs() < 1e-6);
    assert!((portfolio.weight("S1") - 0.5).abs() < 1e-6);
}

#[test]
fn test_sixty_forty_to_even_split() {
    let current = BTreeMap::from([("A".to_string(), dec!(0.6)), ("B".to_string(), dec!(0.4))]);
    let targets = BTreeMap::from([("A".to_string(), 0.5), ("B".to_string(), 0.5)]);
    let prices = BTreeMap::from([("A".to_string(), dec!(100)), ("B".to_string(), dec!(50))]);

    let plan = RebalancingAdvisor::default()
        .plan_for_weights(&current, &targets, 0.05, dec!(10000), &prices)
        .unwrap();
    assert!(plan.rebalancing_needed);

    let sell = plan.trade("A").unwrap();
    let buy = plan.trade("B").unwrap();
    assert_eq!(sell.action, TradeAction::Sell);
    assert_eq!(buy.action, TradeAction::Buy);
    assert_eq!(sell.dollar_amount, -buy.dollar_amount);
    assert_eq!(buy.dollar_amount, dec!(1000));
}
