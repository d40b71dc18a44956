//! End-to-end simulation tests against in-memory price data.
//!
//! Covers:
//! - Buy-and-hold, partial allocation, safe-asset failure and rotation scenarios
//! - Cash and value conservation across rebalances
//! - Coverage failures, stale marks and safe-asset fallback warnings
//! - Determinism and cancellation

mod common;

use approx::assert_relative_eq;
use common::*;
use allotrader::domain::backtest::{RebalanceFrequency, Simulation, SimulationContext};
use allotrader::domain::error::AllotraderError;
use allotrader::domain::metrics::Metrics;
use allotrader::domain::position::TradeAction;
use allotrader::domain::price_store::PriceView;
use allotrader::domain::signal::Signal;
use allotrader::domain::universe::load_price_store;
use allotrader::domain::warning::WarningKind;
use allotrader::ports::signal_port::SignalSource;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};

fn jan(day: u32) -> NaiveDate {
    date(2024, 1, day)
}

fn total_costs(result: &allotrader::domain::backtest::BacktestResult) -> f64 {
    result.trades.iter().map(|t| t.costs()).sum()
}

mod buy_and_hold {
    use super::*;

    #[test]
    fn constant_full_weight_trades_only_at_the_edges() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 10, 100.0, 1.0))]);
        let source = ScriptedSource::constant(&["SPY"], &[("SPY", 1.0)]);

        let result = run_simulation(sample_config(), prices, source).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].action, TradeAction::Buy);
        assert_eq!(result.trades[0].date, jan(1));
        assert_relative_eq!(result.trades[0].quantity, 1000.0, epsilon = 1e-9);
        assert_eq!(result.trades[1].action, TradeAction::Sell);
        assert_eq!(result.trades[1].date, jan(10));
        assert_relative_eq!(result.final_value(), 109_000.0, epsilon = 1e-6);
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn return_equals_buy_and_hold_minus_entry_and_exit_costs() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 5, 100.0, 2.5))]);
        let source = ScriptedSource::constant(&["SPY"], &[("SPY", 1.0)]);
        let config = allotrader::domain::backtest::BacktestConfig {
            commission_rate: 0.001,
            slippage_rate: 0.0005,
            ..sample_config()
        };

        let result = run_simulation(config, prices, source).unwrap();

        assert_eq!(result.trades.len(), 2);
        let rate = 0.0015;
        let quantity = 100_000.0 / (100.0 * (1.0 + rate));
        let expected = quantity * 110.0 * (1.0 - rate);
        assert_relative_eq!(result.trades[0].quantity, quantity, max_relative = 1e-9);
        assert_relative_eq!(result.final_value(), expected, max_relative = 1e-9);

        let buy_and_hold = 110.0 / 100.0 - 1.0;
        let metrics = Metrics::compute(&result, 0.0);
        assert!(metrics.total_return < buy_and_hold);
        assert_relative_eq!(
            result.final_value() + total_costs(&result),
            quantity * 110.0 + quantity * 100.0 * rate,
            max_relative = 1e-9
        );
    }

    #[test]
    fn costs_scale_the_opening_buy_with_a_partial_fill_warning() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 3, 100.0, 0.0))]);
        let source = ScriptedSource::constant(&["SPY"], &[("SPY", 1.0)]);
        let config = allotrader::domain::backtest::BacktestConfig {
            commission_rate: 0.01,
            ..sample_config()
        };

        let result = run_simulation(config, prices, source).unwrap();

        let first = &result.snapshots[0];
        assert!(first.cash >= 0.0);
        assert!(first.warnings.iter().any(|w| w.kind == WarningKind::PartialFill));
    }

    #[test]
    fn trade_cash_flows_reconcile_with_final_cash() {
        let prices = store_with(vec![
            ("SPY", generate_bars("SPY", jan(1), 6, 100.0, 3.0)),
            ("TLT", generate_bars("TLT", jan(1), 6, 50.0, -1.0)),
        ]);
        let source = ScriptedSource::constant(&["SPY", "TLT"], &[("SPY", 0.6), ("TLT", 0.4)]);
        let config = allotrader::domain::backtest::BacktestConfig {
            commission_rate: 0.001,
            slippage_rate: 0.0005,
            ..sample_config()
        };

        let result = run_simulation(config, prices, source).unwrap();

        let net: f64 = result.trades.iter().map(|t| t.cash_flow()).sum();
        let last = result.snapshots.last().unwrap();
        assert!(last.positions.is_empty());
        assert_relative_eq!(result.initial_cash + net, last.cash, max_relative = 1e-9);

        let summaries = allotrader::domain::metrics::SymbolSummary::compute_per_symbol(&result.trades);
        let by_symbol: f64 = summaries.iter().map(|s| s.net_cash_flow).sum();
        assert_relative_eq!(by_symbol, net, max_relative = 1e-9);
    }
}

mod partial_allocation {
    use super::*;

    #[test]
    fn weights_summing_below_one_leave_the_rest_in_cash() {
        let prices = store_with(vec![
            ("SPY", generate_bars("SPY", jan(1), 5, 100.0, 0.0)),
            ("TLT", generate_bars("TLT", jan(1), 5, 50.0, 0.0)),
        ]);
        let source = ScriptedSource::constant(&["SPY", "TLT"], &[("SPY", 0.36), ("TLT", 0.24)]);

        let result = run_simulation(sample_config(), prices, source).unwrap();

        let first = &result.snapshots[0];
        assert_relative_eq!(first.invested_value(), 60_000.0, epsilon = 1e-6);
        assert_relative_eq!(first.cash, 40_000.0, epsilon = 1e-6);
        assert_relative_eq!(first.weight_of("SPY"), 0.36, epsilon = 1e-9);
        assert_relative_eq!(first.weight_of("TLT"), 0.24, epsilon = 1e-9);
    }

    #[test]
    fn overweight_signals_are_normalised() {
        let prices = store_with(vec![
            ("SPY", generate_bars("SPY", jan(1), 3, 100.0, 0.0)),
            ("TLT", generate_bars("TLT", jan(1), 3, 100.0, 0.0)),
        ]);
        let source = ScriptedSource::constant(&["SPY", "TLT"], &[("SPY", 0.9), ("TLT", 0.3)]);

        let result = run_simulation(sample_config(), prices, source).unwrap();

        let first = &result.snapshots[0];
        assert_relative_eq!(first.weight_of("SPY"), 0.75, epsilon = 1e-9);
        assert_relative_eq!(first.weight_of("TLT"), 0.25, epsilon = 1e-9);
        assert!(first.cash.abs() < 1e-6);
    }

    #[test]
    fn no_signals_means_all_cash() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 5, 100.0, 1.0))]);
        let source = ScriptedSource::new(&["SPY"]);

        let result = run_simulation(sample_config(), prices, source).unwrap();

        assert!(result.trades.is_empty());
        assert!(result.snapshots.iter().all(|s| s.positions.is_empty()));
        assert_relative_eq!(result.final_value(), 100_000.0);
    }
}

mod safe_asset {
    use super::*;

    fn defensive_source() -> ScriptedSource {
        ScriptedSource::new(&["SPY"]).at(NaiveDate::MIN, vec![Signal::flat("SPY")])
    }

    #[test]
    fn missing_safe_asset_fails_before_any_trade() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 5, 100.0, 0.0))]);
        let config = allotrader::domain::backtest::BacktestConfig {
            safe_asset: Some("TLT".to_string()),
            ..sample_config()
        };

        let err = run_simulation(config, prices, defensive_source()).unwrap_err();

        match &err {
            AllotraderError::SafeAssetUnavailable { symbol } => assert_eq!(symbol, "TLT"),
            other => panic!("expected SafeAssetUnavailable, got {other:?}"),
        }
        assert!(err.to_string().contains("TLT"));
    }

    #[test]
    fn fallback_holds_defensive_weight_as_cash_with_warnings() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 5, 100.0, 0.0))]);
        let config = allotrader::domain::backtest::BacktestConfig {
            safe_asset: Some("TLT".to_string()),
            safe_asset_cash_fallback: true,
            ..sample_config()
        };

        let result = run_simulation(config, prices, defensive_source()).unwrap();

        assert!(result.trades.is_empty());
        assert_relative_eq!(result.final_value(), 100_000.0);
        let first = &result.snapshots[0];
        let fallbacks = first
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::SafeAssetFallback)
            .count();
        assert!(fallbacks >= 1);
        assert!(first.warnings.iter().all(|w| w.symbol.as_deref() == Some("TLT")));
    }

    #[test]
    fn defensive_signals_rotate_into_the_safe_asset() {
        let prices = store_with(vec![
            ("SPY", generate_bars("SPY", jan(1), 5, 100.0, 0.0)),
            ("TLT", generate_bars("TLT", jan(1), 5, 50.0, 0.0)),
        ]);
        let source = ScriptedSource::new(&["SPY"])
            .at(jan(1), vec![Signal::long("SPY", 1.0)])
            .at(jan(3), vec![Signal::flat("SPY")]);
        let config = allotrader::domain::backtest::BacktestConfig {
            safe_asset: Some("TLT".to_string()),
            ..sample_config()
        };

        let result = run_simulation(config, prices, source).unwrap();

        let rotation: Vec<_> = result.trades.iter().filter(|t| t.date == jan(3)).collect();
        assert_eq!(rotation.len(), 2);
        assert_eq!(rotation[0].symbol, "SPY");
        assert_eq!(rotation[0].action, TradeAction::Sell);
        assert_eq!(rotation[1].symbol, "TLT");
        assert_eq!(rotation[1].action, TradeAction::Buy);
        assert_relative_eq!(result.snapshots[2].weight_of("TLT"), 1.0, epsilon = 1e-9);
    }

    fn late_listed_prices() -> allotrader::domain::price_store::PriceStore {
        store_with(vec![
            ("SPY", generate_bars("SPY", jan(1), 10, 100.0, 0.0)),
            ("TLT", generate_bars("TLT", jan(9), 2, 50.0, 0.0)),
        ])
    }

    #[test]
    fn late_listed_safe_asset_is_incomplete_coverage() {
        let config = allotrader::domain::backtest::BacktestConfig {
            safe_asset: Some("TLT".to_string()),
            ..sample_config()
        };

        let err = run_simulation(config, late_listed_prices(), defensive_source()).unwrap_err();

        match &err {
            AllotraderError::IncompleteCoverage { symbol, first, .. } => {
                assert_eq!(symbol, "TLT");
                assert_eq!(*first, jan(9));
            }
            other => panic!("expected IncompleteCoverage, got {other:?}"),
        }
    }

    #[test]
    fn late_listed_safe_asset_with_fallback_warns_at_startup() {
        let config = allotrader::domain::backtest::BacktestConfig {
            safe_asset: Some("TLT".to_string()),
            safe_asset_cash_fallback: true,
            ..sample_config()
        };

        let result = run_simulation(config, late_listed_prices(), defensive_source()).unwrap();

        let startup = result.snapshots[0]
            .warnings
            .iter()
            .find(|w| w.kind == WarningKind::SafeAssetFallback && w.message.contains("2024-01-09"))
            .expect("startup warning names the priced range");
        assert_eq!(startup.symbol.as_deref(), Some("TLT"));
        assert!(startup.message.contains("2024-01-10"));

        assert!(result.trades.iter().all(|t| t.symbol == "TLT"));
        let first_buy = result.trades.iter().find(|t| t.action == TradeAction::Buy).unwrap();
        assert_eq!(first_buy.date, jan(9));
        assert_relative_eq!(result.snapshots[7].cash, 100_000.0, epsilon = 1e-9);
    }
}

mod rotation {
    use super::*;

    fn rotation_prices() -> allotrader::domain::price_store::PriceStore {
        store_with(
            ["A", "B", "C", "D"]
                .into_iter()
                .map(|s| (s, generate_bars(s, jan(1), 4, 100.0, 0.0)))
                .collect(),
        )
    }

    fn rotation_source() -> ScriptedSource {
        let third = 1.0 / 3.0;
        ScriptedSource::new(&["A", "B", "C", "D"])
            .at(
                jan(1),
                vec![
                    Signal::long("A", third),
                    Signal::long("B", third),
                    Signal::long("C", third),
                ],
            )
            .at(jan(2), vec![Signal::long("B", 0.5), Signal::long("D", 0.5)])
    }

    #[test]
    fn rotation_sells_dropped_symbols_before_buying() {
        let config = allotrader::domain::backtest::BacktestConfig {
            initial_cash: 90_000.0,
            ..sample_config()
        };

        let result = run_simulation(config, rotation_prices(), rotation_source()).unwrap();

        let day2: Vec<_> = result.trades.iter().filter(|t| t.date == jan(2)).collect();
        let summary: Vec<(&str, TradeAction)> =
            day2.iter().map(|t| (t.symbol.as_str(), t.action)).collect();
        assert_eq!(
            summary,
            vec![
                ("A", TradeAction::Sell),
                ("C", TradeAction::Sell),
                ("B", TradeAction::Buy),
                ("D", TradeAction::Buy),
            ]
        );
        assert_relative_eq!(day2[0].quantity, 300.0, epsilon = 1e-6);
        assert_relative_eq!(day2[1].quantity, 300.0, epsilon = 1e-6);
        assert_relative_eq!(day2[2].quantity, 150.0, epsilon = 1e-6);
        assert_relative_eq!(day2[3].quantity, 450.0, epsilon = 1e-6);

        let after = &result.snapshots[1];
        assert!(!after.positions.contains_key("A"));
        assert!(!after.positions.contains_key("C"));
        assert_relative_eq!(after.weight_of("B"), 0.5, epsilon = 1e-9);
        assert_relative_eq!(after.weight_of("D"), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn on_target_days_emit_no_trades() {
        let config = allotrader::domain::backtest::BacktestConfig {
            initial_cash: 90_000.0,
            ..sample_config()
        };

        let result = run_simulation(config, rotation_prices(), rotation_source()).unwrap();

        assert!(result.trades.iter().all(|t| t.date != jan(3)));
        assert!(result.snapshots[2].rebalanced);
    }

    #[test]
    fn full_rotation_changes_value_only_by_costs() {
        let config = allotrader::domain::backtest::BacktestConfig {
            initial_cash: 90_000.0,
            commission_rate: 0.002,
            slippage_rate: 0.001,
            ..sample_config()
        };

        let result = run_simulation(config, rotation_prices(), rotation_source()).unwrap();

        let costs_through_day2: f64 = result
            .trades
            .iter()
            .filter(|t| t.date <= jan(2))
            .map(|t| t.costs())
            .sum();
        assert_relative_eq!(
            result.snapshots[1].total_value,
            90_000.0 - costs_through_day2,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            result.final_value(),
            90_000.0 - total_costs(&result),
            max_relative = 1e-9
        );
    }
}

mod coverage {
    use super::*;

    #[test]
    fn universe_symbol_without_data_is_fatal() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 5, 100.0, 0.0))]);
        let source = ScriptedSource::constant(&["SPY", "XYZ"], &[("SPY", 0.5), ("XYZ", 0.5)]);

        let err = run_simulation(sample_config(), prices, source).unwrap_err();

        match err {
            AllotraderError::MissingPriceData { symbols } => assert_eq!(symbols, vec!["XYZ"]),
            other => panic!("expected MissingPriceData, got {other:?}"),
        }
    }

    #[test]
    fn late_listing_is_incomplete_coverage() {
        let prices = store_with(vec![
            ("SPY", generate_bars("SPY", jan(1), 10, 100.0, 0.0)),
            ("NEW", generate_bars("NEW", jan(5), 6, 10.0, 0.0)),
        ]);
        let source = ScriptedSource::constant(&["SPY", "NEW"], &[("SPY", 0.5), ("NEW", 0.5)]);

        let err = run_simulation(sample_config(), prices, source).unwrap_err();

        assert!(matches!(err, AllotraderError::IncompleteCoverage { ref symbol, .. } if symbol == "NEW"));
    }

    #[test]
    fn failed_fetches_load_empty_and_fail_coverage() {
        let port = MockDataPort::new()
            .with_bars("SPY", generate_bars("SPY", jan(1), 5, 100.0, 0.0))
            .with_error("BAD", "connection reset");
        let symbols = vec!["BAD".to_string(), "SPY".to_string()];

        let prices = load_price_store(&port, &symbols, jan(1), jan(31));
        assert!(!prices.has_data("BAD"));
        assert!(prices.has_data("SPY"));

        let source = ScriptedSource::constant(&["BAD", "SPY"], &[("SPY", 1.0)]);
        let err = run_simulation(sample_config(), prices, source).unwrap_err();
        assert!(matches!(err, AllotraderError::MissingPriceData { .. }));
    }

    #[test]
    fn gaps_inside_the_range_mark_stale() {
        let mut tlt = generate_bars("TLT", jan(1), 5, 50.0, 0.0);
        tlt.remove(2);
        let prices = store_with(vec![
            ("SPY", generate_bars("SPY", jan(1), 5, 100.0, 0.0)),
            ("TLT", tlt),
        ]);
        let source = ScriptedSource::constant(&["SPY", "TLT"], &[("SPY", 0.5), ("TLT", 0.5)]);
        let config = allotrader::domain::backtest::BacktestConfig {
            rebalance_frequency: RebalanceFrequency::Monthly,
            ..sample_config()
        };

        let result = run_simulation(config, prices, source).unwrap();

        let gap = &result.snapshots[2];
        assert_eq!(gap.date, jan(3));
        assert!(gap
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::StaleMark && w.symbol.as_deref() == Some("TLT")));
        assert_relative_eq!(gap.positions["TLT"], 50_000.0, epsilon = 1e-6);
    }
}

mod schedule {
    use super::*;

    #[test]
    fn signals_requested_once_per_rebalance_date() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 75, 100.0, 0.5))]);
        let source = ScriptedSource::constant(&["SPY"], &[("SPY", 1.0)]);
        let calls = source.calls.clone();
        let config = allotrader::domain::backtest::BacktestConfig {
            end_date: date(2024, 3, 31),
            rebalance_frequency: RebalanceFrequency::Monthly,
            ..sample_config()
        };

        let result = run_simulation(config, prices, source).unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![jan(1), date(2024, 2, 1), date(2024, 3, 1)]
        );
        assert_eq!(result.snapshots.len(), 75);
        assert_eq!(result.snapshots.iter().filter(|s| s.rebalanced).count(), 3);
    }

    #[test]
    fn final_date_only_liquidates() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 4, 100.0, 1.0))]);
        let source = ScriptedSource::constant(&["SPY"], &[("SPY", 1.0)]);
        let calls = source.calls.clone();

        let result = run_simulation(sample_config(), prices, source).unwrap();

        assert!(!calls.lock().unwrap().contains(&jan(4)));
        let last = result.snapshots.last().unwrap();
        assert!(!last.rebalanced);
        assert!(last.positions.is_empty());
        assert_relative_eq!(last.cash, last.total_value);
    }
}

mod determinism_and_cancellation {
    use super::*;

    static CANCEL: AtomicBool = AtomicBool::new(false);

    struct CancelOnSecondCall {
        calls: usize,
    }

    impl SignalSource for CancelOnSecondCall {
        fn name(&self) -> &str {
            "cancel-on-second-call"
        }

        fn universe(&self) -> Vec<String> {
            vec!["SPY".to_string()]
        }

        fn signals(&mut self, _date: NaiveDate, _prices: &PriceView<'_>) -> Vec<Signal> {
            self.calls += 1;
            if self.calls == 2 {
                CANCEL.store(true, Ordering::SeqCst);
            }
            vec![Signal::long("SPY", 1.0)]
        }
    }

    fn build() -> allotrader::domain::backtest::BacktestResult {
        let prices = store_with(vec![
            ("SPY", generate_bars("SPY", jan(1), 20, 100.0, 1.5)),
            ("TLT", generate_bars("TLT", jan(1), 20, 80.0, -0.5)),
        ]);
        let source = ScriptedSource::new(&["SPY", "TLT"])
            .at(jan(1), vec![Signal::long("SPY", 0.7), Signal::long("TLT", 0.3)])
            .at(jan(8), vec![Signal::long("SPY", 0.2), Signal::long("TLT", 0.8)]);
        let config = allotrader::domain::backtest::BacktestConfig {
            commission_rate: 0.001,
            slippage_rate: 0.001,
            ..sample_config()
        };
        run_simulation(config, prices, source).unwrap()
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        assert_eq!(build(), build());
    }

    #[test]
    fn cancellation_keeps_snapshots_and_skips_liquidation() {
        let prices = store_with(vec![("SPY", generate_bars("SPY", jan(1), 10, 100.0, 1.0))]);
        let simulation = Simulation::new(SimulationContext {
            config: sample_config(),
            prices,
            source: Box::new(CancelOnSecondCall { calls: 0 }),
        })
        .unwrap();

        let result = simulation.run_with_cancel(&CANCEL);

        assert!(result.cancelled);
        assert_eq!(result.snapshots.len(), 2);
        assert!(result.trades.iter().all(|t| t.action == TradeAction::Buy));
        assert!(!result.snapshots[1].positions.is_empty());
    }
}

mod invariants {
    use super::*;
    use proptest::prelude::*;

    fn weighted_source(weights: &[(f64, f64)]) -> ScriptedSource {
        weights.iter().enumerate().fold(
            ScriptedSource::new(&["AAA", "BBB"]),
            |source, (i, &(a, b))| {
                source.at(
                    jan(1) + chrono::Duration::days(i as i64),
                    vec![Signal::long("AAA", a), Signal::long("BBB", b)],
                )
            },
        )
    }

    proptest! {
        #[test]
        fn cash_never_negative_and_invested_within_value(
            closes_a in prop::collection::vec(1.0f64..500.0, 8),
            closes_b in prop::collection::vec(1.0f64..500.0, 8),
            weights in prop::collection::vec((0.0f64..1.0, 0.0f64..1.0), 8),
            commission in 0.0f64..0.01,
            slippage in 0.0f64..0.01,
        ) {
            let prices = store_with(vec![
                ("AAA", bars_from_closes("AAA", jan(1), &closes_a)),
                ("BBB", bars_from_closes("BBB", jan(1), &closes_b)),
            ]);
            let config = allotrader::domain::backtest::BacktestConfig {
                commission_rate: commission,
                slippage_rate: slippage,
                ..sample_config()
            };

            let result = run_simulation(config, prices, weighted_source(&weights)).unwrap();

            for snap in &result.snapshots {
                prop_assert!(snap.cash >= 0.0);
                prop_assert!(snap.total_value.is_finite());
                prop_assert!(snap.positions.values().all(|v| *v >= 0.0));
                prop_assert!(snap.invested_value() <= snap.total_value * (1.0 + 1e-9));
            }
            prop_assert!(result.snapshots.last().unwrap().positions.is_empty());
        }

        #[test]
        fn flat_prices_lose_exactly_the_costs(
            weights in prop::collection::vec((0.0f64..1.0, 0.0f64..1.0), 6),
            commission in 0.0f64..0.01,
            slippage in 0.0f64..0.01,
        ) {
            let prices = store_with(vec![
                ("AAA", generate_bars("AAA", jan(1), 6, 40.0, 0.0)),
                ("BBB", generate_bars("BBB", jan(1), 6, 250.0, 0.0)),
            ]);
            let config = allotrader::domain::backtest::BacktestConfig {
                commission_rate: commission,
                slippage_rate: slippage,
                ..sample_config()
            };

            let result = run_simulation(config, prices, weighted_source(&weights)).unwrap();

            let expected = 100_000.0 - total_costs(&result);
            prop_assert!((result.final_value() - expected).abs() < 1e-6);
        }
    }
}
