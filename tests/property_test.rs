//! Randomised checks of ledger, sizing and execution invariants.

mod common;

use std::collections::HashMap;

use common::date;
use proptest::prelude::*;
use stratsim::domain::execution::{ExecutionOutcome, ExecutionSimulator, Order};
use stratsim::domain::portfolio::PortfolioLedger;
use stratsim::domain::position::Side;
use stratsim::domain::signal::Signal;
use stratsim::domain::sizing::PositionSizer;

#[derive(Debug, Clone)]
struct Step {
    buy: bool,
    shares: u64,
    price: f64,
}

fn step() -> impl Strategy<Value = Step> {
    (any::<bool>(), 0u64..400, 1.0f64..500.0).prop_map(|(buy, shares, price)| Step {
        buy,
        shares,
        price,
    })
}

proptest! {
    #[test]
    fn ledger_never_goes_negative(
        steps in prop::collection::vec(step(), 1..60),
        commission in 0.0f64..20.0,
        slippage in 0.0f64..2.0,
    ) {
        let sim = ExecutionSimulator::new(commission, slippage);
        let mut ledger = PortfolioLedger::new(50_000.0);

        for s in &steps {
            let order = Order {
                symbol: "PROP",
                shares: s.shares,
                reference_price: s.price,
                side: if s.buy { Side::Buy } else { Side::Sell },
                timestamp: date(2024, 1, 2),
                reason: "prop",
            };
            let held_before = ledger.held_quantity("PROP");
            let cash_before = ledger.cash();

            match sim.execute(&mut ledger, &order).unwrap() {
                ExecutionOutcome::Filled(trade) => {
                    prop_assert!((ledger.cash() - (cash_before + trade.cash_delta())).abs() < 1e-6);
                    let expected = if s.buy { held_before + s.shares } else { held_before - s.shares };
                    prop_assert_eq!(ledger.held_quantity("PROP"), expected);
                }
                ExecutionOutcome::Rejected(_) => {
                    prop_assert_eq!(ledger.cash(), cash_before);
                    prop_assert_eq!(ledger.held_quantity("PROP"), held_before);
                }
            }
            prop_assert!(ledger.cash() >= 0.0);
        }

        let replayed: f64 = 50_000.0 + ledger.trades().iter().map(|t| t.cash_delta()).sum::<f64>();
        prop_assert!((replayed - ledger.cash()).abs() < 1e-6);
    }

    #[test]
    fn current_value_is_idempotent(
        shares in 1u64..200,
        entry in 1.0f64..300.0,
        mark in 1.0f64..300.0,
    ) {
        let sim = ExecutionSimulator::new(0.0, 0.0);
        let mut ledger = PortfolioLedger::new(1_000_000.0);
        let order = Order {
            symbol: "IDEM",
            shares,
            reference_price: entry,
            side: Side::Buy,
            timestamp: date(2024, 1, 2),
            reason: "prop",
        };
        sim.execute(&mut ledger, &order).unwrap();

        let prices = HashMap::from([("IDEM".to_string(), mark)]);
        let first = ledger.current_value(&prices);
        let second = ledger.current_value(&prices);
        prop_assert_eq!(first, second);
        let expected = ledger.cash() + shares as f64 * mark;
        prop_assert!((first - expected).abs() < 1e-6);
    }

    #[test]
    fn sized_buy_stays_within_bounds(
        risk in 0.001f64..1.0,
        value in 1_000.0f64..1_000_000.0,
        cash_share in 0.0f64..1.0,
        price in 0.5f64..1_000.0,
    ) {
        let sizer = PositionSizer::default();
        let cash = value * cash_share;
        let shares = sizer.size(&Signal::buy(risk, "prop"), value, cash, price);
        let committed = shares as f64 * price;

        prop_assert!(committed <= value * 0.20 + 1e-6);
        prop_assert!(committed <= cash + 1e-6);
    }
}
