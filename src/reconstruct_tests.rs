//! Unit tests for the state reconstructor - ordering, fold and diagnostics.

#[cfg(test)]
mod reconstruct_tests {
    use crate::constants::diagnostics;
    use crate::error::ReplayError;
    use crate::events::{Event, OptionStrategy, TradeAction};
    use crate::ledger::options::OptionStatus;
    use crate::reconstruct::*;
    use crate::test_support::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn sample_log() -> Vec<Event> {
        vec![
            deposit(1, dec!(10000)),
            buy(2, "TSLA", dec!(10), dec!(100)),
            option_open(3, "A", "SOFI", OptionStrategy::CashSecuredPut, dec!(30), 1, dec!(400)),
            price_update(4, ts(4), &[("TSLA", dec!(120)), ("SOFI", dec!(28))]),
            sell(5, "TSLA", dec!(4), dec!(150)),
            option_assign(6, "A", TradeAction::Buy, Some(dec!(100))),
            dividend(7, "SOFI", dec!(12)),
            option_open(8, "B", "SOFI", OptionStrategy::CoveredCall, dec!(35), 1, dec!(80)),
            option_expire(9, "B"),
            withdrawal(10, dec!(500)),
            note(11, "quarter end"),
        ]
    }

    // ============= Ordering Tests =============

    #[test]
    fn test_empty_log_gives_zero_snapshot() {
        let result = reconstruct(&[], None, &opts()).unwrap();
        let snap = &result.snapshot;

        assert!(result.is_complete());
        assert!(result.diagnostics.is_empty());
        assert_eq!(snap.as_of_event_id(), None);
        assert_eq!(snap.cash_balance(), Decimal::ZERO);
        assert!(snap.holdings().is_empty());
        assert_eq!(snap.ytd_income(), Decimal::ZERO);
    }

    #[test]
    fn test_duplicate_event_id_refuses_to_start() {
        let events = vec![deposit(1, dec!(10)), deposit(1, dec!(20))];
        let err = reconstruct(&events, None, &opts()).unwrap_err();
        assert_eq!(err, ReplayError::Ordering { event_id: 1, previous_id: 1 });
    }

    #[test]
    fn test_decreasing_event_id_refuses_to_start() {
        let events = vec![deposit(5, dec!(10)), deposit(3, dec!(20))];
        assert!(matches!(
            reconstruct(&events, None, &opts()),
            Err(ReplayError::Ordering { event_id: 3, previous_id: 5 })
        ));
    }

    #[test]
    fn test_suffix_must_follow_starting_snapshot() {
        let head = [deposit(1, dec!(10)), deposit(2, dec!(10))];
        let first = reconstruct(&head, None, &opts()).unwrap();
        let err = reconstruct(&[deposit(2, dec!(5))], Some(&first.snapshot), &opts()).unwrap_err();
        assert_eq!(err, ReplayError::Ordering { event_id: 2, previous_id: 2 });
    }

    #[test]
    fn test_gaps_in_event_ids_are_allowed() {
        let events = vec![deposit(1, dec!(10)), deposit(7, dec!(10)), deposit(40, dec!(10))];
        let result = reconstruct(&events, None, &opts()).unwrap();
        assert_eq!(result.snapshot.as_of_event_id(), Some(40));
        assert_eq!(result.snapshot.cash_balance(), dec!(30));
    }

    // ============= Full Replay Tests =============

    #[test]
    fn test_sample_log_replay() {
        let result = reconstruct(&sample_log(), None, &opts()).unwrap();
        let snap = &result.snapshot;

        assert!(result.is_complete());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
        assert_eq!(snap.as_of_event_id(), Some(11));
        assert_eq!(snap.events_applied(), 11);

        // 10000 - 1000 + 400 + 600 + 12 + 80 - 500
        assert_eq!(snap.cash_balance(), dec!(9592));
        assert_eq!(snap.shares("TSLA"), dec!(6));
        assert_eq!(snap.shares("SOFI"), dec!(100));
        assert_eq!(snap.avg_cost("SOFI"), Some(dec!(30)));

        assert_eq!(snap.realized().trades, dec!(200));
        assert_eq!(snap.realized().options, dec!(480));
        // 200 trade gains + 480 premiums + 12 dividends
        assert_eq!(snap.ytd_income(), dec!(692));

        assert_eq!(snap.option("A").unwrap().status, OptionStatus::Assigned);
        assert_eq!(snap.option("B").unwrap().status, OptionStatus::Expired);
        assert_eq!(snap.open_options().count(), 0);
    }

    #[test]
    fn test_unrealized_pnl_from_latest_prices() {
        let result = reconstruct(&sample_log(), None, &opts()).unwrap();
        let snap = &result.snapshot;

        let tsla = &snap.valuations()["TSLA"];
        assert_eq!(tsla.market_value, Some(dec!(720)));
        assert_eq!(tsla.unrealized_pnl, Some(dec!(120)));

        let sofi = &snap.valuations()["SOFI"];
        assert_eq!(sofi.unrealized_pnl, Some(dec!(-200)));

        assert_eq!(snap.total_unrealized_pnl(), dec!(-80));
        assert_eq!(snap.market_value(), dec!(3520));
        assert_eq!(snap.net_worth(), dec!(13112));
    }

    #[test]
    fn test_holding_without_price_has_no_valuation() {
        let result = reconstruct(&[buy(1, "RIVN", dec!(5), dec!(10))], None, &opts()).unwrap();
        let v = &result.snapshot.valuations()["RIVN"];
        assert_eq!(v.cost_basis, dec!(50));
        assert_eq!(v.market_value, None);
        assert_eq!(result.snapshot.total_unrealized_pnl(), Decimal::ZERO);
    }

    #[test]
    fn test_income_outside_ytd_year_excluded() {
        let mut old = dividend(1, "KO", dec!(10));
        old.timestamp = ts(0) - chrono::Duration::days(30);
        let events = vec![old, dividend(2, "KO", dec!(5))];

        let result = reconstruct(&events, None, &opts()).unwrap();
        assert_eq!(result.snapshot.ytd_income(), dec!(5));
        assert_eq!(result.snapshot.income_for_year(YEAR - 1), dec!(10));
        assert_eq!(result.snapshot.cash_balance(), dec!(15));
    }

    // ============= Diagnostics Tests =============

    #[test]
    fn test_unknown_option_close_is_skipped() {
        let events = vec![
            deposit(1, dec!(100)),
            option_close(2, "nope", dec!(50)),
            deposit(3, dec!(100)),
        ];
        let result = reconstruct(&events, None, &opts()).unwrap();

        assert!(result.is_complete());
        assert_eq!(result.diagnostics.len(), 1);
        let d = &result.diagnostics[0];
        assert_eq!(d.event_id, 2);
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.code, diagnostics::UNKNOWN_OPTION);
        assert_eq!(result.snapshot.cash_balance(), dec!(200));
        assert_eq!(result.snapshot.as_of_event_id(), Some(3));
        assert_eq!(result.snapshot.events_applied(), 2);
    }

    #[test]
    fn test_second_terminal_transition_is_skipped() {
        let events = vec![
            option_open(1, "A", "SOFI", OptionStrategy::CoveredCall, dec!(10), 1, dec!(50)),
            option_expire(2, "A"),
            option_close(3, "A", dec!(20)),
        ];
        let result = reconstruct(&events, None, &opts()).unwrap();

        assert_eq!(result.diagnostics[0].code, diagnostics::INVALID_TRANSITION);
        assert_eq!(result.snapshot.option("A").unwrap().status, OptionStatus::Expired);
        assert_eq!(result.snapshot.cash_balance(), dec!(50));
    }

    #[test]
    fn test_insufficient_shares_halts_with_last_consistent_state() {
        let events = vec![
            deposit(1, dec!(1000)),
            buy(2, "TSLA", dec!(2), dec!(100)),
            sell(3, "TSLA", dec!(5), dec!(100)),
            deposit(4, dec!(1000)),
        ];
        let result = reconstruct(&events, None, &opts()).unwrap();

        assert!(!result.is_complete());
        assert_eq!(result.failed_at(), Some(3));
        assert!(matches!(result.halted, Some(ReplayError::InsufficientShares { .. })));
        assert_eq!(result.snapshot.as_of_event_id(), Some(2));
        assert_eq!(result.snapshot.cash_balance(), dec!(800));
        assert_eq!(result.snapshot.shares("TSLA"), dec!(2));

        let last = result.diagnostics.last().unwrap();
        assert_eq!(last.severity, Severity::Fatal);
        assert_eq!(last.code, diagnostics::INSUFFICIENT_SHARES);
    }

    #[test]
    fn test_cash_overflow_halts_with_last_consistent_state() {
        // 5e28 twice does not fit in a Decimal
        let big = Decimal::from(5) * Decimal::from(10_u64.pow(14)) * Decimal::from(10_u64.pow(14));
        let events = vec![deposit(1, big), deposit(2, big), deposit(3, dec!(1))];
        let result = reconstruct(&events, None, &opts()).unwrap();

        assert_eq!(result.failed_at(), Some(2));
        assert!(matches!(
            result.halted,
            Some(ReplayError::ArithmeticOverflow { event_id: 2, .. })
        ));
        assert_eq!(result.snapshot.as_of_event_id(), Some(1));
        assert_eq!(result.snapshot.cash_balance(), big);

        let last = result.diagnostics.last().unwrap();
        assert_eq!(last.severity, Severity::Fatal);
        assert_eq!(last.code, diagnostics::ARITHMETIC_OVERFLOW);
    }

    #[test]
    fn test_warnings_do_not_stop_replay() {
        let events = vec![
            withdrawal(1, dec!(100)),
            buy(2, "AMD", dec!(1), dec!(100)).with_cash(dec!(-90)),
            deposit(3, dec!(500)),
        ];
        let result = reconstruct(&events, None, &opts()).unwrap();

        assert!(result.is_complete());
        let codes: Vec<&str> = result.diagnostics.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, vec![diagnostics::OVERDRAFT, diagnostics::RECONCILIATION]);
        assert!(result.diagnostics.iter().all(|d| d.severity == Severity::Warning));
        assert_eq!(result.snapshot.cash_balance(), dec!(310));
    }

    #[test]
    fn test_superseded_price_is_informational() {
        let events = vec![
            price_update(1, ts(10), &[("TSLA", dec!(200))]),
            price_update(2, ts(20), &[("AAPL", dec!(150))]),
            price_update(3, ts(5), &[("TSLA", dec!(180))]),
        ];
        let result = reconstruct(&events, None, &opts()).unwrap();

        let superseded: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.code == diagnostics::SUPERSEDED_PRICE)
            .collect();
        assert_eq!(superseded.len(), 1);
        assert_eq!(superseded[0].severity, Severity::Info);
        assert_eq!(result.snapshot.latest_prices()["TSLA"].price, dec!(200));
    }

    // ============= Replay Property Tests =============

    #[test]
    fn test_replay_is_idempotent() {
        let first = reconstruct(&sample_log(), None, &opts()).unwrap();
        let second = reconstruct(&sample_log(), None, &opts()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_incremental_matches_full_at_every_split() {
        let events = sample_log();
        let full = reconstruct(&events, None, &opts()).unwrap().snapshot;

        for k in 0..=events.len() {
            let head = reconstruct(&events[..k], None, &opts()).unwrap();
            let tail = reconstruct(&events[k..], Some(&head.snapshot), &opts()).unwrap();
            assert_eq!(tail.snapshot, full, "split at {}", k);
        }
    }

    #[test]
    fn test_cash_equals_sum_of_accepted_deltas() {
        let events = vec![
            deposit(1, dec!(1000)),
            option_close(2, "ghost", dec!(25)),
            buy(3, "AAPL", dec!(3), dec!(101.37)),
            option_open(4, "A", "AAPL", OptionStrategy::CoveredCall, dec!(120), 1, dec!(61.25)),
            option_open(5, "A", "AAPL", OptionStrategy::CoveredCall, dec!(120), 1, dec!(61.25)),
            sell(6, "AAPL", dec!(1), dec!(99.99)),
            withdrawal(7, dec!(2000)),
        ];
        let result = reconstruct(&events, None, &opts()).unwrap();

        let skipped: Vec<u64> = result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .map(|d| d.event_id)
            .collect();
        let expected: Decimal = events
            .iter()
            .filter(|e| !skipped.contains(&e.event_id))
            .map(Event::effective_cash_delta)
            .sum();

        assert_eq!(skipped, vec![2, 5]);
        assert_eq!(result.snapshot.cash_balance(), expected);
    }
}
