mod common;

use std::time::Duration;

use common::{Harness, LEG1, LEG2, LEG3};
use ratio_spread_core::{ExitReason, Severity, StrategyConfig, StrategyState};
use ratio_spread_paper::ScriptedOutcome;

#[tokio::test(start_paused = true)]
async fn exit_retries_only_the_unclosed_leg() {
    let h = Harness::new(StrategyConfig::nifty_ratio_spread());
    let (mut runner, _handle) = h.runner();
    runner.step().await.unwrap();

    h.gateway.script(
        LEG2,
        [ScriptedOutcome::NetworkError, ScriptedOutcome::NetworkError],
    );
    let closed = runner.manual_exit().await.unwrap();

    assert_eq!(closed.exit_reason(), Some(ExitReason::Manual));
    assert_eq!(closed.net_quantity(), 0);
    assert!(h.gateway.is_flat());
    // entry + exits
    assert_eq!(h.orders_for(LEG1), 2);
    assert_eq!(h.orders_for(LEG2), 4);
    assert_eq!(h.orders_for(LEG3), 2);
    assert!(h.sink.alerts(Severity::Critical).is_empty());
    assert_eq!(runner.state(), StrategyState::Idle);
}

#[tokio::test(start_paused = true)]
async fn slow_retries_escalate_with_attempt_count() {
    let mut config = StrategyConfig::nifty_ratio_spread();
    config.exit_retry.max_fast_attempts = 1;
    let h = Harness::new(config);
    let (mut runner, _handle) = h.runner();
    runner.step().await.unwrap();

    h.gateway.script(
        LEG2,
        [
            ScriptedOutcome::Reject("freeze".to_string()),
            ScriptedOutcome::Reject("freeze".to_string()),
            ScriptedOutcome::Reject("freeze".to_string()),
        ],
    );
    let started = tokio::time::Instant::now();
    runner.manual_exit().await.unwrap();

    let alerts = h.sink.alerts(Severity::Critical);
    assert_eq!(alerts.len(), 3);
    assert!(alerts[0].contains("after 1 attempts"));
    assert!(alerts[1].contains("after 2 attempts"));
    assert!(alerts[1].contains("retrying in 60s"));
    assert!(alerts[2].contains("after 3 attempts"));
    assert!(started.elapsed() >= Duration::from_secs(121));
    assert!(h.gateway.is_flat());
}

#[tokio::test(start_paused = true)]
async fn late_exit_fill_is_not_sent_twice() {
    let h = Harness::new(StrategyConfig::nifty_ratio_spread());
    let (mut runner, _handle) = h.runner();
    runner.step().await.unwrap();

    h.gateway.script(LEG2, [ScriptedOutcome::LateFill]);
    runner.manual_exit().await.unwrap();

    assert!(h.gateway.is_flat());
    assert_eq!(h.orders_for(LEG2), 2);
    assert_eq!(runner.state(), StrategyState::Idle);
}

#[tokio::test(start_paused = true)]
async fn exit_holds_resend_while_order_state_is_unknown() {
    let h = Harness::new(StrategyConfig::nifty_ratio_spread());
    let (mut runner, _handle) = h.runner();
    runner.step().await.unwrap();

    h.gateway.script(LEG2, [ScriptedOutcome::Stuck]);
    let exit = tokio::spawn(async move { runner.manual_exit().await });
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert!(!exit.is_finished());
    // entry + the one stuck exit order
    assert_eq!(h.orders_for(LEG2), 2);
    assert_eq!(h.gateway.net_position(LEG2), -150);

    let position = h.ledger.get("NIFTY").unwrap();
    assert_eq!(position.status, StrategyState::Exiting);
    assert_eq!(position.exit_reason, Some(ExitReason::Manual));
    assert_eq!(position.unclosed_quantity(0), 0);
    assert_eq!(position.unclosed_quantity(1), 150);
    assert_eq!(position.unclosed_quantity(2), 0);
    exit.abort();
}
