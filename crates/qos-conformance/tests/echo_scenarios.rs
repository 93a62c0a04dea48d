#![cfg(unix)]

mod common;

use common::{Bus, FAKE_IMPLEMENTATION, IGNORE_QOS_ENV};
use qos_conformance::assertions::AssertionFailure;
use qos_conformance::logging::init_test_tracing;
use qos_conformance::{ConformanceError, Scenario, ScenarioRunner, TestMode};

fn scenario(name: &str, topic: &str, provide_qos: bool, compatible_qos: bool) -> Scenario {
    Scenario::new(name, topic, TestMode::Echo, provide_qos, compatible_qos)
}

#[tokio::test]
async fn echo_basic_prints_the_message() {
    init_test_tracing();
    let bus = Bus::new();
    let node = bus.node();
    let runner = ScenarioRunner::new(node.clone(), bus.config(), FAKE_IMPLEMENTATION);

    let result = runner
        .run(&scenario("echo_basic", "/t1", false, true))
        .await
        .expect("default QoS must be echoed");

    assert_eq!(result.observed_count, None);
    assert!(result.captured_lines.iter().any(|l| l == "data: hello"));
    assert_eq!(node.live_endpoints(), 0);
}

#[tokio::test]
async fn echo_compatible_qos_prints_the_message() {
    init_test_tracing();
    let bus = Bus::new();
    let node = bus.node();
    let runner = ScenarioRunner::new(node.clone(), bus.config(), FAKE_IMPLEMENTATION);

    let result = runner
        .run(&scenario("echo_compatible_qos", "/t2", true, true))
        .await
        .expect("lenient echo of a strict publisher must print");

    assert!(result.captured_lines.contains(&"data: hello".to_owned()));
    assert!(result
        .captured_lines
        .iter()
        .all(|l| !l.contains(FAKE_IMPLEMENTATION) && !l.trim().is_empty()));
}

#[tokio::test]
async fn echo_incompatible_qos_prints_nothing() {
    init_test_tracing();
    let bus = Bus::new();
    let node = bus.node();
    let runner = ScenarioRunner::new(node.clone(), bus.config(), FAKE_IMPLEMENTATION);

    let result = runner
        .run(&scenario("echo_incompatible_qos", "/t3", true, false))
        .await
        .expect("strict echo of a lenient publisher must stay silent");

    // the banner naming the implementation is filtered out
    assert!(result.captured_lines.is_empty(), "{:?}", result.captured_lines);
    assert_eq!(result.attempts, 1);
    assert_eq!(node.live_endpoints(), 0);
}

#[tokio::test]
async fn echo_prints_the_configured_payload() {
    init_test_tracing();
    let bus = Bus::new();
    let node = bus.node();
    let mut config = bus.config();
    config.payload = "goodbye".to_owned();
    let runner = ScenarioRunner::new(node.clone(), config, FAKE_IMPLEMENTATION);

    let result = runner
        .run(&scenario("echo_basic", "/t1", false, true))
        .await
        .expect("payload is echoed verbatim");

    assert!(result.captured_lines.iter().any(|l| l == "data: goodbye"));
    assert!(!result.captured_lines.iter().any(|l| l == "data: hello"));
}

#[tokio::test]
async fn echo_incompatible_qos_fails_when_cli_ignores_qos() {
    init_test_tracing();
    let bus = Bus::new();
    let node = bus.node();
    let config = bus
        .config()
        .with_env(IGNORE_QOS_ENV, "1")
        .with_retry_attempts(2);
    let runner = ScenarioRunner::new(node.clone(), config, FAKE_IMPLEMENTATION);

    let err = runner
        .run(&scenario("echo_incompatible_qos", "/t3", true, false))
        .await
        .unwrap_err();

    match err {
        ConformanceError::Assertion(AssertionFailure::UnexpectedOutput { lines }) => {
            assert!(lines.contains(&"data: hello".to_owned()), "{lines:?}");
        }
        other => panic!("expected unexpected output, got {other}"),
    }
    assert_eq!(node.created_endpoints(), 2);
    assert_eq!(node.live_endpoints(), 0);
}
