mod common;

use common::{io_error, pool, status, DrainingSelector, ScriptedExecutor};
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use waypoint::{
    Backoff, Dispatcher, FixedRetryFactory, InstantSleeper, Jitter, ServiceInstance,
    ServiceRequest, SimpleRetryPolicy, TrackingSleeper,
};

fn retrying_factory(same: usize, next: usize) -> FixedRetryFactory {
    FixedRetryFactory::new().with_policy(
        SimpleRetryPolicy::new(same, next)
            .with_retryable_status(StatusCode::SERVICE_UNAVAILABLE)
            .with_retryable_status(StatusCode::INTERNAL_SERVER_ERROR),
    )
}

#[tokio::test]
async fn returns_response_on_first_success() {
    let executor = ScriptedExecutor::new(vec![status(StatusCode::OK)]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 1))
        .executor(executor.clone())
        .build()
        .unwrap();

    let response = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn error_status_without_policy_is_returned_after_one_attempt() {
    let executor = ScriptedExecutor::new(vec![status(StatusCode::SERVICE_UNAVAILABLE)]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 2))
        .executor(executor.clone())
        .build()
        .unwrap();

    let response = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(executor.calls(), 1, "no policy means no retry loop");
}

#[tokio::test]
async fn disabled_retry_behaves_like_absent_policy() {
    let executor = ScriptedExecutor::new(vec![
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::OK),
    ]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 2))
        .executor(executor.clone())
        .retry_factory(retrying_factory(0, 2))
        .retry_enabled(false)
        .build()
        .unwrap();

    let response = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn retryable_status_exhausts_budget_and_wraps_last_outcome() {
    let executor = ScriptedExecutor::new(vec![
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::SERVICE_UNAVAILABLE),
    ]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 3))
        .executor(executor.clone())
        .retry_factory(retrying_factory(0, 2))
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();

    let err = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap_err();
    assert_eq!(executor.calls(), 3);
    assert!(err.is_retry_exhausted());
    assert_eq!(err.attempts(), Some(3));
    assert_eq!(
        err.last_failure().and_then(|f| f.status()),
        Some(StatusCode::SERVICE_UNAVAILABLE)
    );
}

#[tokio::test]
async fn recovers_when_a_retry_succeeds() {
    let executor = ScriptedExecutor::new(vec![
        status(StatusCode::INTERNAL_SERVER_ERROR),
        status(StatusCode::OK),
    ]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 2))
        .executor(executor.clone())
        .retry_factory(retrying_factory(0, 2))
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();

    let response = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn non_retryable_status_takes_exactly_one_attempt() {
    let executor = ScriptedExecutor::new(vec![status(StatusCode::NOT_FOUND)]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 2))
        .executor(executor.clone())
        .retry_factory(retrying_factory(0, 5))
        .build()
        .unwrap();

    let response = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn transport_errors_retry_then_succeed() {
    let executor =
        ScriptedExecutor::new(vec![io_error("connection reset"), status(StatusCode::OK)]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 2))
        .executor(executor.clone())
        .retry_factory(retrying_factory(0, 2))
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();

    let response = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn non_retryable_transport_error_propagates() {
    let executor = ScriptedExecutor::new(vec![io_error("connection reset")]);
    let factory = FixedRetryFactory::new().with_policy(
        SimpleRetryPolicy::new(0, 5)
            .with_retryable_status(StatusCode::SERVICE_UNAVAILABLE)
            .retry_transport_errors(false),
    );
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 2))
        .executor(executor.clone())
        .retry_factory(factory)
        .build()
        .unwrap();

    let err = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn rotation_targets_a_fresh_instance_each_retry() {
    let executor = ScriptedExecutor::new(vec![
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::SERVICE_UNAVAILABLE),
    ]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 3))
        .executor(executor.clone())
        .retry_factory(retrying_factory(0, 2))
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();

    let _ = dispatcher.execute("orders", ServiceRequest::get("/")).await;
    let targets = executor.targets();
    assert_eq!(targets.len(), 3);
    assert_eq!(targets.iter().collect::<std::collections::HashSet<_>>().len(), 3);
}

#[tokio::test]
async fn pinning_policy_stays_on_the_failed_instance() {
    let executor = ScriptedExecutor::new(vec![
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::SERVICE_UNAVAILABLE),
    ]);
    let factory = FixedRetryFactory::new().with_policy(
        SimpleRetryPolicy::new(2, 0).with_retryable_status(StatusCode::SERVICE_UNAVAILABLE),
    );
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 3))
        .executor(executor.clone())
        .retry_factory(factory)
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();

    let err = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap_err();
    assert!(err.is_retry_exhausted());
    let targets = executor.targets();
    assert_eq!(targets.len(), 3);
    assert_eq!(targets.iter().collect::<std::collections::HashSet<_>>().len(), 1);
}

#[tokio::test]
async fn pinned_instance_is_used_for_the_first_attempt() {
    let executor = ScriptedExecutor::new(vec![status(StatusCode::OK)]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 3))
        .executor(executor.clone())
        .build()
        .unwrap();

    let pinned = Arc::new(ServiceInstance::new("orders", "192.168.7.7", 9000));
    let response = dispatcher
        .execute_pinned("orders", pinned.clone(), ServiceRequest::get("/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(executor.targets(), vec!["192.168.7.7:9000".to_string()]);
}

#[tokio::test]
async fn selector_failure_before_the_first_attempt() {
    let executor = ScriptedExecutor::new(vec![]);
    let dispatcher = Dispatcher::builder()
        .selector(DrainingSelector::new("orders", 0))
        .executor(executor.clone())
        .build()
        .unwrap();

    let err = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap_err();
    assert!(err.is_no_instance_available());
    assert_eq!(executor.calls(), 0, "selection failed before any attempt");
}

#[tokio::test]
async fn selector_failure_during_rotation_surfaces_no_instance_available() {
    let executor = ScriptedExecutor::new(vec![status(StatusCode::SERVICE_UNAVAILABLE)]);
    let dispatcher = Dispatcher::builder()
        .selector(DrainingSelector::new("orders", 1))
        .executor(executor.clone())
        .retry_factory(retrying_factory(0, 2))
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();

    let err = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap_err();
    assert!(err.is_no_instance_available());
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn empty_service_name_is_rejected_without_attempts() {
    let executor = ScriptedExecutor::new(vec![]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 1))
        .executor(executor.clone())
        .build()
        .unwrap();

    let err = dispatcher.execute("", ServiceRequest::get("/")).await.unwrap_err();
    assert!(err.is_invalid_request());
    assert_eq!(executor.calls(), 0);
}

#[tokio::test]
async fn backoff_delays_follow_the_attempt_count() {
    let sleeper = TrackingSleeper::new();
    let executor = ScriptedExecutor::new(vec![
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::SERVICE_UNAVAILABLE),
    ]);
    let factory = retrying_factory(0, 2).with_backoff(Backoff::linear(Duration::from_millis(100)));
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 3))
        .executor(executor.clone())
        .retry_factory(factory)
        .with_jitter(Jitter::None)
        .with_sleeper(sleeper.clone())
        .build()
        .unwrap();

    let _ = dispatcher.execute("orders", ServiceRequest::get("/")).await;
    // a delay before each retry, none after the terminal attempt
    assert_eq!(
        sleeper.recorded(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test]
async fn concurrent_dispatches_are_independent() {
    let executor = ScriptedExecutor::new(vec![]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 3))
        .executor(executor.clone())
        .retry_factory(retrying_factory(0, 2))
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();

    let results = futures::future::join_all(
        (0..8).map(|_| dispatcher.execute("orders", ServiceRequest::get("/"))),
    )
    .await;

    assert!(results.into_iter().all(|r| r.is_ok()));
    assert_eq!(executor.calls(), 8);
}

#[tokio::test]
async fn absent_backoff_policy_means_no_delay() {
    let sleeper = TrackingSleeper::new();
    let executor = ScriptedExecutor::new(vec![
        status(StatusCode::SERVICE_UNAVAILABLE),
        status(StatusCode::OK),
    ]);
    let dispatcher = Dispatcher::builder()
        .selector(pool("orders", 2))
        .executor(executor.clone())
        .retry_factory(retrying_factory(0, 2))
        .with_sleeper(sleeper.clone())
        .build()
        .unwrap();

    let response = dispatcher.execute("orders", ServiceRequest::get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(sleeper.recorded().is_empty());
}
