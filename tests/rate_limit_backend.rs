//! Distributed limiter tests against a mock Redis REST endpoint.

use std::sync::Arc;
use std::time::Duration;

use lead_intake::clock::SystemClock;
use lead_intake::config::RateLimitConfig;
use lead_intake::identity::IdentityHasher;
use lead_intake::rate_limit::{
    DistributedLimiter, RateLimitError, RateLimitIdentifier, RateLimiter, RedisRestLimiter,
};

mod common;
use common::{start_programmable_backend, test_config};

fn limiter(addr: std::net::SocketAddr) -> RedisRestLimiter {
    RedisRestLimiter::new(
        &format!("http://{}", addr),
        "upstash-token",
        "lead-intake:ratelimit",
        3,
        Duration::from_secs(3600),
        Duration::from_secs(2),
        Arc::new(SystemClock),
    )
    .unwrap()
}

#[tokio::test]
async fn test_eval_command_shape() {
    let (addr, captured) =
        start_programmable_backend(|_req| async { (200, r#"{"result": 2}"#.to_string()) }).await;

    let decision = limiter(addr)
        .limit(&RateLimitIdentifier::email("abc123"))
        .await
        .unwrap();
    assert!(decision.success);
    assert_eq!(decision.remaining, 2);

    let req = captured.lock().unwrap()[0].clone();
    assert_eq!(req.method, "POST");
    assert_eq!(req.header("authorization"), Some("Bearer upstash-token"));
    let command = req.json();
    assert_eq!(command[0], "EVAL");
    assert_eq!(command[2], "2");
    assert!(command[3]
        .as_str()
        .unwrap()
        .starts_with("lead-intake:ratelimit:email:abc123:"));
    assert_eq!(command[5], "3");
    assert_eq!(command[7], "3600000");
}

#[tokio::test]
async fn test_negative_result_denies() {
    let (addr, _captured) =
        start_programmable_backend(|_req| async { (200, r#"{"result": -1}"#.to_string()) }).await;

    let decision = limiter(addr)
        .limit(&RateLimitIdentifier::ip("def456"))
        .await
        .unwrap();
    assert!(!decision.success);
    assert_eq!(decision.remaining, 0);
}

#[tokio::test]
async fn test_backend_error_is_reported() {
    let (addr, _captured) = start_programmable_backend(|_req| async {
        (400, r#"{"error": "ERR wrong number of arguments"}"#.to_string())
    })
    .await;

    let err = limiter(addr)
        .limit(&RateLimitIdentifier::ip("def456"))
        .await
        .unwrap_err();
    assert!(matches!(err, RateLimitError::Backend(_)));
}

#[tokio::test]
async fn test_configured_credentials_select_distributed_backend() {
    let (addr, captured) =
        start_programmable_backend(|_req| async { (200, r#"{"result": 1}"#.to_string()) }).await;

    let config = RateLimitConfig {
        redis_rest_url: Some(format!("http://{}", addr)),
        redis_rest_token: Some("upstash-token".into()),
        ..RateLimitConfig::default()
    };
    let limiter = RateLimiter::new(
        config,
        IdentityHasher::new(test_config().hashing),
        Arc::new(SystemClock),
    );

    assert!(limiter.check_rate_limit("ann@example.com", "203.0.113.7").await);
    assert_eq!(limiter.backend_kind(), "distributed");
    assert_eq!(captured.lock().unwrap().len(), 2);
    assert!(limiter.memory_windows().is_empty());
}

#[tokio::test]
async fn test_unreachable_backend_fails_closed() {
    // Bind then drop to get a port with nothing listening.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let limiter = RateLimiter::with_distributed(
        RateLimitConfig::default(),
        IdentityHasher::new(test_config().hashing),
        Arc::new(SystemClock),
        Arc::new(limiter(addr)),
    );

    assert!(!limiter.check_rate_limit("ann@example.com", "203.0.113.7").await);
}
