//! 安全管道测试

use axum::{
    body::Bytes,
    http::{HeaderMap, Method, Uri},
};
use book_api::{
    error::AppError,
    pipeline::{
        sanitize::{sanitize_json_body, sanitize_query},
        RateLimitConfig, RateLimiter, RequestContext, SecurityPipeline, Stage,
    },
};
use serde_json::{json, Value};
use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

fn context(client: &str, uri: &str, body: &str) -> RequestContext {
    let uri: Uri = uri.parse().unwrap();
    RequestContext::new(client, Method::POST, &uri, Bytes::from(body.to_string()))
}

fn limiter(max: u32) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(RateLimitConfig {
        window: Duration::from_secs(60),
        max_requests: NonZeroU32::new(max).unwrap(),
    }))
}

/// 记录被调用次数的阶段
struct CountingStage(Arc<AtomicUsize>);

impl Stage for CountingStage {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn on_request(&self, ctx: RequestContext) -> Result<RequestContext, AppError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(ctx)
    }
}

#[test]
fn test_rejection_stops_later_stages() {
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = SecurityPipeline::standard(limiter(1)).with_stage(CountingStage(calls.clone()));

    assert!(pipeline.run(context("c1", "/api/auth/login", "{}")).is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let rejected = pipeline.run(context("c1", "/api/auth/login", "{}"));
    assert!(matches!(rejected, Err(AppError::Throttled { retry_after_secs }) if retry_after_secs >= 1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sanitize_stage_rewrites_body_and_query() {
    let pipeline = SecurityPipeline::standard(limiter(10));

    let ctx = pipeline
        .run(context(
            "c1",
            "/api/auth/login?sort=asc&user%5B%24ne%5D=x",
            r#"{"handle":"a@b.com","password":{"$gt":""},"$where":"1"}"#,
        ))
        .unwrap();

    assert_eq!(ctx.sanitized_keys, 3);
    assert_eq!(ctx.query.as_deref(), Some("sort=asc"));
    let body: Value = serde_json::from_slice(&ctx.body).unwrap();
    assert_eq!(body, json!({"handle": "a@b.com", "password": {}}));
}

#[test]
fn test_clean_request_passes_untouched() {
    let pipeline = SecurityPipeline::standard(limiter(10));
    let raw = r#"{"handle":"a@b.com","password":"pw"}"#;

    let ctx = pipeline
        .run(context("c1", "/api/auth/login?page=2", raw))
        .unwrap();

    assert_eq!(ctx.sanitized_keys, 0);
    assert_eq!(ctx.query.as_deref(), Some("page=2"));
    assert_eq!(&ctx.body[..], raw.as_bytes());
}

#[test]
fn test_non_json_body_is_left_alone() {
    assert!(sanitize_json_body(b"handle=a&$where=1").is_none());

    let pipeline = SecurityPipeline::standard(limiter(10));
    let ctx = pipeline.run(context("c1", "/upload", "not json at all")).unwrap();
    assert_eq!(&ctx.body[..], b"not json at all");
}

#[test]
fn test_query_sanitizer_cases() {
    assert_eq!(sanitize_query("a=1&b=2"), None);
    assert_eq!(
        sanitize_query("$where=1&name=x"),
        Some(("name=x".to_string(), 1))
    );
    assert_eq!(
        sanitize_query("profile.role=admin&name=x"),
        Some(("name=x".to_string(), 1))
    );
    assert_eq!(
        sanitize_query("user[profile][$ne]=1"),
        Some((String::new(), 1))
    );
}

#[test]
fn test_finish_applies_headers_from_all_stages() {
    let pipeline = SecurityPipeline::standard(limiter(10));
    let mut headers = HeaderMap::new();
    pipeline.finish(&mut headers);

    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["cross-origin-resource-policy"], "cross-origin");

    // 空管道不添加任何头
    let mut headers = HeaderMap::new();
    SecurityPipeline::new().finish(&mut headers);
    assert!(headers.is_empty());
}

#[test]
fn test_rate_limiter_counts_per_client() {
    let limiter = limiter(2);

    assert!(limiter.admit("a").is_admitted());
    assert!(limiter.admit("a").is_admitted());
    assert!(!limiter.admit("a").is_admitted());
    assert!(limiter.admit("b").is_admitted());
    assert_eq!(limiter.tracked_clients(), 2);
}
