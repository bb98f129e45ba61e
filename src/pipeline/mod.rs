//! 请求安全管道
//!
//! 每个入站请求按固定顺序经过 限流 -> 安全响应头 -> 净化 三个阶段。
//! 每个阶段接收请求上下文，返回新的上下文或拒绝；管道在第一次拒绝处停止。
//! 所有阶段的响应钩子对每个响应都执行，包括被拒绝的请求。

pub mod headers;
pub mod rate_limit;
pub mod sanitize;

pub use rate_limit::{Admission, RateLimitConfig, RateLimiter, RateWindow};
pub use sanitize::{sanitize, RequestValue, Scalar};

use crate::{error::AppError, middleware::AppState};
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// 管道阶段之间传递的请求上下文
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub client_key: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Bytes,
    /// 净化阶段删除的键数量；大于 0 时需要重建请求
    pub sanitized_keys: usize,
    /// 请求体超过上限或读取失败，`body` 为空
    pub body_unreadable: bool,
}

impl RequestContext {
    pub fn new(client_key: impl Into<String>, method: Method, uri: &Uri, body: Bytes) -> Self {
        Self {
            client_key: client_key.into(),
            method,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            body,
            sanitized_keys: 0,
            body_unreadable: false,
        }
    }

    /// 请求体无法缓冲时的上下文，由净化阶段拒绝
    pub fn with_unreadable_body(client_key: impl Into<String>, method: Method, uri: &Uri) -> Self {
        Self {
            body_unreadable: true,
            ..Self::new(client_key, method, uri, Bytes::new())
        }
    }
}

/// 管道阶段
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_request(&self, ctx: RequestContext) -> Result<RequestContext, AppError> {
        Ok(ctx)
    }

    fn on_response(&self, _headers: &mut HeaderMap) {}
}

/// 限流阶段
pub struct RateLimitStage {
    limiter: Arc<RateLimiter>,
}

impl RateLimitStage {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Stage for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn on_request(&self, ctx: RequestContext) -> Result<RequestContext, AppError> {
        match self.limiter.admit(&ctx.client_key) {
            Admission::Admitted { remaining } => {
                tracing::trace!(client = %ctx.client_key, remaining, "Rate limit check passed");
                Ok(ctx)
            }
            Admission::Throttled { retry_after } => {
                metrics::counter!("rate_limit_throttled_total").increment(1);
                tracing::warn!(
                    client = %ctx.client_key,
                    path = %ctx.path,
                    "Rate limit exceeded"
                );
                // 向上取整，至少 1 秒
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Err(AppError::Throttled {
                    retry_after_secs: secs.max(1),
                })
            }
        }
    }
}

/// 安全响应头阶段
pub struct SecurityHeadersStage;

impl Stage for SecurityHeadersStage {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    fn on_response(&self, headers: &mut HeaderMap) {
        headers::apply_security_headers(headers);
    }
}

/// 净化阶段
pub struct SanitizeStage;

impl Stage for SanitizeStage {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    fn on_request(&self, mut ctx: RequestContext) -> Result<RequestContext, AppError> {
        // 无法检查的请求体不放行
        if ctx.body_unreadable {
            return Err(AppError::Validation(
                "Request body too large or unreadable".to_string(),
            ));
        }

        if let Some((query, removed)) = ctx.query.as_deref().and_then(sanitize::sanitize_query) {
            ctx.query = Some(query);
            ctx.sanitized_keys += removed;
        }

        if !ctx.body.is_empty() {
            if let Some((body, removed)) = sanitize::sanitize_json_body(&ctx.body) {
                if removed > 0 {
                    ctx.body = Bytes::from(body);
                    ctx.sanitized_keys += removed;
                }
            }
        }

        if ctx.sanitized_keys > 0 {
            tracing::warn!(
                client = %ctx.client_key,
                path = %ctx.path,
                removed = ctx.sanitized_keys,
                "Removed operator keys from request"
            );
        }

        Ok(ctx)
    }
}

/// 有序阶段列表及其执行器
pub struct SecurityPipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl SecurityPipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// 标准顺序：限流 -> 安全响应头 -> 净化
    pub fn standard(limiter: Arc<RateLimiter>) -> Self {
        Self::new()
            .with_stage(RateLimitStage::new(limiter))
            .with_stage(SecurityHeadersStage)
            .with_stage(SanitizeStage)
    }

    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// 依次执行各阶段，遇到第一个拒绝即停止
    pub fn run(&self, ctx: RequestContext) -> Result<RequestContext, AppError> {
        self.stages.iter().try_fold(ctx, |ctx, stage| {
            stage.on_request(ctx).map_err(|e| {
                tracing::debug!(stage = stage.name(), error = %e, "Pipeline rejected request");
                e
            })
        })
    }

    /// 对响应执行所有阶段的响应钩子
    pub fn finish(&self, headers: &mut HeaderMap) {
        for stage in &self.stages {
            stage.on_response(headers);
        }
    }
}

impl Default for SecurityPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// 把安全管道接入 axum 的中间件
pub async fn security_pipeline_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let pipeline = state.pipeline.clone();
    let client_key = crate::middleware::client_key(&req, state.config.security.trust_proxy);

    let (parts, body) = req.into_parts();

    // 读取失败不在这里返回，限流阶段仍需计数
    let ctx = match axum::body::to_bytes(body, state.config.server.max_body_bytes).await {
        Ok(bytes) => RequestContext::new(client_key, parts.method.clone(), &parts.uri, bytes),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to buffer request body");
            RequestContext::with_unreadable_body(client_key, parts.method.clone(), &parts.uri)
        }
    };

    let ctx = match pipeline.run(ctx) {
        Ok(ctx) => ctx,
        Err(e) => {
            let mut response = e.into_response();
            pipeline.finish(response.headers_mut());
            return response;
        }
    };

    // CORS 预检请求直接应答，不进入路由
    if ctx.method == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        pipeline.finish(response.headers_mut());
        return response;
    }

    let mut response = next.run(rebuild_request(parts, ctx)).await;
    pipeline.finish(response.headers_mut());
    response
}

/// 用管道输出的上下文重建请求
fn rebuild_request(mut parts: Parts, ctx: RequestContext) -> Request {
    if ctx.sanitized_keys > 0 {
        if let Some(uri) = rebuild_uri(&parts.uri, ctx.query.as_deref()) {
            parts.uri = uri;
        }
        // 请求体已整体重写，长度确定
        parts.headers.remove(header::TRANSFER_ENCODING);
        parts
            .headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(ctx.body.len()));
    }

    Request::from_parts(parts, Body::from(ctx.body))
}

fn rebuild_uri(uri: &Uri, query: Option<&str>) -> Option<Uri> {
    let mut path_and_query = uri.path().to_string();
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        path_and_query.push('?');
        path_and_query.push_str(query);
    }

    let mut uri_parts = uri.clone().into_parts();
    uri_parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(uri_parts).ok()
}
