//! 跨域与资源策略响应头

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_HEADERS: &str =
    "Origin, X-Requested-With, Content, Accept, Content-Type, Authorization";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, PATCH, OPTIONS";
pub const CROSS_ORIGIN_RESOURCE_POLICY: &str = "cross-origin";

static CORP_HEADER: HeaderName = HeaderName::from_static("cross-origin-resource-policy");

/// 无条件写入固定的响应头集合，覆盖下游设置的同名头
pub fn apply_security_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        CORP_HEADER.clone(),
        HeaderValue::from_static(CROSS_ORIGIN_RESOURCE_POLICY),
    );
}
