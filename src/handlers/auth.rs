//! 认证相关的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext,
    error::AppError,
    middleware::AppState,
    models::{auth::*, user::UserResponse},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

/// 注册
pub async fn signup(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(malformed_body)?;

    let user = state.auth_service.signup(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created",
            "user": UserResponse::from(user)
        })),
    ))
}

/// 登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.map_err(malformed_body)?;

    let session = state.auth_service.login(req).await?;

    Ok(Json(session))
}

/// 获取当前用户信息
pub async fn get_current_user(auth_context: AuthContext) -> Json<UserResponse> {
    Json(UserResponse {
        id: auth_context.user_id,
        handle: auth_context.handle,
        created_at: auth_context.created_at,
    })
}

/// 请求体无法解析时统一返回 400
fn malformed_body(rejection: JsonRejection) -> AppError {
    tracing::debug!(error = %rejection.body_text(), "Malformed request body");
    AppError::Validation("Request body must be a JSON object with handle and password".to_string())
}
