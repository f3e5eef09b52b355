// author: kodeholic (powered by Claude)
// Admin REST API 핸들러
//
// 조작
//   GET /api/admin/set-cooldown?secret=&ms=  → 전역 쿨다운 변경 (200 / 401 / 400)
//
// 조회 (모두 ?secret= 필요)
//   GET /admin/status     → 서버 상태 요약
//   GET /admin/users      → 접속 식별자 목록 (pixel_count 내림차순)
//   GET /admin/blacklist  → 이 프로세스의 블랙리스트

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::error::CanvasError;
use crate::utils::current_timestamp;

use super::dto::*;
use super::state::HttpState;

// ----------------------------------------------------------------------------
// [유틸]
// ----------------------------------------------------------------------------

fn error_response(status: StatusCode, msg: &str) -> Response {
    (status, Json(ErrorResponse { error: msg.to_string() })).into_response()
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "Unauthorized")
}

fn internal(e: CanvasError) -> Response {
    error!("[admin] request failed: {}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
}

// ----------------------------------------------------------------------------
// [핸들러]
// ----------------------------------------------------------------------------

/// GET /api/admin/set-cooldown
pub async fn set_cooldown(
    State(state): State<HttpState>,
    Query(q):     Query<SetCooldownQuery>,
) -> Response {
    match state.control.set_global_cooldown(&q.secret, &q.ms).await {
        Ok(ms) => Json(SetCooldownResponse { success: true, new_cooldown: ms }).into_response(),
        Err(CanvasError::Unauthorized)       => unauthorized(),
        Err(CanvasError::InvalidCooldown(_)) => error_response(StatusCode::BAD_REQUEST, "Invalid cooldown value"),
        Err(e) => internal(e),
    }
}

/// GET /admin/status
pub async fn admin_status(
    State(state): State<HttpState>,
    Query(q):     Query<SecretQuery>,
) -> Response {
    if state.control.authorize(&q.secret).is_err() {
        return unauthorized();
    }

    let status = match state.coordinator.status().await {
        Ok(s)  => s,
        Err(e) => return internal(e),
    };
    let cooldown_ms = match state.cooldown.global_duration().await {
        Ok(ms) => ms,
        Err(e) => return internal(e),
    };

    Json(ServerStatus {
        uptime_secs:      current_timestamp().saturating_sub(state.start_time_ms) / 1000,
        connection_count: status.connection_count,
        user_count:       status.user_count,
        blacklist_count:  status.blacklist_count,
        cooldown_ms,
    }).into_response()
}

/// GET /admin/users
pub async fn admin_list_users(
    State(state): State<HttpState>,
    Query(q):     Query<SecretQuery>,
) -> Response {
    if state.control.authorize(&q.secret).is_err() {
        return unauthorized();
    }
    match state.coordinator.snapshot().await {
        Ok(list) => Json::<UserList>(list).into_response(),
        Err(e)   => internal(e),
    }
}

/// GET /admin/blacklist
pub async fn admin_blacklist(
    State(state): State<HttpState>,
    Query(q):     Query<SecretQuery>,
) -> Response {
    if state.control.authorize(&q.secret).is_err() {
        return unauthorized();
    }
    match state.coordinator.blacklist().await {
        Ok(identities) => Json(BlacklistResponse { count: identities.len(), identities }).into_response(),
        Err(e)         => internal(e),
    }
}
