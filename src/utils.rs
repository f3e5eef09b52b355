// author: kodeholic (powered by Gemini)

use std::net::SocketAddr;

use axum::http::HeaderMap;

/// 현재 시간을 밀리초 단위의 Unix Timestamp로 반환합니다.
/// 에러 발생 시 시스템 패닉 대신 0(기본값)을 반환하여 장애를 방어합니다.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// 클라이언트 식별자 추출
/// x-forwarded-for 첫 항목 우선, 없으면 전송 계층 주소.
/// 검증되지 않은 값이므로 위조 가능 — 인증 용도로 쓰지 말 것
pub fn client_identity(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| addr.ip().to_string())
}
