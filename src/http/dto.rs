// author: kodeholic (powered by Claude)
// HTTP 요청/응답 DTO — Admin 전용

use serde::{Deserialize, Serialize};

use crate::core::PresenceView;

// ----------------------------------------------------------------------------
// [요청]
// ----------------------------------------------------------------------------

/// ?secret= 만 받는 조회용
#[derive(Deserialize)]
pub struct SecretQuery {
    #[serde(default)]
    pub secret: String,
}

/// GET /api/admin/set-cooldown?secret=&ms=
/// ms 는 문자열 그대로 받아 AdminChannel 에서 엄격 파싱 (비숫자 → 400)
#[derive(Deserialize)]
pub struct SetCooldownQuery {
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub ms:     String,
}

// ----------------------------------------------------------------------------
// [응답]
// ----------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCooldownResponse {
    pub success:      bool,
    pub new_cooldown: u64,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// GET /admin/status
#[derive(Serialize, Deserialize, Debug)]
pub struct ServerStatus {
    pub uptime_secs:      u64,
    pub connection_count: usize,
    pub user_count:       usize,
    pub blacklist_count:  usize,
    pub cooldown_ms:      u64,
}

/// GET /admin/users — user-list 와 동일한 뷰 (pixel_count 내림차순)
pub type UserList = Vec<PresenceView>;

/// GET /admin/blacklist
#[derive(Serialize, Deserialize, Debug)]
pub struct BlacklistResponse {
    pub count:      usize,
    pub identities: Vec<String>,
}
