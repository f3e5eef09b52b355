// author: kodeholic (powered by Claude)
//
// HTTP 제어면 — WS 게이트웨이와 같은 리스너에서 서빙
//
// GET /api/admin/set-cooldown  → 전역 쿨다운 변경
// GET /admin/*                 → 운영 조회 (admin.rs)
// GET /trace[/{identity}]      → 이벤트 SSE (trace.rs)

mod admin;
pub mod dto;
mod state;
mod trace;

pub use admin::{admin_blacklist, admin_list_users, admin_status, set_cooldown};
pub use state::HttpState;
pub use trace::trace_stream;
