// author: kodeholic (powered by Claude)
// 네트워크 로직과 분리된 캔버스 도메인 컴포넌트 모음
//
// 배치 요청 처리 순서:
//   AbuseGuard → Validator → CooldownManager → CanvasGateway.write → BroadcastRelay.publish
//
// AbuseGuard / PresenceRegistry 는 프로세스 로컬 상태 — Coordinator 태스크가 단독 소유
// CooldownManager / CanvasGateway 는 SharedStore 위의 얇은 어댑터 — 프로세스 간 공유 상태

pub mod abuse;
pub mod canvas;
pub mod cooldown;
pub mod presence;
pub mod validator;

pub use abuse::{AbuseGuard, AbuseState, AbuseVerdict};
pub use canvas::CanvasGateway;
pub use cooldown::{CooldownDecision, CooldownManager};
pub use presence::{PresenceEntry, PresenceRegistry, PresenceView};
pub use validator::{palette_color, validate, Rejection};
