// author: kodeholic (powered by Claude)
// HttpState — HTTP 핸들러 공유 상태

use std::sync::Arc;

use crate::control::AdminChannel;
use crate::coordinator::CoordinatorHandle;
use crate::core::CooldownManager;
use crate::trace::TraceHub;
use crate::utils::current_timestamp;

#[derive(Clone)]
pub struct HttpState {
    pub coordinator:   CoordinatorHandle,
    pub control:       Arc<AdminChannel>,
    pub cooldown:      Arc<CooldownManager>,
    pub trace_hub:     Arc<TraceHub>,
    /// 서버 프로세스 시작 시각 (Unix millis) — uptime 계산용
    pub start_time_ms: u64,
}

impl HttpState {
    pub fn new(
        coordinator: CoordinatorHandle,
        control:     Arc<AdminChannel>,
        cooldown:    Arc<CooldownManager>,
        trace_hub:   Arc<TraceHub>,
    ) -> Self {
        Self { coordinator, control, cooldown, trace_hub, start_time_ms: current_timestamp() }
    }
}
