// author: kodeholic (powered by Claude)
// AbuseGuard — 식별자별 1초 윈도우 카운터 + 영구 블랙리스트
//
// 상태머신 (식별자별):
//   Clean       → 시도          → Warming (window 시작, count=1)
//   Warming     → 윈도우 경과 후 시도 → Warming (count=1 로 리셋)
//   Warming     → count > max   → Blacklisted
//   Blacklisted → (종료 상태, 프로세스 수명 동안 유지)
//
// 검증 이전에 카운트한다 — 잘못된 요청도 요청량에는 포함

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseState {
    Clean,
    Warming,
    Blacklisted,
}

/// record_attempt 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseVerdict {
    /// 통과 — 다음 게이트로
    Allowed,
    /// 이번 시도로 블랙리스트 전이 (공지 + 강제 종료 대상)
    Escalated,
    /// 이미 블랙리스트 — 조용히 폐기
    Blocked,
}

struct RateWindow {
    window_start: Instant,
    count:        u32,
}

pub struct AbuseGuard {
    windows:      HashMap<String, RateWindow>,
    blacklist:    HashSet<String>,
    window:       Duration,
    max_attempts: u32,
}

impl AbuseGuard {
    pub fn new() -> Self {
        Self::with_limits(
            Duration::from_millis(config::RATE_WINDOW_MS),
            config::RATE_MAX_ATTEMPTS,
        )
    }

    pub fn with_limits(window: Duration, max_attempts: u32) -> Self {
        Self {
            windows: HashMap::new(),
            blacklist: HashSet::new(),
            window,
            max_attempts,
        }
    }

    pub fn record_attempt(&mut self, identity: &str, now: Instant) -> AbuseVerdict {
        if self.blacklist.contains(identity) {
            return AbuseVerdict::Blocked;
        }

        let slot = self.windows.entry(identity.to_string()).or_insert(RateWindow {
            window_start: now,
            count:        0,
        });

        if now.duration_since(slot.window_start) > self.window {
            slot.window_start = now;
            slot.count        = 1;
            return AbuseVerdict::Allowed;
        }

        slot.count += 1;
        if slot.count <= self.max_attempts {
            return AbuseVerdict::Allowed;
        }

        warn!("[abuse] {} exceeded {} attempts in {:?}, blacklisted",
            identity, self.max_attempts, self.window);
        self.windows.remove(identity);
        self.blacklist.insert(identity.to_string());
        AbuseVerdict::Escalated
    }

    pub fn state(&self, identity: &str, now: Instant) -> AbuseState {
        if self.blacklist.contains(identity) {
            return AbuseState::Blacklisted;
        }
        match self.windows.get(identity) {
            Some(w) if now.duration_since(w.window_start) <= self.window => AbuseState::Warming,
            _ => AbuseState::Clean,
        }
    }

    pub fn is_blacklisted(&self, identity: &str) -> bool {
        self.blacklist.contains(identity)
    }

    /// 외부 저장소에 남아있던 블랙리스트로 초기화 (프로세스 시작 시)
    pub fn seed_blacklist<I: IntoIterator<Item = String>>(&mut self, identities: I) {
        self.blacklist.extend(identities);
    }

    pub fn blacklist(&self) -> Vec<String> {
        let mut list: Vec<String> = self.blacklist.iter().cloned().collect();
        list.sort();
        list
    }

    /// 만료된 윈도우 정리 — 다음 시도는 어차피 리셋되므로 메모리만 회수
    pub fn sweep(&mut self, now: Instant) {
        let window = self.window;
        self.windows.retain(|_, w| now.duration_since(w.window_start) <= window);
    }
}

impl Default for AbuseGuard {
    fn default() -> Self {
        Self::new()
    }
}
