// author: kodeholic (powered by Claude)
// CooldownManager — 식별자별 배치 락 (SharedStore 위의 TTL 키)
//
// 락 키:  cooldown:lock:{identity}
// 락 값:  락 획득 시점의 전역 쿨다운(ms) — Denied 응답의 total 로 사용
// 락 TTL: 같은 값. 이후 전역 값이 바뀌어도 기존 락의 TTL은 그대로
//
// 획득은 SET NX PX 한 번으로 처리 — 같은 식별자의 동시 요청 두 개가 모두 Granted 되는
// check-then-set 경합이 없다

use std::sync::Arc;

use tracing::{trace, warn};

use crate::config;
use crate::error::{CanvasError, CanvasResult};
use crate::store::SharedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    /// duration_ms == 0 이면 쿨다운 비활성 (락 없음)
    Granted { duration_ms: u64 },
    Denied { remaining_ms: u64, duration_ms: u64 },
}

pub struct CooldownManager {
    store: Arc<dyn SharedStore>,
}

impl CooldownManager {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// 현재 전역 쿨다운. 저장소에 값이 없거나 깨져 있으면 기본값
    pub async fn global_duration(&self) -> CanvasResult<u64> {
        let raw = self.store.get(config::COOLDOWN_DURATION_KEY).await?;
        Ok(match raw.as_deref().map(str::parse::<u64>) {
            Some(Ok(ms)) => ms.min(config::MAX_COOLDOWN_MS),
            Some(Err(_)) => {
                warn!("[cooldown] malformed global duration {:?}, using default", raw);
                config::DEFAULT_COOLDOWN_MS
            }
            None => config::DEFAULT_COOLDOWN_MS,
        })
    }

    pub async fn set_global_duration(&self, ms: u64) -> CanvasResult<()> {
        if ms > config::MAX_COOLDOWN_MS {
            return Err(CanvasError::InvalidCooldown(ms.to_string()));
        }
        self.store.set(config::COOLDOWN_DURATION_KEY, &ms.to_string()).await
    }

    pub async fn try_acquire(&self, identity: &str) -> CanvasResult<CooldownDecision> {
        let duration_ms = self.global_duration().await?;
        if duration_ms == 0 {
            return Ok(CooldownDecision::Granted { duration_ms: 0 });
        }

        let key = lock_key(identity);

        // NX 실패 후 조회 사이에 락이 만료될 수 있으므로 한 번 더 시도
        for _ in 0..2 {
            if self.store.set_nx_px(&key, &duration_ms.to_string(), duration_ms).await? {
                trace!("[cooldown] granted {} for {}ms", identity, duration_ms);
                return Ok(CooldownDecision::Granted { duration_ms });
            }

            if let Some((value, remaining_ms)) = self.store.get_with_ttl(&key).await? {
                let total = value.parse::<u64>().unwrap_or(duration_ms);
                trace!("[cooldown] denied {} remaining={}ms total={}ms", identity, remaining_ms, total);
                return Ok(CooldownDecision::Denied {
                    remaining_ms: remaining_ms.min(total),
                    duration_ms:  total,
                });
            }
        }

        Ok(CooldownDecision::Denied { remaining_ms: 0, duration_ms })
    }

    /// 획득한 락 반납. 배치가 기록되지 못했을 때만 호출
    pub async fn release(&self, identity: &str) -> CanvasResult<()> {
        trace!("[cooldown] released {}", identity);
        self.store.delete(&lock_key(identity)).await
    }
}

fn lock_key(identity: &str) -> String {
    format!("{}{}", config::COOLDOWN_LOCK_PREFIX, identity)
}
