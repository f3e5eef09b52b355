// author: kodeholic (powered by Claude)
// AdminChannel — 운영자 제어면
//
// 두 가지 조작만 존재:
//   set_global_cooldown  전역 쿨다운 변경 → 저장소 기록 + cooldown:update 발행
//   route_command        대상 식별자의 로컬 소켓 전부에 불투명 명령 전달
//
// 시크릿 비교는 상수 시간:
//   기동 시 HMAC-SHA256(key=설정 시크릿, msg=AUTH_CONTEXT) 태그를 1회 계산해 두고
//   후보 시크릿으로 같은 MAC 을 만들어 verify_slice 로 비교한다

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use tracing::{info, warn};

use crate::config;
use crate::coordinator::CoordinatorHandle;
use crate::core::CooldownManager;
use crate::error::{CanvasError, CanvasResult};
use crate::protocol::message::ServerEvent;
use crate::relay::{BroadcastRelay, RelayEvent};
use crate::trace::{TraceDir, TraceEvent, TraceHub};

type HmacSha256 = Hmac<Sha256>;

const AUTH_CONTEXT: &[u8] = b"mini-pixelcanvas/admin";

pub struct AdminChannel {
    secret_tag:  Vec<u8>,
    cooldown:    Arc<CooldownManager>,
    relay:       Arc<BroadcastRelay>,
    coordinator: CoordinatorHandle,
    trace_hub:   Arc<TraceHub>,
}

impl AdminChannel {
    pub fn new(
        secret:      &str,
        cooldown:    Arc<CooldownManager>,
        relay:       Arc<BroadcastRelay>,
        coordinator: CoordinatorHandle,
        trace_hub:   Arc<TraceHub>,
    ) -> CanvasResult<Self> {
        let secret_tag = mac_for(secret)?.finalize().into_bytes().to_vec();
        Ok(Self { secret_tag, cooldown, relay, coordinator, trace_hub })
    }

    pub fn authorize(&self, candidate: &str) -> CanvasResult<()> {
        let mac = mac_for(candidate)?;
        mac.verify_slice(&self.secret_tag).map_err(|_| CanvasError::Unauthorized)
    }

    /// 인증 → 파싱 → 저장 → 발행. 성공 시 새 값 반환
    pub async fn set_global_cooldown(&self, secret: &str, raw_ms: &str) -> CanvasResult<u64> {
        if let Err(e) = self.authorize(secret) {
            warn!("[admin] set-cooldown rejected: bad secret");
            return Err(e);
        }
        let ms = parse_cooldown(raw_ms)?;

        self.cooldown.set_global_duration(ms).await?;
        self.relay.publish(&RelayEvent::CooldownUpdate(ms)).await?;

        info!("[admin] global cooldown set to {}ms", ms);
        self.trace_hub.publish(TraceEvent::new(TraceDir::Sys, None, "set-cooldown", format!("{}ms", ms)));
        Ok(ms)
    }

    /// 대상 식별자의 로컬 소켓에 {command, ...args} 전달. 전달한 소켓 수 반환
    pub async fn route_command(
        &self,
        secret:  &str,
        target:  &str,
        command: &str,
        args:    Map<String, Value>,
    ) -> CanvasResult<usize> {
        self.authorize(secret)?;

        let mut payload = args;
        payload.insert("command".to_string(), Value::String(command.to_string()));

        let delivered = self.coordinator.send_to(target, &ServerEvent::AdminCommand(payload)).await?;
        info!("[admin] command '{}' routed to {} ({} sockets)", command, target, delivered);
        self.trace_hub.publish(TraceEvent::new(
            TraceDir::Sys, Some(target), "admin-command", format!("{} -> {} sockets", command, delivered),
        ));
        Ok(delivered)
    }
}

/// 정수 문자열만 허용, 0..=MAX_COOLDOWN_MS
pub fn parse_cooldown(raw: &str) -> CanvasResult<u64> {
    let ms = raw.trim().parse::<i64>()
        .map_err(|_| CanvasError::InvalidCooldown(raw.to_string()))?;
    if !(0..=config::MAX_COOLDOWN_MS as i64).contains(&ms) {
        return Err(CanvasError::InvalidCooldown(raw.to_string()));
    }
    Ok(ms as u64)
}

fn mac_for(secret: &str) -> CanvasResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CanvasError::Internal(e.to_string()))?;
    mac.update(AUTH_CONTEXT);
    Ok(mac)
}
