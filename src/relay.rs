// author: kodeholic (powered by Claude)
// BroadcastRelay — 프로세스 간 팬아웃
//
// 구조:
//   배치 성공 / 쿨다운 변경
//       └── BroadcastRelay::publish  → PubSub (pixel | cooldown:update)
//                                          │
//   모든 프로세스 (발신 프로세스 포함) ◀────┘
//       └── relay 구독 태스크 → Coordinator::broadcast → 로컬 소켓 전체
//
// 발신자를 특별 취급하지 않는다. 자기 발행분도 구독으로 되돌아와 로컬에 재전송됨
// (배치는 멱등 덮어쓰기이므로 중복 전달 무해)
//
// 채널 페이로드:
//   pixel            {"x":5,"y":5,"color":"#000000"}
//   cooldown:update  "5000"  (10진 문자열)

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::config;
use crate::coordinator::CoordinatorHandle;
use crate::core::validate;
use crate::error::{CanvasError, CanvasResult};
use crate::protocol::message::{CooldownUpdatedPayload, PixelPayload, ServerEvent};
use crate::store::{PubSub, RelayMessage};
use crate::trace::{TraceDir, TraceEvent, TraceHub};

const RESUBSCRIBE_BASE_MS: u64 = 500;
const RESUBSCRIBE_MAX_MS:  u64 = 10_000;

// ----------------------------------------------------------------------------
// [RelayEvent] — 채널 위를 오가는 이벤트
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Pixel(PixelPayload),
    CooldownUpdate(u64),
}

impl RelayEvent {
    pub fn channel(&self) -> &'static str {
        match self {
            RelayEvent::Pixel(_)          => config::PIXEL_CHANNEL,
            RelayEvent::CooldownUpdate(_) => config::COOLDOWN_UPDATE_CHANNEL,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            RelayEvent::Pixel(p)           => serde_json::to_string(p).unwrap_or_default(),
            RelayEvent::CooldownUpdate(ms) => ms.to_string(),
        }
    }

    /// 수신 메시지 해석. 다른 프로세스도 신뢰하지 않으므로 픽셀은 다시 검증한다
    pub fn decode(msg: &RelayMessage) -> Option<Self> {
        match msg.channel.as_str() {
            config::PIXEL_CHANNEL => {
                let pixel: PixelPayload = serde_json::from_str(&msg.payload).ok()?;
                validate(pixel.x, pixel.y, &pixel.color).ok()?;
                Some(RelayEvent::Pixel(pixel))
            }
            config::COOLDOWN_UPDATE_CHANNEL => {
                let ms = msg.payload.trim().parse::<u64>().ok()?;
                (ms <= config::MAX_COOLDOWN_MS).then_some(RelayEvent::CooldownUpdate(ms))
            }
            _ => None,
        }
    }

    pub fn into_server_event(self) -> ServerEvent {
        match self {
            RelayEvent::Pixel(p)           => ServerEvent::PixelPlaced(p),
            RelayEvent::CooldownUpdate(ms) => ServerEvent::CooldownUpdated(CooldownUpdatedPayload { cooldown: ms }),
        }
    }
}

// ----------------------------------------------------------------------------
// [BroadcastRelay]
// ----------------------------------------------------------------------------

pub struct BroadcastRelay {
    pubsub: Arc<dyn PubSub>,
}

impl BroadcastRelay {
    pub fn new(pubsub: Arc<dyn PubSub>) -> Self {
        Self { pubsub }
    }

    pub async fn publish(&self, event: &RelayEvent) -> CanvasResult<()> {
        self.pubsub
            .publish(event.channel(), &event.encode())
            .await
            .map_err(|e| CanvasError::Relay(e.to_string()))
    }

    /// 두 채널 구독 후 수신 루프 spawn.
    /// 첫 구독은 여기서 완료한다 — 반환 이후의 publish 는 유실되지 않음
    pub async fn start(
        &self,
        coordinator: CoordinatorHandle,
        trace_hub:   Arc<TraceHub>,
    ) -> CanvasResult<JoinHandle<()>> {
        let channels = [config::PIXEL_CHANNEL, config::COOLDOWN_UPDATE_CHANNEL];
        let first    = self.pubsub.subscribe(&channels).await?;
        let pubsub   = Arc::clone(&self.pubsub);

        info!("[relay] subscribed to {:?}", channels);

        Ok(tokio::spawn(async move {
            let mut stream  = first;
            let mut backoff = RESUBSCRIBE_BASE_MS;

            loop {
                while let Some(msg) = stream.next().await {
                    backoff = RESUBSCRIBE_BASE_MS;
                    let Some(event) = RelayEvent::decode(&msg) else {
                        debug!("[relay] dropped malformed message on {}: {}", msg.channel, msg.payload);
                        continue;
                    };
                    trace_hub.publish(TraceEvent::new(TraceDir::Sys, None, msg.channel.as_str(), msg.payload.clone()));
                    coordinator.broadcast(&event.into_server_event()).await;
                }

                // 스트림 종료 = 구독 연결 끊김. 재구독될 때까지 backoff
                warn!("[relay] subscription ended, resubscribing");
                loop {
                    sleep(Duration::from_millis(backoff)).await;
                    match pubsub.subscribe(&channels).await {
                        Ok(s) => {
                            info!("[relay] resubscribed");
                            stream = s;
                            break;
                        }
                        Err(e) => {
                            error!("[relay] resubscribe failed: {}", e);
                            backoff = (backoff * 2).min(RESUBSCRIBE_MAX_MS);
                        }
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;

    fn msg(channel: &str, payload: &str) -> RelayMessage {
        RelayMessage { channel: channel.to_string(), payload: payload.to_string() }
    }

    #[test]
    fn pixel_event_encodes_as_plain_payload() {
        let ev = RelayEvent::Pixel(PixelPayload { x: 5, y: 5, color: "#000000".into() });
        assert_eq!(ev.channel(), "pixel");
        assert_eq!(ev.encode(), r##"{"x":5,"y":5,"color":"#000000"}"##);
        assert_eq!(RelayEvent::decode(&msg("pixel", &ev.encode())), Some(ev));
    }

    #[test]
    fn decode_rejects_invalid_relay_payloads() {
        assert_eq!(RelayEvent::decode(&msg("pixel", r##"{"x":-1,"y":5,"color":"#000000"}"##)), None);
        assert_eq!(RelayEvent::decode(&msg("pixel", r##"{"x":1,"y":5,"color":"#123456"}"##)), None);
        assert_eq!(RelayEvent::decode(&msg("pixel", "garbage")), None);
        assert_eq!(RelayEvent::decode(&msg("cooldown:update", "abc")), None);
        assert_eq!(RelayEvent::decode(&msg("cooldown:update", "60001")), None);
        assert_eq!(RelayEvent::decode(&msg("other", "1")), None);
        assert_eq!(RelayEvent::decode(&msg("cooldown:update", "0")), Some(RelayEvent::CooldownUpdate(0)));
    }

    #[test]
    fn cooldown_update_maps_to_server_event() {
        let json = RelayEvent::CooldownUpdate(3000).into_server_event().to_json();
        assert_eq!(json, r#"{"event":"cooldown-updated","data":{"cooldown":3000}}"#);
    }

    #[tokio::test]
    async fn publish_fails_when_backend_down() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_unavailable(true);
        let relay = BroadcastRelay::new(backend);
        let err = relay.publish(&RelayEvent::CooldownUpdate(1)).await.unwrap_err();
        assert!(matches!(err, CanvasError::Relay(_)));
    }
}
