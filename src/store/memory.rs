// author: kodeholic (powered by Claude)
// MemoryBackend — 프로세스 내 SharedStore + PubSub
//
// REDIS_URL 없이 기동하면 이 백엔드로 단일 노드 운영.
// 테스트에서는 Arc 하나를 여러 AppState가 공유해 멀티 프로세스를 흉내낸다.
// TTL은 tokio::time::Instant 기준 — time::pause/advance로 제어 가능

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::broadcast;
use tokio::time::{Duration, Instant};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tracing::{trace, warn};

use super::{PubSub, RelayMessage, SharedStore};
use crate::error::{CanvasError, CanvasResult};

const BUS_CAPACITY: usize = 4096;

struct StringEntry {
    value:      String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
struct MemoryState {
    strings: HashMap<String, StringEntry>,
    hashes:  HashMap<String, HashMap<String, String>>,
    sets:    HashMap<String, HashSet<String>>,
}

impl MemoryState {
    /// 만료된 키는 조회 시점에 제거 (lazy expiry)
    fn live_string(&mut self, key: &str, now: Instant) -> Option<&StringEntry> {
        if self.strings.get(key).is_some_and(|e| e.is_expired(now)) {
            self.strings.remove(key);
        }
        self.strings.get(key)
    }
}

pub struct MemoryBackend {
    state:       Mutex<MemoryState>,
    bus:         broadcast::Sender<RelayMessage>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        trace!("Initializing MemoryBackend");
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        Self {
            state:       Mutex::new(MemoryState::default()),
            bus,
            unavailable: AtomicBool::new(false),
        }
    }

    /// 저장소 장애 시뮬레이션. true면 SharedStore 호출과 publish 가 실패한다.
    /// 이미 열린 구독 스트림은 유지
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> CanvasResult<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(CanvasError::Store("memory backend unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryBackend {
    async fn hash_get_all(&self, key: &str) -> CanvasResult<HashMap<String, String>> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CanvasResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> CanvasResult<Option<String>> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        Ok(state.live_string(key, Instant::now()).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> CanvasResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state.strings.insert(key.to_string(), StringEntry {
            value:      value.to_string(),
            expires_at: None,
        });
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> CanvasResult<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        if state.live_string(key, now).is_some() {
            return Ok(false);
        }
        state.strings.insert(key.to_string(), StringEntry {
            value:      value.to_string(),
            expires_at: Some(now + Duration::from_millis(ttl_ms)),
        });
        Ok(true)
    }

    async fn get_with_ttl(&self, key: &str) -> CanvasResult<Option<(String, u64)>> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();
        Ok(state.live_string(key, now).map(|e| {
            let remaining = e.expires_at
                .map(|at| at.saturating_duration_since(now).as_millis() as u64)
                .unwrap_or(0);
            (e.value.clone(), remaining)
        }))
    }

    async fn delete(&self, key: &str) -> CanvasResult<()> {
        self.check_available()?;
        self.state.lock().unwrap().strings.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> CanvasResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        state.sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CanvasResult<Vec<String>> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state.sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PubSub for MemoryBackend {
    async fn publish(&self, channel: &str, payload: &str) -> CanvasResult<()> {
        self.check_available()?;
        // 구독자 없음은 정상 케이스 — 무시
        let _ = self.bus.send(RelayMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str]) -> CanvasResult<BoxStream<'static, RelayMessage>> {
        let wanted: HashSet<String> = channels.iter().map(|c| c.to_string()).collect();
        let stream = BroadcastStream::new(self.bus.subscribe())
            .filter_map(move |result| match result {
                Ok(msg) if wanted.contains(&msg.channel) => Some(msg),
                Ok(_) => None,
                Err(lagged) => {
                    warn!("[memory-bus] subscriber lagged: {}", lagged);
                    None
                }
            });
        Ok(Box::pin(stream))
    }
}
