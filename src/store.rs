// author: kodeholic (powered by Claude)
// 공유 저장소 / pub-sub 경계
//
// 코어는 저장소를 직접 구현하지 않는다. 필요한 건 두 가지 인터페이스뿐:
//   SharedStore — 캔버스 해시, 쿨다운 락(TTL), 전역 설정값, 블랙리스트 셋
//   PubSub      — 프로세스 간 팬아웃 채널 (pixel, cooldown:update)
//
// 구현체:
//   MemoryBackend — 단일 노드 / 테스트용. Arc 하나를 여러 "프로세스"가 공유 가능
//   RedisBackend  — 운영용. 여러 서버 프로세스가 같은 Redis를 바라봄

pub mod memory;
pub mod redis_backend;

pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::CanvasResult;

/// pub/sub 채널에서 수신한 원본 메시지
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    pub channel: String,
    pub payload: String,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// 해시 전체 조회 (HGETALL)
    async fn hash_get_all(&self, key: &str) -> CanvasResult<HashMap<String, String>>;

    /// 해시 필드 1개 덮어쓰기 (HSET)
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CanvasResult<()>;

    async fn get(&self, key: &str) -> CanvasResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> CanvasResult<()>;

    /// 키가 없을 때만 TTL과 함께 설정 (SET NX PX). 설정했으면 true
    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> CanvasResult<bool>;

    /// 값 + 남은 TTL(ms)을 한 번에 조회. 키가 없으면 None
    async fn get_with_ttl(&self, key: &str) -> CanvasResult<Option<(String, u64)>>;

    /// 키 삭제 (DEL). 없으면 아무 일도 없음
    async fn delete(&self, key: &str) -> CanvasResult<()>;

    async fn set_add(&self, key: &str, member: &str) -> CanvasResult<()>;

    async fn set_members(&self, key: &str) -> CanvasResult<Vec<String>>;
}

#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, channel: &str, payload: &str) -> CanvasResult<()>;

    /// 구독 스트림 생성. 반환 시점에 구독이 이미 성립되어 있어야 한다
    async fn subscribe(&self, channels: &[&str]) -> CanvasResult<BoxStream<'static, RelayMessage>>;
}
