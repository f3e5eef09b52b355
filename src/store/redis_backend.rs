// author: kodeholic (powered by Claude)
// RedisBackend — 운영용 SharedStore + PubSub
//
// 명령용 커넥션: MultiplexedConnection 1개를 clone해서 공유 (파이프라이닝)
// 구독용 커넥션: subscribe() 호출마다 전용 커넥션을 새로 연다 (SUBSCRIBE 모드 전환)

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio_stream::StreamExt as _;
use tracing::{info, warn};

use super::{PubSub, RelayMessage, SharedStore};
use crate::error::CanvasResult;

pub struct RedisBackend {
    client: redis::Client,
    conn:   MultiplexedConnection,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> CanvasResult<Self> {
        let client = redis::Client::open(url)?;
        let conn   = client.get_multiplexed_async_connection().await?;
        info!("[redis] connected: {}", url);
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl SharedStore for RedisBackend {
    async fn hash_get_all(&self, key: &str) -> CanvasResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        let map: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(map)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> CanvasResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CanvasResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> CanvasResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> CanvasResult<bool> {
        let mut conn = self.conn.clone();
        // SET key value NX PX ttl — 성공 시 "OK", 이미 있으면 nil
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get_with_ttl(&self, key: &str) -> CanvasResult<Option<(String, u64)>> {
        let mut conn = self.conn.clone();
        // GET + PTTL 을 MULTI/EXEC 로 묶어 같은 시점의 값/TTL을 얻는다
        let (value, ttl): (Option<String>, i64) = redis::pipe()
            .atomic()
            .cmd("GET").arg(key)
            .cmd("PTTL").arg(key)
            .query_async(&mut conn)
            .await?;

        // PTTL: -2 = 키 없음, -1 = TTL 없음
        Ok(value.map(|v| (v, ttl.max(0) as u64)))
    }

    async fn delete(&self, key: &str) -> CanvasResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> CanvasResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CanvasResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }
}

#[async_trait]
impl PubSub for RedisBackend {
    async fn publish(&self, channel: &str, payload: &str) -> CanvasResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channels: &[&str]) -> CanvasResult<BoxStream<'static, RelayMessage>> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        for channel in channels {
            pubsub.subscribe(*channel).await?;
        }
        info!("[redis] subscribed: {:?}", channels);

        let stream = pubsub.into_on_message().filter_map(|msg| {
            let channel = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => Some(RelayMessage { channel, payload }),
                Err(e) => {
                    warn!("[redis] non-text payload on {}: {}", channel, e);
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
