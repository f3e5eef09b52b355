// author: kodeholic (powered by Claude)
// CanvasGateway — 셀 좌표 ↔ 저장소 해시 필드 변환
//
// 저장 형식: HSET canvas "x:y" "<팔레트 인덱스>"
// 다중 셀 트랜잭션은 없다. write 는 단일 필드 멱등 덮어쓰기

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use super::validator::{in_bounds, palette_color};
use crate::config;
use crate::error::CanvasResult;
use crate::store::SharedStore;

pub struct CanvasGateway {
    store: Arc<dyn SharedStore>,
}

impl CanvasGateway {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// 전체 셀 조회 ("x:y" → 팔레트 인덱스). 형식이 깨진 필드는 건너뛴다
    pub async fn read_all(&self) -> CanvasResult<HashMap<String, u8>> {
        let raw = self.store.hash_get_all(config::CANVAS_KEY).await?;
        let cells = raw.into_iter()
            .filter_map(|(key, index)| {
                let (x, y) = parse_cell_key(&key)?;
                let index  = index.parse::<u8>().ok()?;
                palette_color(index)?;
                Some((cell_key(x, y), index))
            })
            .collect();
        Ok(cells)
    }

    /// 신규 접속 스냅샷용 — 실패 시 base 부터 2배씩 늘려가며 재시도
    pub async fn read_all_with_retry(&self, attempts: u32, base: Duration) -> CanvasResult<HashMap<String, u8>> {
        let mut backoff = base;
        let mut attempt = 1;
        loop {
            match self.read_all().await {
                Ok(cells) => return Ok(cells),
                Err(e) if attempt < attempts => {
                    warn!("[canvas] snapshot read failed (attempt {}/{}): {}", attempt, attempts, e);
                    sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn write(&self, x: i64, y: i64, palette_index: u8) -> CanvasResult<()> {
        debug!("[canvas] write {}:{} = {}", x, y, palette_index);
        self.store
            .hash_set(config::CANVAS_KEY, &cell_key(x, y), &palette_index.to_string())
            .await
    }
}

pub fn cell_key(x: i64, y: i64) -> String {
    format!("{}:{}", x, y)
}

pub fn parse_cell_key(key: &str) -> Option<(i64, i64)> {
    let (x, y) = key.split_once(':')?;
    let (x, y) = (x.parse().ok()?, y.parse().ok()?);
    in_bounds(x, y).then_some((x, y))
}

/// 팔레트 인덱스 맵 → 색상 맵 (canvas-state 페이로드)
pub fn to_color_map(cells: HashMap<String, u8>) -> HashMap<String, String> {
    cells.into_iter()
        .filter_map(|(key, index)| palette_color(index).map(|c| (key, c.to_string())))
        .collect()
}
