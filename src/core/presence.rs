// author: kodeholic (powered by Claude)
// PresenceRegistry — 식별자별 참조 카운트 테이블
//
// 같은 식별자(IP)로 여러 소켓이 붙을 수 있으므로 소켓 단위가 아니라 식별자 단위로 1개 엔트리.
// connections == 0 이 되는 순간 엔트리 삭제

use std::collections::HashMap;

use rand::Rng;
use serde::Serialize;
use tracing::trace;

use crate::config;
use crate::utils::current_timestamp;

pub struct PresenceEntry {
    pub identity:     String,
    pub pseudonym:    String,
    pub pixel_count:  u64,
    pub connected_at: u64,
    pub connections:  usize,
}

/// user-list 로 내보내는 뷰 (클라이언트 필드명 camelCase)
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    pub ip:           String,
    pub pseudonym:    String,
    pub connected_at: u64,
    pub pixel_count:  u64,
}

pub struct PresenceRegistry {
    entries: HashMap<String, PresenceEntry>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        trace!("Initializing PresenceRegistry");
        Self { entries: HashMap::new() }
    }

    /// 참조 카운트 증가. 새 엔트리를 만들었으면 true
    pub fn register(&mut self, identity: &str) -> bool {
        if let Some(entry) = self.entries.get_mut(identity) {
            entry.connections += 1;
            return false;
        }
        self.entries.insert(identity.to_string(), PresenceEntry {
            identity:     identity.to_string(),
            pseudonym:    default_pseudonym(),
            pixel_count:  0,
            connected_at: current_timestamp(),
            connections:  1,
        });
        trace!("Presence created: {}", identity);
        true
    }

    /// 참조 카운트 감소. 엔트리를 삭제했으면 true
    pub fn unregister(&mut self, identity: &str) -> bool {
        let Some(entry) = self.entries.get_mut(identity) else {
            return false;
        };
        entry.connections = entry.connections.saturating_sub(1);
        if entry.connections > 0 {
            return false;
        }
        self.entries.remove(identity);
        trace!("Presence removed: {}", identity);
        true
    }

    pub fn record_placement(&mut self, identity: &str) {
        if let Some(entry) = self.entries.get_mut(identity) {
            entry.pixel_count += 1;
        }
    }

    /// trim 후 1..=15 자일 때만 반영. 반영된 이름 반환
    pub fn set_pseudonym(&mut self, identity: &str, name: &str) -> Option<String> {
        let name = name.trim();
        let len  = name.chars().count();
        if len == 0 || len > config::MAX_PSEUDONYM_LEN {
            return None;
        }
        let entry = self.entries.get_mut(identity)?;
        entry.pseudonym = name.to_string();
        Some(entry.pseudonym.clone())
    }

    pub fn get(&self, identity: &str) -> Option<&PresenceEntry> {
        self.entries.get(identity)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// pixel_count 내림차순 (동률은 먼저 접속한 순)
    pub fn snapshot(&self) -> Vec<PresenceView> {
        let mut list: Vec<PresenceView> = self.entries.values()
            .map(|e| PresenceView {
                ip:           e.identity.clone(),
                pseudonym:    e.pseudonym.clone(),
                connected_at: e.connected_at,
                pixel_count:  e.pixel_count,
            })
            .collect();
        list.sort_by(|a, b| {
            b.pixel_count.cmp(&a.pixel_count)
                .then(a.connected_at.cmp(&b.connected_at))
                .then_with(|| a.ip.cmp(&b.ip))
        });
        list
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn default_pseudonym() -> String {
    let n: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("{}{:04}", config::DEFAULT_PSEUDONYM_PREFIX, n)
}
