//! 세션 테이블 - 유휴 만료 + 최대 개수 제한
//!
//! 새 세션을 넣을 때 유휴 시간이 지난 세션을 먼저 지우고, 그래도 가득 차 있으면
//! 가장 오래 쓰지 않은 세션을 내보냅니다.

use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Slot<V> {
    value: V,
    last_used: Instant,
}

pub(super) struct SessionTable<V> {
    entries: HashMap<String, Slot<V>>,
    idle_ttl: Duration,
    capacity: usize,
}

impl<V: Clone> SessionTable<V> {
    pub fn new(idle_ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            idle_ttl,
            capacity: capacity.max(1),
        }
    }

    /// 세션 추가, 내보낸 세션 수 반환
    pub fn insert(&mut self, id: String, value: V, now: Instant) -> usize {
        let mut evicted = self.evict_idle(now);
        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    tracing::debug!("Evicted least recently used session {}", oldest);
                    evicted += 1;
                }
                None => break,
            }
        }

        self.entries.insert(
            id,
            Slot {
                value,
                last_used: now,
            },
        );
        evicted
    }

    /// 세션 조회 (사용 시각 갱신)
    pub fn get(&mut self, id: &str, now: Instant) -> Option<V> {
        let slot = self.entries.get_mut(id)?;
        if now.saturating_duration_since(slot.last_used) >= self.idle_ttl {
            self.entries.remove(id);
            tracing::debug!("Session {} expired", id);
            return None;
        }
        slot.last_used = now;
        Some(slot.value.clone())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    /// 유휴 시간이 지난 세션 제거
    pub fn evict_idle(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.idle_ttl;
        self.entries
            .retain(|_, slot| now.saturating_duration_since(slot.last_used) < ttl);
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::info!("Evicted {} idle session(s)", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let start = Instant::now();
        let mut table = SessionTable::new(HOUR, 2);
        table.insert("a".into(), 1, start);
        table.insert("b".into(), 2, start + Duration::from_secs(1));

        // a를 최근에 사용했으므로 b가 나가야 함
        assert_eq!(table.get("a", start + Duration::from_secs(2)), Some(1));
        assert_eq!(table.insert("c".into(), 3, start + Duration::from_secs(3)), 1);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("b", start + Duration::from_secs(4)), None);
        assert_eq!(table.get("a", start + Duration::from_secs(4)), Some(1));
    }

    #[test]
    fn test_idle_sessions_expire() {
        let start = Instant::now();
        let mut table = SessionTable::new(Duration::from_secs(60), 10);
        table.insert("old".into(), 1, start);
        table.insert("fresh".into(), 2, start + Duration::from_secs(50));

        let later = start + Duration::from_secs(70);
        assert_eq!(table.get("old", later), None);
        assert_eq!(table.get("fresh", later), Some(2));

        assert_eq!(table.evict_idle(later + Duration::from_secs(60)), 1);
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_remove() {
        let mut table = SessionTable::new(HOUR, 10);
        table.insert("a".into(), 1, Instant::now());
        assert!(table.remove("a"));
        assert!(!table.remove("a"));
        assert_eq!(table.len(), 0);
    }
}
