//! 샤드 LRU 테이블: 샤드별 잠금, 전역 용량
//!
//! 키 해시로 샤드를 고르고 샤드마다 `parking_lot::Mutex<LruCache>` 하나를 둡니다.
//! 샤드 캐시 자체는 용량 제한이 없고, 점유 수는 전역 `AtomicUsize` 하나로 관리합니다.
//! 그래서 테이블 전체가 가득 차기 전에는 어떤 샤드에서도 퇴출이 일어나지 않습니다.
//!
//! 가득 찬 테이블에 새 키를 넣으면 엔트리 하나가 퇴출됩니다.
//! - 자기 샤드가 비어 있지 않으면 그 샤드의 LRU 엔트리
//! - 비어 있으면 다른 샤드를 `try_lock`으로 돌며 처음 잡힌 샤드의 LRU 엔트리
//!
//! 다른 샤드는 블록하며 잠그지 않습니다 (샤드 두 개를 동시에 잡는 교착 방지).
//! 모든 후보가 잠겨 있으면 삽입을 건너뛰고 [`Insert::Skipped`]를 돌려줍니다.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};

use lru::LruCache;
use parking_lot::{Mutex, MutexGuard};

/// 삽입 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// 빈 슬롯에 들어감
    Inserted,
    /// 엔트리 하나를 퇴출하고 들어감
    Evicted,
    /// 퇴출 대상 샤드를 잡지 못해 넣지 않음
    Skipped,
}

pub struct ShardedLru<K, V> {
    shards: Box<[Mutex<LruCache<K, V>>]>,
    hasher: RandomState,
    capacity: usize,
    len: AtomicUsize,
}

impl<K: Hash + Eq, V> ShardedLru<K, V> {
    /// 샤드 수는 `1..=capacity`로 보정됩니다.
    pub fn new(capacity: usize, shards: usize) -> Self {
        let capacity = capacity.max(1);
        let shards = shards.clamp(1, capacity);
        Self {
            shards: (0..shards).map(|_| Mutex::new(LruCache::unbounded())).collect(),
            hasher: RandomState::new(),
            capacity,
            len: AtomicUsize::new(0),
        }
    }

    pub fn shard_of(&self, key: &K) -> usize {
        self.hasher.hash_one(key) as usize % self.shards.len()
    }

    pub fn lock(&self, idx: usize) -> MutexGuard<'_, LruCache<K, V>> {
        self.shards[idx].lock()
    }

    /// 없는 키를 `idx` 샤드에 넣습니다. `cache`는 `idx` 샤드의 잠금이어야 합니다.
    pub fn insert(&self, idx: usize, cache: &mut LruCache<K, V>, key: K, value: V) -> Insert {
        let reserved = self
            .len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.capacity).then_some(n + 1))
            .is_ok();
        if reserved {
            cache.put(key, value);
            return Insert::Inserted;
        }

        // 가득 참: 하나 빼고 하나 넣으므로 점유 수는 그대로
        if cache.pop_lru().is_some() || self.evict_elsewhere(idx) {
            cache.put(key, value);
            Insert::Evicted
        } else {
            Insert::Skipped
        }
    }

    fn evict_elsewhere(&self, idx: usize) -> bool {
        let n = self.shards.len();
        (1..n).any(|step| {
            self.shards[(idx + step) % n]
                .try_lock()
                .is_some_and(|mut other| other.pop_lru().is_some())
        })
    }

    /// 각 샤드의 LRU 끝에서 `stale`인 엔트리를 제거하고 첫 비대상에서 멈춥니다.
    pub fn pop_lru_while(&self, mut stale: impl FnMut(&V) -> bool) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut cache = shard.lock();
            while cache.peek_lru().is_some_and(|(_, v)| stale(v)) {
                cache.pop_lru();
                removed += 1;
            }
        }
        self.len.fetch_sub(removed, Ordering::AcqRel);
        removed
    }

    /// `pred`를 만족하는 엔트리를 모두 제거합니다 (전체 순회).
    pub fn remove_where(&self, mut pred: impl FnMut(&V) -> bool) -> usize
    where
        K: Clone,
    {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut cache = shard.lock();
            let keys: Vec<K> = cache
                .iter()
                .filter(|(_, v)| pred(v))
                .map(|(k, _)| k.clone())
                .collect();
            for key in keys {
                if cache.pop(&key).is_some() {
                    removed += 1;
                }
            }
        }
        self.len.fetch_sub(removed, Ordering::AcqRel);
        removed
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut cache = shard.lock();
            self.len.fetch_sub(cache.len(), Ordering::AcqRel);
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(table: &ShardedLru<u32, u32>, keys: impl Iterator<Item = u32>) -> Vec<Insert> {
        keys.map(|k| {
            let idx = table.shard_of(&k);
            let mut cache = table.lock(idx);
            table.insert(idx, &mut cache, k, k)
        })
        .collect()
    }

    // =============================================================================
    // 용량
    // =============================================================================

    #[test]
    fn no_eviction_until_table_is_full() {
        let table = ShardedLru::new(64, 16);
        let results = fill(&table, 0..64);
        assert!(results.iter().all(|r| *r == Insert::Inserted));
        assert_eq!(table.len(), 64);

        let shard_total: usize = (0..table.shard_count()).map(|i| table.lock(i).len()).sum();
        assert_eq!(shard_total, 64);
    }

    #[test]
    fn full_table_evicts_one_per_insert() {
        let table = ShardedLru::new(32, 8);
        fill(&table, 0..32);
        for k in 100..200 {
            assert_eq!(fill(&table, k..k + 1), vec![Insert::Evicted]);
            assert_eq!(table.len(), 32);
        }
    }

    #[test]
    fn capacity_one_with_many_shards() {
        let table = ShardedLru::new(1, 16);
        assert_eq!(table.shard_count(), 1);
        assert_eq!(fill(&table, 0..3), vec![Insert::Inserted, Insert::Evicted, Insert::Evicted]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn eviction_reaches_other_shards_when_own_is_empty() {
        let table: ShardedLru<u32, u32> = ShardedLru::new(4, 4);
        // 한 샤드에만 몰아넣고 다른 샤드로 가는 키를 삽입
        let target = table.shard_of(&0);
        let same: Vec<u32> = (0..10_000).filter(|k| table.shard_of(k) == target).take(4).collect();
        fill(&table, same.into_iter());
        assert_eq!(table.len(), 4);

        let other = (0..10_000).find(|k| table.shard_of(k) != target).unwrap();
        assert_eq!(fill(&table, other..other + 1), vec![Insert::Evicted]);
        assert_eq!(table.len(), 4);
        assert_eq!(table.lock(target).len(), 3);
    }

    // =============================================================================
    // 제거
    // =============================================================================

    #[test]
    fn removals_release_capacity() {
        let table = ShardedLru::new(10, 4);
        fill(&table, 0..10);
        assert_eq!(table.pop_lru_while(|v| *v < 3), 3);
        assert_eq!(table.len(), 7);
        assert_eq!(table.remove_where(|v| v % 2 == 0), 3);
        assert_eq!(table.len(), 4);

        assert!(fill(&table, 50..56).iter().all(|r| *r == Insert::Inserted));
        assert_eq!(table.len(), 10);

        table.clear();
        assert!(table.is_empty());
    }
}
