//! Seed commitment ledger.
//!
//! One commitment per user backs every game round: the hash of the active
//! server seed is published before any round under it is played, a
//! successor seed is pre-committed, and a strictly increasing round counter
//! scopes each outcome. Rotation swaps in the successor and discloses the
//! retired seed for audit.

use crate::config::SeedCacheConfig;
use crate::errors::EngineError;
use crate::fairness;
use crate::store::Store;
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Active commitment record for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCommitment {
    pub user_id: String,
    pub client_seed: String,
    /// Secret until rotated out.
    pub server_seed: String,
    /// Published commitment: SHA-256 of `server_seed`.
    pub server_seed_hash: String,
    /// Pre-committed successor, secret until it becomes active.
    pub next_server_seed: String,
    pub next_server_seed_hash: String,
    /// Round counter; incremented once per round, never reused.
    pub nonce: u64,
}

impl SeedCommitment {
    /// Fresh commitment with 128-bit client entropy and 256-bit server
    /// seeds, counter at zero.
    pub fn generate(user_id: &str) -> Self {
        let (server_seed, server_seed_hash) = generate_server_seed();
        let (next_server_seed, next_server_seed_hash) = generate_server_seed();
        Self {
            user_id: user_id.to_string(),
            client_seed: random_hex(16),
            server_seed,
            server_seed_hash,
            next_server_seed,
            next_server_seed_hash,
            nonce: 0,
        }
    }

    /// Public projection: commitments and counter only, never a secret.
    pub fn view(&self) -> SeedCommitmentView {
        SeedCommitmentView {
            client_seed: self.client_seed.clone(),
            server_seed_hash: self.server_seed_hash.clone(),
            next_server_seed_hash: self.next_server_seed_hash.clone(),
            nonce: self.nonce,
        }
    }
}

/// Player-visible commitment state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedCommitmentView {
    pub client_seed: String,
    pub server_seed_hash: String,
    pub next_server_seed_hash: String,
    pub nonce: u64,
}

/// Result of a rotation: the new public view plus the retired pair,
/// disclosed so every round played under it can be audited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotatedSeed {
    pub active: SeedCommitmentView,
    pub revealed_server_seed: String,
    pub revealed_server_seed_hash: String,
}

fn generate_server_seed() -> (String, String) {
    let seed = random_hex(32);
    let hash = fairness::commitment_hash(&seed);
    (seed, hash)
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

struct CacheEntry {
    seed: SeedCommitment,
    touched: Instant,
}

/// Idle-timeout cache of active commitments, injected into the seed
/// service as an explicit dependency. A sweep task evicts stale entries;
/// reads also check the TTL so an un-swept entry is never served stale.
pub struct SeedCache {
    entries: DashMap<String, CacheEntry>,
    idle_ttl: Duration,
}

impl SeedCache {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            idle_ttl,
        }
    }

    pub fn get(&self, user_id: &str) -> Option<SeedCommitment> {
        let mut entry = self.entries.get_mut(user_id)?;
        if entry.touched.elapsed() > self.idle_ttl {
            drop(entry);
            self.entries.remove(user_id);
            return None;
        }
        entry.touched = Instant::now();
        Some(entry.seed.clone())
    }

    pub fn put(&self, seed: SeedCommitment) {
        self.entries.insert(
            seed.user_id.clone(),
            CacheEntry {
                seed,
                touched: Instant::now(),
            },
        );
    }

    pub fn evict(&self, user_id: &str) {
        self.entries.remove(user_id);
    }

    /// Drop every entry idle past the TTL.
    pub fn sweep(&self) {
        let ttl = self.idle_ttl;
        self.entries.retain(|_, entry| entry.touched.elapsed() <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Background eviction timer.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                cache.sweep();
            }
        })
    }
}

/// Seed ledger operations over the store, with the cache as a read
/// optimization. Counter increments are always persisted before a round's
/// outcome is trusted.
pub struct SeedService {
    store: Arc<dyn Store>,
    cache: Arc<SeedCache>,
}

impl SeedService {
    pub fn new(store: Arc<dyn Store>, config: &SeedCacheConfig) -> Self {
        Self {
            store,
            cache: Arc::new(SeedCache::new(config.idle_ttl())),
        }
    }

    pub fn cache(&self) -> &Arc<SeedCache> {
        &self.cache
    }

    /// Active commitment for the user, created lazily on first use.
    pub async fn get_or_create(&self, user_id: &str) -> Result<SeedCommitment, EngineError> {
        if let Some(seed) = self.cache.get(user_id) {
            return Ok(seed);
        }

        let seed = match self.store.seed(user_id).await? {
            Some(seed) => seed,
            None => {
                let seed = SeedCommitment::generate(user_id);
                self.store.put_seed(&seed).await?;
                tracing::debug!(user = user_id, "created seed commitment");
                seed
            }
        };
        self.cache.put(seed.clone());
        Ok(seed)
    }

    /// Consume one round from the commitment: the incremented counter is
    /// durably persisted before the caller derives the outcome, so a crash
    /// cannot replay the same apparent round with a different payout.
    pub async fn consume_round(&self, seed: &mut SeedCommitment) -> Result<(), EngineError> {
        seed.nonce += 1;
        if let Err(e) = self.store.put_seed(seed).await {
            // The round is not reported as final; drop the cached copy so
            // the next request re-reads the persisted counter.
            self.cache.evict(&seed.user_id);
            return Err(e.into());
        }
        self.cache.put(seed.clone());
        Ok(())
    }

    /// Rotate: the pre-committed successor becomes active, a fresh
    /// successor is committed, the counter resets and the retired seed is
    /// attached to its settled sessions for audit.
    pub async fn rotate(&self, user_id: &str) -> Result<RotatedSeed, EngineError> {
        let Some(mut seed) = self.store.seed(user_id).await? else {
            return Err(EngineError::SeedNotFound);
        };

        let retired_seed = std::mem::take(&mut seed.server_seed);
        let retired_hash = std::mem::take(&mut seed.server_seed_hash);

        seed.server_seed = std::mem::take(&mut seed.next_server_seed);
        seed.server_seed_hash = std::mem::take(&mut seed.next_server_seed_hash);
        let (next_seed, next_hash) = generate_server_seed();
        seed.next_server_seed = next_seed;
        seed.next_server_seed_hash = next_hash;
        seed.client_seed = random_hex(16);
        seed.nonce = 0;

        self.store.put_seed(&seed).await?;
        self.cache.evict(user_id);
        self.store
            .reveal_server_seed(user_id, &retired_hash, &retired_seed)
            .await?;

        tracing::debug!(user = user_id, "rotated seed commitment");
        Ok(RotatedSeed {
            active: seed.view(),
            revealed_server_seed: retired_seed,
            revealed_server_seed_hash: retired_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedCacheConfig;
    use crate::store::MemoryStore;

    fn service() -> SeedService {
        SeedService::new(Arc::new(MemoryStore::new()), &SeedCacheConfig::default())
    }

    #[test]
    fn test_generated_commitment_hashes_verify() {
        let seed = SeedCommitment::generate("alice");
        assert_eq!(
            fairness::commitment_hash(&seed.server_seed),
            seed.server_seed_hash
        );
        assert_eq!(
            fairness::commitment_hash(&seed.next_server_seed),
            seed.next_server_seed_hash
        );
        assert_eq!(seed.nonce, 0);
        // 128-bit client entropy, 256-bit server seeds, hex encoded.
        assert_eq!(seed.client_seed.len(), 32);
        assert_eq!(seed.server_seed.len(), 64);
    }

    #[test]
    fn test_view_never_carries_secrets() {
        let seed = SeedCommitment::generate("alice");
        let raw = serde_json::to_string(&seed.view()).expect("serialize");
        assert!(!raw.contains(&seed.server_seed));
        assert!(!raw.contains(&seed.next_server_seed));
    }

    #[tokio::test]
    async fn test_get_or_create_is_stable() {
        let service = service();
        let first = service.get_or_create("alice").await.unwrap();
        let second = service.get_or_create("alice").await.unwrap();
        assert_eq!(first.server_seed, second.server_seed);
        assert_eq!(first.client_seed, second.client_seed);
    }

    #[tokio::test]
    async fn test_consume_round_persists_before_returning() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let service = SeedService::new(store.clone(), &SeedCacheConfig::default());

        let mut seed = service.get_or_create("alice").await.unwrap();
        service.consume_round(&mut seed).await.unwrap();
        assert_eq!(seed.nonce, 1);

        let persisted = store.seed("alice").await.unwrap().unwrap();
        assert_eq!(persisted.nonce, 1);
    }

    #[tokio::test]
    async fn test_rotation_promotes_the_committed_successor() {
        let service = service();
        let before = service.get_or_create("alice").await.unwrap();

        let mut seed = before.clone();
        service.consume_round(&mut seed).await.unwrap();

        let rotated = service.rotate("alice").await.unwrap();
        assert_eq!(rotated.revealed_server_seed, before.server_seed);
        assert_eq!(rotated.revealed_server_seed_hash, before.server_seed_hash);
        assert_eq!(
            rotated.active.server_seed_hash,
            before.next_server_seed_hash
        );
        assert_eq!(rotated.active.nonce, 0);

        // The promoted seed still verifies, and a fresh successor exists.
        let after = service.get_or_create("alice").await.unwrap();
        assert_eq!(after.server_seed, before.next_server_seed);
        assert_eq!(
            fairness::commitment_hash(&after.next_server_seed),
            after.next_server_seed_hash
        );
        assert_ne!(after.next_server_seed, before.next_server_seed);
    }

    #[tokio::test]
    async fn test_rotation_without_commitment_fails() {
        let service = service();
        assert!(matches!(
            service.rotate("nobody").await,
            Err(EngineError::SeedNotFound)
        ));
    }

    #[test]
    fn test_cache_expires_idle_entries() {
        let cache = SeedCache::new(Duration::from_millis(0));
        cache.put(SeedCommitment::generate("alice"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("alice").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_sweep_removes_expired_entries() {
        let cache = SeedCache::new(Duration::from_millis(0));
        cache.put(SeedCommitment::generate("alice"));
        cache.put(SeedCommitment::generate("bob"));
        std::thread::sleep(Duration::from_millis(5));
        cache.sweep();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_cache_touch_extends_lifetime() {
        let cache = SeedCache::new(Duration::from_secs(60));
        cache.put(SeedCommitment::generate("alice"));
        assert!(cache.get("alice").is_some());
        cache.sweep();
        assert_eq!(cache.len(), 1);
    }
}
