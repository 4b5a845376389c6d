use crate::core::equity::EquityProfile;
use crate::core::error::{AggregationError, Result};
use crate::core::store::ProfileStore;
use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const PROFILES_PARTITION: &str = "profiles";

fn persistence<E: std::fmt::Display>(e: E) -> AggregationError {
    AggregationError::Persistence(e.to_string())
}

/// Profiles stored in a fjall keyspace, one entry per profile keyed by
/// [`EquityProfile::key`], values as JSON. Keys repeated within one set get
/// a `#n` suffix so every profile written is read back.
pub struct FjallProfileStore {
    keyspace: Arc<Keyspace>,
    profiles: PartitionHandle,
}

impl FjallProfileStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(db_path).map_err(persistence)?;

        let keyspace = Config::new(db_path.join("fjall_db"))
            .open()
            .map_err(persistence)?;
        let profiles = keyspace
            .open_partition(PROFILES_PARTITION, PartitionCreateOptions::default())
            .map_err(persistence)?;
        Ok(Self {
            keyspace: Arc::new(keyspace),
            profiles,
        })
    }

    /// Runs blocking fjall work off the async executor.
    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Keyspace>, PartitionHandle) -> Result<T> + Send + 'static,
    {
        let keyspace = Arc::clone(&self.keyspace);
        let profiles = self.profiles.clone();
        tokio::task::spawn_blocking(move || work(keyspace, profiles))
            .await
            .map_err(persistence)?
    }
}

#[async_trait]
impl ProfileStore for FjallProfileStore {
    async fn replace_all(&self, profiles: &[EquityProfile]) -> Result<()> {
        let encoded = unique_keys(profiles)
            .into_iter()
            .zip(profiles)
            .map(|(key, p)| Ok((key, serde_json::to_vec(p).map_err(persistence)?)))
            .collect::<Result<Vec<_>>>()?;

        self.blocking(move |keyspace, partition| {
            let mut batch = keyspace.batch();
            // A key is either removed or written in one batch, never both.
            for entry in partition.keys() {
                let key = entry.map_err(persistence)?;
                if !encoded.iter().any(|(k, _)| k.as_bytes() == &*key) {
                    batch.remove(&partition, key);
                }
            }
            for (key, value) in &encoded {
                batch.insert(&partition, key.as_bytes(), value.as_slice());
            }
            batch.commit().map_err(persistence)?;
            keyspace.persist(PersistMode::SyncAll).map_err(persistence)?;
            debug!("Committed {} profiles to disk", encoded.len());
            Ok(())
        })
        .await
    }

    async fn load_all(&self) -> Result<Vec<EquityProfile>> {
        self.blocking(|_, partition| {
            partition
                .iter()
                .map(|entry| {
                    let (_, value) = entry.map_err(persistence)?;
                    serde_json::from_slice(&value).map_err(persistence)
                })
                .collect()
        })
        .await
    }
}

/// Profile keys in input order, the second and later holders of a key
/// numbered from `#2`.
fn unique_keys(profiles: &[EquityProfile]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    profiles
        .iter()
        .map(|p| {
            let key = p.key();
            let count = seen.entry(key.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                key
            } else {
                debug!("Duplicate profile key {}, storing as #{}", key, count);
                format!("{key}#{count}")
            }
        })
        .collect()
}
