use crate::core::equity::EquityProfile;
use crate::core::error::Result;
use crate::core::store::ProfileStore;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory profile store; the whole set is swapped under one write lock.
#[derive(Clone, Default)]
pub struct MemoryProfileStore {
    inner: Arc<RwLock<Vec<EquityProfile>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn replace_all(&self, profiles: &[EquityProfile]) -> Result<()> {
        let mut stored = self.inner.write().await;
        *stored = profiles.to_vec();
        debug!("Stored {} profiles in memory", stored.len());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<EquityProfile>> {
        Ok(self.inner.read().await.clone())
    }
}
