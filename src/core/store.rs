//! Persistence contract for the merged profile set.

use crate::core::equity::EquityProfile;
use crate::core::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Swaps the stored set for `profiles` as a single unit. Failures are
    /// reported as `Persistence` and never partially applied.
    async fn replace_all(&self, profiles: &[EquityProfile]) -> Result<()>;

    async fn load_all(&self) -> Result<Vec<EquityProfile>>;
}
