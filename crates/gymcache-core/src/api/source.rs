use async_trait::async_trait;

use super::ApiError;
use crate::models::{CachedExercise, CachedRoutine, MembershipSnapshot, UserId};

/// The backend reads the sync depends on.
///
/// Implementations return routines with days and exercises already ordered
/// by their order fields, and exercises ordered by name.
#[async_trait]
pub trait BackendSource: Send + Sync {
    async fn fetch_routines(&self) -> Result<Vec<CachedRoutine>, ApiError>;

    async fn fetch_exercises(&self) -> Result<Vec<CachedExercise>, ApiError>;

    /// The single most recent membership of `user_id`, if any.
    async fn fetch_latest_membership(
        &self,
        user_id: &UserId,
    ) -> Result<Option<MembershipSnapshot>, ApiError>;
}
