//! Store health check

use opendal::Operator;
use vks_core::{VksError, VksResult};

/// Verify the store is reachable by listing the root
pub async fn check_health(op: &Operator) -> VksResult<()> {
    op.list("/")
        .await
        .map(|_| ())
        .map_err(|e| VksError::StoreUnavailable(format!("store health check failed: {e}")))
}

/// Returns true if the store is reachable, false otherwise (non-panicking)
pub async fn is_healthy(op: &Operator) -> bool {
    check_health(op).await.is_ok()
}
