use crate::store::Store;

/// Drops password reset codes past their expiry.
pub async fn run(store: &Store) {
    tracing::debug!("reset_code_cleanup: start");
    match store.cleanup_expired_reset_codes() {
        Ok(count) => {
            if count > 0 {
                tracing::info!(cleaned = count, "reset_code_cleanup: done");
            }
        }
        Err(e) => tracing::error!(error = %e, "reset_code_cleanup failed"),
    }
}
