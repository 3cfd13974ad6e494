use std::sync::Arc;

use tracing::info;

use shared_config::{AppConfig, StoreBackend};

use crate::memory::MemoryStore;
use crate::store::{ClinicStore, StoreError};
use crate::supabase::SupabaseStore;

/// Handles shared by every route. Built once in `main` and passed down.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ClinicStore>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn ClinicStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }

    /// Default config over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(AppConfig::default(), Arc::new(MemoryStore::new()))
    }
}

/// Open the configured backend and verify it answers.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn ClinicStore>, StoreError> {
    let store: Arc<dyn ClinicStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Supabase => {
            if !config.is_configured() {
                return Err(StoreError::Backend(
                    "SUPABASE_URL and SUPABASE_ANON_PUBLIC_KEY are required for the supabase store".to_string(),
                ));
            }
            Arc::new(SupabaseStore::new(config))
        }
    };

    store.health_check().await?;
    info!("Opened {} store", store.backend_name());

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_open_memory_store() {
        let store = open_store(&AppConfig::default()).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_supabase_store_requires_configuration() {
        let config = AppConfig {
            store_backend: StoreBackend::Supabase,
            ..AppConfig::default()
        };

        assert_matches!(open_store(&config).await.err(), Some(StoreError::Backend(_)));
    }
}
