//! Wiring of the movement use-cases onto a concrete store.

use std::sync::Arc;

use anyhow::Context;

use crate::config::{InfraConfig, PaginationConfig};
use crate::movements::{
    DispenseMedicineUseCase, FetchMovementsUseCase, RegisterEntryUseCase, RegisterExitUseCase,
};
use crate::repositories::{InMemoryPharmaStore, PharmaStore, PostgresPharmaStore};

/// Every stock-movement operation, sharing one store.
pub struct MovementServices {
    pub register_exit: RegisterExitUseCase,
    pub register_entry: RegisterEntryUseCase,
    pub dispense: DispenseMedicineUseCase,
    pub fetch: FetchMovementsUseCase,
}

impl MovementServices {
    pub fn from_store<S: PharmaStore + 'static>(store: Arc<S>, pages: PaginationConfig) -> Self {
        Self {
            register_exit: RegisterExitUseCase::from_store(store.clone()),
            register_entry: RegisterEntryUseCase::from_store(store.clone()),
            dispense: DispenseMedicineUseCase::from_store(store.clone()),
            fetch: FetchMovementsUseCase::from_store(store, pages),
        }
    }

    /// Dev/test wiring.
    pub fn in_memory(pages: PaginationConfig) -> (Self, Arc<InMemoryPharmaStore>) {
        let store = InMemoryPharmaStore::arc();
        (Self::from_store(store.clone(), pages), store)
    }
}

/// Build the services selected by `config.database.use_persistent`.
pub async fn build_services(config: &InfraConfig) -> anyhow::Result<MovementServices> {
    if !config.database.use_persistent {
        tracing::info!("using in-memory stock store");
        let (services, _) = MovementServices::in_memory(config.pagination);
        return Ok(services);
    }

    let store = PostgresPharmaStore::connect(&config.database)
        .await
        .context("connecting to postgres")?;
    store
        .ensure_schema()
        .await
        .context("creating stock movement schema")?;
    tracing::info!(
        max_connections = config.database.max_connections,
        "using postgres stock store"
    );
    Ok(MovementServices::from_store(Arc::new(store), config.pagination))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_builds_in_memory_services() {
        let config = InfraConfig::from_toml("").unwrap();
        let services = build_services(&config).await.unwrap();

        let page = services
            .fetch
            .exits(None, None, 1)
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.meta.page, 1);
    }
}
