//! Application state.

use std::sync::Arc;

use jjj_firestore::{LazyFirestoreStore, MemoryUserStore, UserStore};
use tracing::{info, warn};

use crate::config::{ApiConfig, StoreBackend};
use crate::services::{BillingService, Providers, UsageLedger, UserService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn UserStore>,
    pub users: UserService,
    pub ledger: UsageLedger,
    pub billing: BillingService,
    pub providers: Providers,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// The Firestore client is built on first use, so a missing project or
    /// credentials file shows up as degraded requests rather than a boot failure.
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn UserStore> = match config.store_backend {
            StoreBackend::Firestore => {
                info!("Using Firestore user store");
                Arc::new(LazyFirestoreStore::from_env())
            }
            StoreBackend::Memory => {
                if config.is_production() {
                    warn!("In-memory user store in production: records are lost on restart");
                }
                info!("Using in-memory user store");
                Arc::new(MemoryUserStore::new())
            }
        };

        let providers = Providers::from_config(&config.providers)?;
        Ok(Self::with_components(config, store, providers))
    }

    /// Assemble state from explicit parts.
    pub fn with_components(config: ApiConfig, store: Arc<dyn UserStore>, providers: Providers) -> Self {
        let users = UserService::new(Arc::clone(&store));
        let ledger = UsageLedger::new(Arc::clone(&store), config.quota.clone(), config.is_production());
        let billing = BillingService::new(Arc::clone(&store));

        Self {
            config,
            store,
            users,
            ledger,
            billing,
            providers,
        }
    }
}
