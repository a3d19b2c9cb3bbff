// web-server/src/lib.rs
pub mod api;
pub mod credentials;
pub mod ergo_proof;
pub mod error;
pub mod middleware;
pub mod nonce;
pub mod oracle;
pub mod registry;
pub mod session_binder;
pub mod store;
pub mod utils;
pub mod verifier;

use actix::{Addr, SyncArbiter};
use common::Config;
use std::sync::Arc;

use crate::registry::RegistryActor;
use crate::store::Store;

/// Start the store worker pool. Must run inside an actix system.
pub fn start_registry(store: Store, config: Arc<Config>) -> Addr<RegistryActor> {
    let workers = config.database.workers.max(1);
    tracing::info!("Starting {} registry workers", workers);
    SyncArbiter::start(workers, move || RegistryActor::new(store.clone(), config.clone()))
}
