//! Wiring shared by the binary and the integration tests.

use crate::application::engine::ReconciliationEngine;
use crate::application::payments::PaymentService;
use crate::application::verification::VerificationService;
use crate::domain::ports::{AppointmentStoreRef, GatewayRef, IdentityRef, LedgerRef, NotifierRef};
use crate::error::Result;
use crate::infrastructure::in_memory::{InMemoryAppointmentStore, InMemoryLedger};
use crate::interfaces::csv::appointment_reader::AppointmentReader;
use crate::interfaces::http::routers::AppState;
use chrono::TimeDelta;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const ROCKSDB_FALLBACK_WARNING: &str = "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage.";

#[derive(Clone)]
pub struct Storage {
    pub appointments: AppointmentStoreRef,
    pub ledger: LedgerRef,
}

impl Storage {
    pub fn in_memory() -> Self {
        Self {
            appointments: Arc::new(InMemoryAppointmentStore::new()),
            ledger: Arc::new(InMemoryLedger::new()),
        }
    }

    /// RocksDB at `db_path` when given and the `storage-rocksdb` feature is
    /// enabled, in-memory otherwise.
    pub fn open(db_path: Option<&Path>) -> Result<Self> {
        #[cfg(feature = "storage-rocksdb")]
        if let Some(path) = db_path {
            let store = crate::infrastructure::rocksdb::RocksDBStore::open(path)?;
            info!(path = %path.display(), "storage: using RocksDB");
            return Ok(Self {
                appointments: Arc::new(store.clone()),
                ledger: Arc::new(store),
            });
        }

        #[cfg(not(feature = "storage-rocksdb"))]
        if db_path.is_some() {
            warn!("{ROCKSDB_FALLBACK_WARNING}");
        }

        Ok(Self::in_memory())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub existing: usize,
    pub invalid: usize,
}

/// Loads appointments from CSV. Rows that fail to parse are logged and
/// skipped; appointments already in the store are left untouched.
pub async fn seed_appointments<R: Read>(
    store: &AppointmentStoreRef,
    source: R,
) -> Result<SeedReport> {
    let mut report = SeedReport::default();
    for (index, row) in AppointmentReader::new(source).appointments().enumerate() {
        match row {
            Ok(appointment) => {
                if store.insert(appointment).await? {
                    report.inserted += 1;
                } else {
                    report.existing += 1;
                }
            }
            Err(err) => {
                warn!(row = index + 1, error = %err, "seed: skipping invalid appointment row");
                report.invalid += 1;
            }
        }
    }
    info!(
        inserted = report.inserted,
        existing = report.existing,
        invalid = report.invalid,
        "seed: appointments loaded"
    );
    Ok(report)
}

/// Builds the engine and both services around one set of collaborators.
pub fn build_state(
    storage: &Storage,
    gateway: GatewayRef,
    identity: IdentityRef,
    notifier: NotifierRef,
) -> AppState {
    let engine = Arc::new(ReconciliationEngine::new(
        Arc::clone(&storage.appointments),
        Arc::clone(&storage.ledger),
        notifier,
    ));
    AppState {
        payments: Arc::new(PaymentService::new(
            Arc::clone(&engine),
            Arc::clone(&storage.appointments),
            gateway,
            Arc::clone(&identity),
        )),
        verification: Arc::new(VerificationService::new(
            engine,
            Arc::clone(&storage.appointments),
            identity,
        )),
    }
}

/// Runs the expiry sweep once a minute until the task is dropped.
pub fn spawn_expiry_sweep(
    payments: Arc<PaymentService>,
    stale_after_minutes: u64,
) -> tokio::task::JoinHandle<()> {
    let grace = i64::try_from(stale_after_minutes)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .unwrap_or(TimeDelta::MAX);
    info!(stale_after_minutes, "sweep: expiring stale pushes");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            if let Err(err) = payments.expire_stale(grace).await {
                warn!(error = %err, "sweep: expiry pass failed");
            }
        }
    })
}
