use crate::domain::appointment::{Appointment, AppointmentId, PaymentStatus};
use crate::domain::ledger::{LedgerEntry, LedgerInsert, NewLedgerEntry};
use crate::domain::ports::{AppointmentStore, Ledger};
use crate::domain::receipt::ReceiptCode;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Appointment rows keyed by big-endian id.
pub const CF_APPOINTMENTS: &str = "appointments";
/// Gateway request id -> appointment id.
pub const CF_GATEWAY_REQUESTS: &str = "gateway_requests";
/// Receipt held in an appointment's payment state -> appointment id.
pub const CF_APPOINTMENT_RECEIPTS: &str = "appointment_receipts";
/// Ledger rows keyed by big-endian insertion sequence.
pub const CF_LEDGER: &str = "ledger";
/// Receipt -> ledger sequence. The unique index behind `LedgerInsert::ReceiptExists`.
pub const CF_LEDGER_RECEIPTS: &str = "ledger_receipts";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_APPOINTMENTS,
    CF_GATEWAY_REQUESTS,
    CF_APPOINTMENT_RECEIPTS,
    CF_LEDGER,
    CF_LEDGER_RECEIPTS,
];

/// A persistent store implementation using RocksDB.
///
/// Serves as both the appointment store and the ledger. Each write that has
/// to check an index first (version, receipt uniqueness) holds a store-wide
/// async mutex and commits rows and indexes in a single `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    appointment_writes: Arc<Mutex<()>>,
    /// Next ledger sequence number.
    ledger_writes: Arc<Mutex<u64>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating
    /// any missing column families.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let next_seq = {
            let ledger = column(&db, CF_LEDGER)?;
            match db.iterator_cf(ledger, IteratorMode::End).next() {
                Some(item) => decode_u64(&item?.0)? + 1,
                None => 0,
            }
        };

        Ok(Self {
            db: Arc::new(db),
            appointment_writes: Arc::new(Mutex::new(())),
            ledger_writes: Arc::new(Mutex::new(next_seq)),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        column(&self.db, name)
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_id(&self, cf: &str, key: &[u8]) -> Result<Option<AppointmentId>> {
        self.db
            .get_cf(self.cf(cf)?, key)?
            .map(|bytes| decode_u64(&bytes).map(AppointmentId))
            .transpose()
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }
}

fn column<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name).ok_or_else(|| {
        PaymentError::InternalError(Box::new(std::io::Error::other(format!(
            "column family '{name}' not found"
        ))))
    })
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        PaymentError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("expected an 8-byte key, found {} bytes", bytes.len()),
        )))
    })?;
    Ok(u64::from_be_bytes(raw))
}

fn id_key(id: AppointmentId) -> [u8; 8] {
    id.0.to_be_bytes()
}

#[async_trait]
impl AppointmentStore for RocksDBStore {
    async fn insert(&self, appointment: Appointment) -> Result<bool> {
        let _guard = self.appointment_writes.lock().await;
        let key = id_key(appointment.id);
        let appointments = self.cf(CF_APPOINTMENTS)?;
        if self.db.get_pinned_cf(appointments, key)?.is_some() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(appointments, key, serde_json::to_vec(&appointment)?);
        if let Some(request_id) = &appointment.payment.gateway_request_id {
            batch.put_cf(self.cf(CF_GATEWAY_REQUESTS)?, request_id.as_bytes(), key);
        }
        if let Some(receipt) = &appointment.payment.receipt {
            batch.put_cf(self.cf(CF_APPOINTMENT_RECEIPTS)?, receipt.as_str().as_bytes(), key);
        }
        self.db.write(batch)?;
        Ok(true)
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        self.get_json(CF_APPOINTMENTS, &id_key(id))
    }

    async fn find_by_gateway_request(
        &self,
        gateway_request_id: &str,
    ) -> Result<Option<Appointment>> {
        match self.get_id(CF_GATEWAY_REQUESTS, gateway_request_id.as_bytes())? {
            Some(id) => self.get_json(CF_APPOINTMENTS, &id_key(id)),
            None => Ok(None),
        }
    }

    async fn find_by_receipt(&self, receipt: &ReceiptCode) -> Result<Option<AppointmentId>> {
        self.get_id(CF_APPOINTMENT_RECEIPTS, receipt.as_str().as_bytes())
    }

    async fn list_by_payment_status(&self, status: PaymentStatus) -> Result<Vec<Appointment>> {
        let all: Vec<Appointment> = self.scan(CF_APPOINTMENTS)?;
        Ok(all
            .into_iter()
            .filter(|a| a.payment.status == status)
            .collect())
    }

    async fn save(&self, mut appointment: Appointment) -> Result<Appointment> {
        let _guard = self.appointment_writes.lock().await;
        let key = id_key(appointment.id);
        let previous: Appointment = self
            .get_json(CF_APPOINTMENTS, &key)?
            .ok_or_else(|| PaymentError::NotFound(format!("Appointment {}", appointment.id)))?;

        if previous.version != appointment.version {
            return Err(PaymentError::ConcurrentModification(appointment.id));
        }
        if let Some(receipt) = &appointment.payment.receipt
            && let Some(holder) = self.get_id(CF_APPOINTMENT_RECEIPTS, receipt.as_str().as_bytes())?
            && holder != appointment.id
        {
            return Err(PaymentError::DuplicateReceipt(receipt.to_string()));
        }

        let requests = self.cf(CF_GATEWAY_REQUESTS)?;
        let receipts = self.cf(CF_APPOINTMENT_RECEIPTS)?;
        let mut batch = WriteBatch::default();
        if let Some(old) = &previous.payment.gateway_request_id {
            batch.delete_cf(requests, old.as_bytes());
        }
        if let Some(old) = &previous.payment.receipt {
            batch.delete_cf(receipts, old.as_str().as_bytes());
        }
        if let Some(request_id) = &appointment.payment.gateway_request_id {
            batch.put_cf(requests, request_id.as_bytes(), key);
        }
        if let Some(receipt) = &appointment.payment.receipt {
            batch.put_cf(receipts, receipt.as_str().as_bytes(), key);
        }

        appointment.version += 1;
        batch.put_cf(self.cf(CF_APPOINTMENTS)?, key, serde_json::to_vec(&appointment)?);
        self.db.write(batch)?;
        Ok(appointment)
    }
}

#[async_trait]
impl Ledger for RocksDBStore {
    async fn insert(&self, entry: NewLedgerEntry) -> Result<LedgerInsert> {
        let mut next_seq = self.ledger_writes.lock().await;
        let receipts = self.cf(CF_LEDGER_RECEIPTS)?;
        if let Some(receipt) = &entry.receipt
            && let Some(seq) = self.db.get_cf(receipts, receipt.as_str().as_bytes())?
        {
            let existing: LedgerEntry = self.get_json(CF_LEDGER, &seq)?.ok_or_else(|| {
                PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                    "ledger index points at a missing row for receipt {receipt}"
                ))))
            })?;
            return Ok(LedgerInsert::ReceiptExists(existing));
        }

        let entry = entry.into_entry(Uuid::new_v4());
        let key = next_seq.to_be_bytes();
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_LEDGER)?, key, serde_json::to_vec(&entry)?);
        if let Some(receipt) = &entry.receipt {
            batch.put_cf(receipts, receipt.as_str().as_bytes(), key);
        }
        self.db.write(batch)?;
        *next_seq += 1;
        Ok(LedgerInsert::Inserted(entry))
    }

    async fn find_by_receipt(&self, receipt: &ReceiptCode) -> Result<Option<LedgerEntry>> {
        match self
            .db
            .get_cf(self.cf(CF_LEDGER_RECEIPTS)?, receipt.as_str().as_bytes())?
        {
            Some(seq) => self.get_json(CF_LEDGER, &seq),
            None => Ok(None),
        }
    }

    async fn entries_for_appointment(&self, id: AppointmentId) -> Result<Vec<LedgerEntry>> {
        let all: Vec<LedgerEntry> = self.scan(CF_LEDGER)?;
        Ok(all
            .into_iter()
            .filter(|e| e.appointment_id == Some(id))
            .collect())
    }

    async fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.scan(CF_LEDGER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::appointment::UserId;
    use crate::domain::ledger::{LedgerStatus, PaymentSource};
    use crate::domain::money::Amount;
    use crate::domain::phone::Msisdn;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn appointment(id: u64) -> Appointment {
        Appointment::new(
            AppointmentId(id),
            UserId(3),
            Msisdn::parse("0712345678").unwrap(),
            "Gel manicure",
            Amount::new(dec!(45.00)).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
        )
    }

    fn entry(appointment_id: u64, receipt: Option<&str>) -> NewLedgerEntry {
        NewLedgerEntry {
            user_id: UserId(3),
            appointment_id: Some(AppointmentId(appointment_id)),
            receipt: receipt.map(|r| ReceiptCode::new(r).unwrap()),
            gateway_request_id: Some("ws_CO_1".to_string()),
            phone: Msisdn::parse("254712345678").unwrap(),
            amount: Amount::new(dec!(45.00)).unwrap(),
            status: LedgerStatus::Completed,
            source: PaymentSource::Push,
            result_code: Some("0".to_string()),
            result_description: None,
            initiated_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for name in COLUMN_FAMILIES {
            assert!(store.db.cf_handle(name).is_some(), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_rocksdb_appointment_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        assert!(AppointmentStore::insert(&store, appointment(1)).await.unwrap());
        assert!(!AppointmentStore::insert(&store, appointment(1)).await.unwrap());

        let mut loaded = AppointmentStore::get(&store, AppointmentId(1)).await.unwrap().unwrap();
        loaded.payment.status = PaymentStatus::Initiated;
        loaded.payment.gateway_request_id = Some("ws_CO_9".to_string());
        let saved = store.save(loaded.clone()).await.unwrap();
        assert_eq!(saved.version, 1);

        assert!(matches!(
            store.save(loaded).await,
            Err(PaymentError::ConcurrentModification(_))
        ));
        let found = store.find_by_gateway_request("ws_CO_9").await.unwrap().unwrap();
        assert_eq!(found, saved);
        assert_eq!(
            store
                .list_by_payment_status(PaymentStatus::Initiated)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_rocksdb_appointment_receipt_uniqueness() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        AppointmentStore::insert(&store, appointment(1)).await.unwrap();
        AppointmentStore::insert(&store, appointment(2)).await.unwrap();
        let receipt = ReceiptCode::new("SH12XY34ZA").unwrap();

        let mut a = AppointmentStore::get(&store, AppointmentId(1)).await.unwrap().unwrap();
        a.payment.receipt = Some(receipt.clone());
        store.save(a).await.unwrap();

        let mut b = AppointmentStore::get(&store, AppointmentId(2)).await.unwrap().unwrap();
        b.payment.receipt = Some(receipt.clone());
        assert!(matches!(
            store.save(b).await,
            Err(PaymentError::DuplicateReceipt(_))
        ));
        assert_eq!(
            AppointmentStore::find_by_receipt(&store, &receipt).await.unwrap(),
            Some(AppointmentId(1))
        );
    }

    #[tokio::test]
    async fn test_rocksdb_ledger_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            Ledger::insert(&store, entry(1, Some("QAB1CD2EFG"))).await.unwrap();
            Ledger::insert(&store, entry(1, None)).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let duplicate = Ledger::insert(&store, entry(2, Some("QAB1CD2EFG"))).await.unwrap();
        assert!(matches!(
            duplicate,
            LedgerInsert::ReceiptExists(ref e) if e.appointment_id == Some(AppointmentId(1))
        ));

        Ledger::insert(&store, entry(3, Some("QZZ9YY8XXW"))).await.unwrap();
        let all = store.all_entries().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].appointment_id, Some(AppointmentId(3)));
        assert_eq!(
            store.entries_for_appointment(AppointmentId(1)).await.unwrap().len(),
            2
        );
    }
}
