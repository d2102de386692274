#![cfg(feature = "storage-rocksdb")]

mod common;

use assert_cmd::cargo_bin;
use common::{CUSTOMER, amount, callback, success};
use mpesa_reconciler::bootstrap::{self, Storage};
use mpesa_reconciler::domain::appointment::{AppointmentId, PaymentStatus};
use mpesa_reconciler::infrastructure::in_memory::{InMemoryNotifier, StaticIdentity};
use std::process::Command;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_completed_payment_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: a push completes against RocksDB.
    {
        let storage = Storage::open(Some(db_path.as_path())).unwrap();
        let csv = "id,user_id,customer_phone,service_name,service_price,date\n\
                   1,7,0712345678,Gel manicure,45.00,2025-06-01\n";
        bootstrap::seed_appointments(&storage.appointments, csv.as_bytes())
            .await
            .unwrap();

        let gateway = Arc::new(common::ScriptedGateway::default());
        let state = bootstrap::build_state(
            &storage,
            gateway,
            Arc::new(StaticIdentity::default()),
            Arc::new(InMemoryNotifier::new()),
        );
        let initiated = state
            .payments
            .initiate(CUSTOMER, AppointmentId(1), None)
            .await
            .unwrap();
        let request_id = initiated.appointment.payment.gateway_request_id.unwrap();
        state
            .payments
            .handle_callback(callback(&request_id, success("QAB1CD2EFG", Some("45.00"), None)))
            .await
            .unwrap();
    }

    // 2. Reopen: state and ledger were recovered.
    {
        let storage = Storage::open(Some(db_path.as_path())).unwrap();
        let appointment = storage
            .appointments
            .get(AppointmentId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(appointment.payment.status, PaymentStatus::Completed);
        assert_eq!(appointment.payment.amount_paid, Some(amount("45.00")));
        assert_eq!(storage.ledger.all_entries().await.unwrap().len(), 1);
    }

    // 3. The binary exports the recovered ledger.
    let output = Command::new(cargo_bin!("mpesa-reconciler"))
        .arg("export-ledger")
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("id,user_id,appointment_id,receipt,"));
    assert!(stdout.contains("QAB1CD2EFG"));
    assert!(stdout.contains("completed,push"));
}
