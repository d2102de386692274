#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use mpesa_reconciler::bootstrap::{self, Storage};
use mpesa_reconciler::domain::appointment::{Appointment, AppointmentId, PaymentStatus, UserId};
use mpesa_reconciler::domain::event::{GatewayCallback, GatewayOutcome, SuccessfulPayment};
use mpesa_reconciler::domain::money::Amount;
use mpesa_reconciler::domain::phone::Msisdn;
use mpesa_reconciler::domain::ledger::{LedgerEntry, LedgerInsert, LedgerStatus, NewLedgerEntry};
use mpesa_reconciler::domain::ports::{
    Ledger, LedgerRef, PaymentGateway, PushAccepted, PushRequest,
};
use mpesa_reconciler::domain::receipt::ReceiptCode;
use mpesa_reconciler::error::Result;
use mpesa_reconciler::infrastructure::in_memory::{InMemoryNotifier, StaticIdentity};
use mpesa_reconciler::interfaces::http::routers::AppState;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

pub const ADMIN: UserId = UserId(1);
pub const CUSTOMER: UserId = UserId(7);
pub const OTHER_CUSTOMER: UserId = UserId(8);

/// Gateway double: hands out sequential request ids and answers status
/// queries from a script, defaulting to "still pending".
#[derive(Default)]
pub struct ScriptedGateway {
    next_id: AtomicU64,
    outcomes: Mutex<HashMap<String, GatewayOutcome>>,
    pushes: Mutex<Vec<PushRequest>>,
}

impl ScriptedGateway {
    pub async fn script(&self, gateway_request_id: &str, outcome: GatewayOutcome) {
        self.outcomes
            .lock()
            .await
            .insert(gateway_request_id.to_string(), outcome);
    }

    pub async fn pushes(&self) -> Vec<PushRequest> {
        self.pushes.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate_push(&self, request: &PushRequest) -> Result<PushAccepted> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.pushes.lock().await.push(request.clone());
        Ok(PushAccepted {
            gateway_request_id: format!("ws_CO_{n}"),
            correlation_id: format!("29115-{n}"),
            customer_message: Some("Success. Request accepted for processing".to_string()),
        })
    }

    async fn query_status(&self, gateway_request_id: &str) -> Result<GatewayOutcome> {
        Ok(self
            .outcomes
            .lock()
            .await
            .get(gateway_request_id)
            .cloned()
            .unwrap_or(GatewayOutcome::StillPending))
    }
}

/// Ledger that stalls before every insert, widening the window between a
/// receipt lookup and its ledger write.
pub struct SlowLedger {
    inner: LedgerRef,
    delay: Duration,
}

impl SlowLedger {
    pub fn new(inner: LedgerRef, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Ledger for SlowLedger {
    async fn insert(&self, entry: NewLedgerEntry) -> Result<LedgerInsert> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert(entry).await
    }

    async fn find_by_receipt(&self, receipt: &ReceiptCode) -> Result<Option<LedgerEntry>> {
        self.inner.find_by_receipt(receipt).await
    }

    async fn entries_for_appointment(&self, id: AppointmentId) -> Result<Vec<LedgerEntry>> {
        self.inner.entries_for_appointment(id).await
    }

    async fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.inner.all_entries().await
    }
}

pub struct Harness {
    pub state: AppState,
    pub storage: Storage,
    pub notifier: InMemoryNotifier,
    pub gateway: Arc<ScriptedGateway>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(Storage::in_memory())
    }

    pub fn with_storage(storage: Storage) -> Self {
        let notifier = InMemoryNotifier::new();
        let gateway = Arc::new(ScriptedGateway::default());
        let state = bootstrap::build_state(
            &storage,
            gateway.clone(),
            Arc::new(StaticIdentity::new([ADMIN])),
            Arc::new(notifier.clone()),
        );
        Self {
            state,
            storage,
            notifier,
            gateway,
        }
    }

    /// Adds an appointment for `owner` priced at `price`, phone 0712345678.
    pub async fn add_appointment(&self, id: u64, owner: UserId, price: &str) -> AppointmentId {
        let appointment = Appointment::new(
            AppointmentId(id),
            owner,
            Msisdn::parse("0712345678").unwrap(),
            "Gel manicure",
            amount(price),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        );
        assert!(self.storage.appointments.insert(appointment).await.unwrap());
        AppointmentId(id)
    }

    pub async fn appointment(&self, id: AppointmentId) -> Appointment {
        self.storage.appointments.get(id).await.unwrap().unwrap()
    }

    /// Fails if the ledger holds a completed row for an appointment that is
    /// not completed.
    pub async fn assert_ledger_matches_state(&self) {
        for entry in self.storage.ledger.all_entries().await.unwrap() {
            let Some(id) = entry.appointment_id else {
                continue;
            };
            if entry.status == LedgerStatus::Completed {
                let status = self.appointment(id).await.payment.status;
                assert_eq!(
                    status,
                    PaymentStatus::Completed,
                    "completed ledger row for appointment {id} in state {status}"
                );
            }
        }
    }

    /// Initiates a push as the owner and returns the gateway request id.
    pub async fn initiate(&self, id: AppointmentId, owner: UserId) -> String {
        let initiated = self.state.payments.initiate(owner, id, None).await.unwrap();
        initiated.appointment.payment.gateway_request_id.unwrap()
    }
}

pub fn amount(raw: &str) -> Amount {
    Amount::new(Decimal::from_str(raw).unwrap()).unwrap()
}

pub fn success(receipt: &str, paid: Option<&str>, phone: Option<&str>) -> GatewayOutcome {
    GatewayOutcome::Succeeded(SuccessfulPayment {
        receipt: ReceiptCode::new(receipt).unwrap(),
        amount: paid.map(amount),
        phone: phone.map(|p| Msisdn::parse(p).unwrap()),
        paid_at: None,
    })
}

pub fn callback(gateway_request_id: &str, outcome: GatewayOutcome) -> GatewayCallback {
    GatewayCallback {
        gateway_request_id: gateway_request_id.to_string(),
        correlation_id: None,
        outcome,
    }
}

/// A successful webhook body as the gateway sends it.
pub fn success_callback_json(
    gateway_request_id: &str,
    receipt: &str,
    paid: &str,
    phone: &str,
) -> String {
    format!(
        r#"{{"Body":{{"stkCallback":{{
            "MerchantRequestID":"29115-34620561-1",
            "CheckoutRequestID":"{gateway_request_id}",
            "ResultCode":0,
            "ResultDesc":"The service request is processed successfully.",
            "CallbackMetadata":{{"Item":[
                {{"Name":"Amount","Value":{paid}}},
                {{"Name":"MpesaReceiptNumber","Value":"{receipt}"}},
                {{"Name":"TransactionDate","Value":20250601093000}},
                {{"Name":"PhoneNumber","Value":{phone}}}
            ]}}}}}}}}"#
    )
}

pub fn failure_callback_json(gateway_request_id: &str, code: u32, description: &str) -> String {
    format!(
        r#"{{"Body":{{"stkCallback":{{
            "MerchantRequestID":"29115-34620561-1",
            "CheckoutRequestID":"{gateway_request_id}",
            "ResultCode":{code},
            "ResultDesc":"{description}"}}}}}}"#
    )
}
