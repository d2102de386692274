use crate::domain::ledger::LedgerEntry;
use crate::error::Result;
use std::io::Write;

/// Writes ledger rows as CSV, one row per entry with a header line.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_entries(&mut self, entries: impl IntoIterator<Item = LedgerEntry>) -> Result<()> {
        for entry in entries {
            self.writer.serialize(entry)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::appointment::{AppointmentId, UserId};
    use crate::domain::ledger::{LedgerStatus, NewLedgerEntry, PaymentSource};
    use crate::domain::money::Amount;
    use crate::domain::phone::Msisdn;
    use crate::domain::receipt::ReceiptCode;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_writes_header_and_rows() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap();
        let completed = NewLedgerEntry {
            user_id: UserId(7),
            appointment_id: Some(AppointmentId(1)),
            receipt: Some(ReceiptCode::new("QAB1CD2EFG").unwrap()),
            gateway_request_id: Some("ws_CO_1".to_string()),
            phone: Msisdn::parse("254712345678").unwrap(),
            amount: Amount::new(dec!(45.00)).unwrap(),
            status: LedgerStatus::Completed,
            source: PaymentSource::Push,
            result_code: Some("0".to_string()),
            result_description: None,
            initiated_at: at,
            completed_at: at,
        };
        let mut cancelled = completed.clone();
        cancelled.receipt = None;
        cancelled.status = LedgerStatus::Cancelled;
        cancelled.result_code = Some("1032".to_string());

        let mut out = Vec::new();
        LedgerWriter::new(&mut out)
            .write_entries([
                completed.into_entry(Uuid::nil()),
                cancelled.into_entry(Uuid::nil()),
            ])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,user_id,appointment_id,receipt,"));
        assert!(lines[1].contains("QAB1CD2EFG"));
        assert!(lines[1].contains(",45.00,completed,push,0,"));
        assert!(lines[2].contains(",,ws_CO_1,"));
        assert!(lines[2].contains("cancelled"));
    }
}
