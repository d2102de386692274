use crate::domain::appointment::{Appointment, AppointmentId, UserId};
use crate::domain::money::Amount;
use crate::domain::phone::Msisdn;
use crate::error::{PaymentError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of an appointment seed file.
#[derive(Debug, Deserialize)]
struct AppointmentRecord {
    id: u64,
    user_id: u64,
    customer_phone: String,
    service_name: String,
    service_price: Decimal,
    date: NaiveDate,
}

impl TryFrom<AppointmentRecord> for Appointment {
    type Error = PaymentError;

    fn try_from(record: AppointmentRecord) -> Result<Self> {
        Ok(Appointment::new(
            AppointmentId(record.id),
            UserId(record.user_id),
            Msisdn::parse(&record.customer_phone)?,
            record.service_name,
            Amount::new(record.service_price)?,
            record.date,
        ))
    }
}

/// Reads appointments from a CSV source with the header
/// `id,user_id,customer_phone,service_name,service_price,date`.
///
/// Whitespace is trimmed and record lengths are flexible.
pub struct AppointmentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AppointmentReader<R> {
    /// Creates a new `AppointmentReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads rows; a bad row yields an error without ending the stream.
    pub fn appointments(self) -> impl Iterator<Item = Result<Appointment>> {
        self.reader
            .into_deserialize::<AppointmentRecord>()
            .map(|result| result.map_err(PaymentError::from).and_then(Appointment::try_from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::appointment::PaymentStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "id, user_id, customer_phone, service_name, service_price, date\n\
                    1, 7, 0712345678, Gel manicure, 45.00, 2025-06-01\n\
                    2, 8, +254 722 000 111, Pedicure, 30, 2025-06-02";
        let results: Vec<Result<Appointment>> =
            AppointmentReader::new(data.as_bytes()).appointments().collect();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.id, AppointmentId(1));
        assert_eq!(first.customer_phone.as_str(), "254712345678");
        assert_eq!(first.service_price.value(), dec!(45.00));
        assert_eq!(first.payment.status, PaymentStatus::Pending);
        assert_eq!(results[1].as_ref().unwrap().customer_phone.as_str(), "254722000111");
    }

    #[test]
    fn test_reader_malformed_rows() {
        let data = "id,user_id,customer_phone,service_name,service_price,date\n\
                    x,7,0712345678,Manicure,45,2025-06-01\n\
                    2,7,12,Manicure,45,2025-06-01\n\
                    3,7,0712345678,Manicure,0,2025-06-01\n\
                    4,7,0712345678,Manicure,45,2025-06-01";
        let results: Vec<Result<Appointment>> =
            AppointmentReader::new(data.as_bytes()).appointments().collect();

        assert!(matches!(results[0], Err(PaymentError::CsvError(_))));
        assert!(matches!(results[1], Err(PaymentError::InvalidPhone(_))));
        assert!(matches!(results[2], Err(PaymentError::ValidationError(_))));
        assert!(results[3].is_ok());
    }
}
