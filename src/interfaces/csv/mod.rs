pub mod appointment_reader;
pub mod ledger_writer;
