//! Domain model of appointment payments: value objects, the payment state
//! machine and the ports the application layer depends on.

pub mod appointment;
pub mod event;
pub mod ledger;
pub mod money;
pub mod notification;
pub mod phone;
pub mod ports;
pub mod receipt;
pub mod reconcile;
