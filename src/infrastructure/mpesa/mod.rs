//! M-Pesa Daraja STK push gateway.

pub mod client;
pub mod wire;

pub use client::{AccessToken, MpesaClient, MpesaConfig, MpesaEnvironment};
