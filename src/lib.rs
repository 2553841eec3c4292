//! PesaPal M-PESA checkout
//!
//! This library provides phone number validation, the PesaPal v3 API client,
//! the payment attempt orchestrator with bounded status polling, and the HTTP
//! handlers that let a browser checkout talk to PesaPal without holding
//! merchant credentials.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod models;
pub mod orchestrator;
pub mod payments;
pub mod phone;
pub mod poller;
pub mod rate_limit;
pub mod state;
pub mod util;
