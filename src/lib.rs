//! Square payment gateway adapter.
//!
//! Turns host sale documents into gateway orders, drives payment
//! transactions through their state machine from gateway responses, and
//! keeps stored-card tokens in sync with the gateway's customer vault.

pub mod database;
pub mod error;
pub mod gateway;
pub mod idempotency;
pub mod model;
pub mod orchestrator;
pub mod order_builder;
pub mod server;
pub mod settings;
pub mod store;
pub mod vault;
