//! Fast Pair Core - Seeker-side pairing state machine for Fast Pair providers.
//!
//! This crate implements:
//! - The pairer that drives one provider from handshake to account key
//! - Contracts for the Bluetooth adapter, handshake and account storage
//! - Single-shot completion callbacks and pairing metrics
//! - Layered configuration

#![forbid(unsafe_code)]

// Core state machine
pub mod pairing;
pub mod callbacks;
pub mod delegate;

// Collaborator contracts
pub mod handshake;
pub mod platform;
pub mod store;

// Infrastructure
pub mod metrics;
pub mod config;

// Supporting modules
pub mod errors;
pub mod types;
pub mod keys;
pub mod harness;
