//! Core types and store contracts for Meterhub: tenant credentials,
//! device bindings, readings, and poll outcomes.

pub mod store;
pub mod types;
