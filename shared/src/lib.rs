//! Shared types and models for the Warehouse Management Platform
//!
//! This crate contains the domain model and the pure decision logic of the
//! stock allocation engine (FEFO planning, unit normalization, state
//! machines), shared between the backend and other components of the system.

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::*;
