//! Core building blocks of the conduit engine.
//!
//! - **Identifier**: curi configuration and minting
//! - **Policy**: access policy types and proxy decision helpers
//! - **Record**: stored conduit shape and model defaults
//! - **Validation**: declared field schema and policy validator

pub mod identifier;
pub mod policy;
pub mod record;
pub mod validation;
