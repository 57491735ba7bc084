//! # courier-core
//!
//! Core types, traits, configuration, and error handling for the Courier relay.

pub mod chunk;
pub mod config;
pub mod error;
pub mod marker;
pub mod message;
pub mod traits;
