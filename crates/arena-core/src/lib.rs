//! arena-core: Shared types for the contest arena server and its clients
//!
//! This crate contains the wire-level enums, money handling and validation rules that
//! both the server and any client need to agree on.

pub mod errors;
pub mod money;
pub mod types;
pub mod validation;

pub use errors::*;
pub use types::*;
pub use validation::*;
