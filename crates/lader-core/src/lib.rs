//! Lader Core - register store, decisions, and shared error types
//!
//! This crate provides the I/O-facing foundation used by the simulation and
//! the command line: the Modbus-style register table, the decision record the
//! controller publishes, and the common error taxonomy.

// Clippy pedantic allows - these are intentional design choices
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::float_cmp)]

pub mod decision;
pub mod error;
pub mod mapping;
pub mod register;
pub mod types;
pub mod util;

pub use decision::{Decision, ACTION_COUNT};
pub use error::{LaderError, Result};
pub use mapping::{RegisterDef, RegisterKind};
pub use register::{Register, RegisterStore, SharedRegisterStore};
pub use types::*;
