//! CLI command modules

pub mod compare;
pub mod config;
pub mod registers;
pub mod run;
