//! The _signproxy_ library crate.

pub mod cli;
pub mod config;
pub mod constants;
pub mod signing;
