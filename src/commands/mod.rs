//! Commands run by the `rawload` binary

pub mod config;
pub mod load;
pub mod schema;
