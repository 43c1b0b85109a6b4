//! raw_loader: read a PostgreSQL table into Arrow and hand it to DataFusion

pub mod commands;
pub mod display;
pub mod distributed;
pub mod logging;
pub mod sql_engine;
