//! Distributed converter: turns a table snapshot into a partitioned DataFusion dataframe

pub mod frame;
pub mod session;

pub use frame::DistributedFrame;
pub use session::{ProcessingSession, SessionBuilder};
