//! SQL Engine module for reading relational tables into Arrow

pub mod ast_utils;
pub mod reader;
pub mod tables;

#[cfg(test)]
mod tests;
