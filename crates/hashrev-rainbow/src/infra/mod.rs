//! Infrastructure layer - I/O and external dependencies
//!
//! This module handles store contracts, their implementations and table
//! file operations.

pub mod file_task_store;
pub mod memory_store;
pub mod store;
pub mod table_io;
