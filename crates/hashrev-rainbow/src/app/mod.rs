//! Application layer - Use case implementations
//!
//! This module coordinates domain and infrastructure layers to implement use cases.

pub mod config;
pub mod coverage;
pub mod error;
pub mod generator;
pub mod progress;
pub mod searcher;
pub mod service;
