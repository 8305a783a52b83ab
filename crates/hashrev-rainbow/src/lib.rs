//! hashrev-rainbow - Rainbow table engine for reversing MD5 digests
//!
//! This crate provides functionality to:
//! - Generate chains of alternating hash and reduction steps
//! - Reverse full (32 hex) or truncated (16 hex) digests against stored chains
//! - Track long-running lookups with throttled progress persistence
//! - Resume unfinished lookups after a restart

pub mod app;
pub mod constants;
pub mod domain;
pub mod infra;

// Re-export commonly used types
pub use app::config::EngineConfig;
pub use app::error::{ServiceError, ServiceResult};
pub use app::generator::GenerateRequest;
pub use app::searcher::{LookupOutcome, lookup};
pub use app::service::{LookupHandle, LookupService};
pub use domain::chain::{Chain, ChainParams, hash_chain, verify_chain};
pub use domain::charset::CharsetSelector;
pub use domain::hash::{TargetHash, gen_hash, gen_hash_hex, reduce_hash};
pub use domain::task::{TaskStatus, TaskStatusView};
