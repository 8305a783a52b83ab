//! Domain layer - Pure computational logic
//!
//! This module contains pure functions and algorithms without I/O dependencies.

pub mod chain;
pub mod charset;
pub mod hash;
pub mod table_format;
pub mod task;

/// Map keyed by digest or id, backed by FxHash when available
#[cfg(feature = "hashmap-index")]
pub type FastMap<K, V> = rustc_hash::FxHashMap<K, V>;

#[cfg(not(feature = "hashmap-index"))]
pub type FastMap<K, V> = std::collections::HashMap<K, V>;

#[cfg(feature = "hashmap-index")]
pub type FastSet<K> = rustc_hash::FxHashSet<K>;

#[cfg(not(feature = "hashmap-index"))]
pub type FastSet<K> = std::collections::HashSet<K>;
