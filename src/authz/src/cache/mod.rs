//! Caching of directory entities
//!
//! [`LoadingCache`] is the generic machinery; [`SubjectCache`] wires three of
//! them (subjects by name, teams and roles by id) to a directory.

pub mod loading;
pub mod subject;

pub use loading::{CacheStats, LoadingCache};
pub use subject::{SubjectCache, SubjectCacheStats};
