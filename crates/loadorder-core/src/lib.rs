//! Core logic for resolving the loading order of plugin extensions.
//!
//! Extensions declare where they want to be placed relative to each other
//! (`FIRST`, `LAST`, `BEFORE <id>`, `AFTER <id>`). This crate parses those
//! declarations, resolves them into a single order per extension point, and
//! reports the conflicting pair when no order satisfies them.

pub mod config;
pub mod constants;
pub mod extension;
pub mod order;
pub mod sort;

pub use config::{ExtensionConfig, LoadorderConfig};
pub use extension::{Extension, ExtensionDescriptor, ExtensionRegistry};
pub use order::{parse_order, InvalidSpecification, LoadingOrder};
pub use sort::{sort, sorted_indices, ConflictError, Orderable};
