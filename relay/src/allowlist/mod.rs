//! Sender allowlist: CIDR ranges the webhook sender publishes for itself.
//!
//! ## Lifecycle
//!
//! ```text
//! startup: override? ──yes──> install(Override)
//!             │no
//!             └─> fetch remote ──ok──> install(Remote) + persist
//!                      │err
//!                      └─> load file ──ok──> install(CachedFile)
//!                               │err
//!                               └─> empty (sender checks report unavailable)
//! ```

pub mod cache;
pub mod matcher;
pub mod types;

pub use cache::{
    bootstrap, configured_source, load_from_disk, persist_to_disk, spawn_refresh_task,
    AllowlistCache,
};
pub use matcher::{addr_in_range, is_in_range};
pub use types::{AllowlistSnapshot, AllowlistSource, HooksDocument, NetworkRange, SnapshotOrigin};
