//! Mount lifecycle: loading archives into scratch directories, resolving
//! virtual paths, and writing changes back.
//!
//! The central type is [`MountRegistry`]. Each mounted archive is recorded as
//! a [`MountEntry`] keyed by the archive's [`CanonicalPath`], so an archive
//! can be mounted at most once per registry regardless of how its path is
//! spelled.
//!
//! ```text
//!   load(path, mode)          unload(path)
//!   ─────────────────► Loaded ────────────► Unloading ──► (removed)
//!                        ▲                      │
//!                        └──── pack failed ─────┘
//! ```
//!
//! [`CanonicalPath`]: crate::canonical::CanonicalPath

mod discover;
mod entry;
mod options;
mod registry;
mod resolve;
pub mod shutdown;
mod sync;

pub use discover::{DiscoverFailure, DiscoverReport};
pub use entry::{MountEntry, MountMode, MountState, OpenMode};
pub use options::{DiscoverPolicy, MountOptions};
pub use registry::{LoadResult, MountInfo, MountRegistry, UnloadResult};
pub use resolve::Resolved;
pub use shutdown::{ShutdownFailure, ShutdownReport};
pub use sync::SyncReport;
