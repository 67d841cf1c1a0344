//! Package manager functionality.
//!
//! Provides:
//! - Parsing dependency declarations into resolver-specific descriptors
//! - Pluggable resolvers (npm registry, local files)
//! - Level-synchronized, hoisting dependency tree construction
//! - Lock records for reproducible reinstalls
//! - A write-once, integrity-checked content cache
//! - Extraction of a resolved tree with lifecycle scripts and bin links

pub mod builder;
pub mod cache;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod file;
pub mod link;
pub mod lockfile;
pub mod npm;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod tarball;
pub mod tree;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::DepTreeBuilder;
pub use cache::{item_key, ContentCache, FsContentCache};
pub use descriptor::{convert_dependencies_map, parse_dependency_item, PackageDescriptor, DEFAULT_RESOLVER};
pub use error::{codes as pkg_codes, PkgError};
pub use extract::{ExtractSummary, ExtractionPipeline, DEFAULT_MODULES_FOLDER};
pub use file::FileResolver;
pub use link::{bin_entries, link_bins};
pub use lockfile::{lock_file_name, FsLockStore, LockRecord, LockStore, LockStores, DEFAULT_PROFILE};
pub use npm::NpmResolver;
pub use queue::{ResolutionQueue, ResolutionQueueItem};
pub use registry::{RegistryClient, DEFAULT_REGISTRY, REGISTRY_ENV};
pub use resolver::{DependencyResolver, PackageMetadata, Resolvers};
pub use tarball::{download_tarball, unpack_tgz, MAX_TARBALL_SIZE};
pub use tree::{DepTree, DepTreeNode, NodeId};
pub use version::{max_satisfying, resolve_version, satisfies, NpmRange};
