//! Shared types and wire format for opal.
//!
//! Everything the engine and the CLI exchange lives here: interface URIs,
//! implementation ids, versions, architectures, feeds, bindings, selection
//! sets, and the signed-feed envelope. All types are plain data with serde
//! derives; verification and I/O live in `opal-core`.

pub mod arch;
pub mod feed;
pub mod selections;
pub mod signed;
pub mod types;
pub mod version;

pub use arch::{Arch, HostArch};
pub use feed::{Archive, ArchiveFormat, Binding, EnvironmentBinding, EnvMode, Feed, Implementation, Requirement};
pub use selections::{Selection, SelectionSet, SelectionsError};
pub use signed::{FeedSignature, SignedFeed};
pub use types::{ImplId, InterfaceUri, Stability};
pub use version::Version;
