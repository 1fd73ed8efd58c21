//! In-memory virtual file system with a B*-tree name index.
//!
//! A hierarchical namespace of files and directories, a byte-level
//! content model, a self-describing compression container, and a
//! secondary by-name index for sublinear lookup anywhere in the tree.
//!
//! ## Pieces
//!
//! - [`content`] - growable byte buffers with offset-checked access
//! - [`stream`] - fixed-window buffered reads and writes over a buffer
//! - [`compression`] - the `CMP` container with two variable-width LZW
//!   dictionary policies
//! - [`index`] - the B*-tree (B+-leaves, two-thirds fill, triple
//!   split/merge rebalancing)
//! - [`node`] - the parent/child node graph with weak back-edges
//! - [`path`] - path parsing and resolution preference
//! - [`vfs`] - the public state machine tying everything together
//! - [`snapshot`] - JSON export of the tree, stored back into the VFS
//!
//! ## Example
//!
//! ```rust,no_run
//! use starfs::{Result, Vfs};
//!
//! fn main() -> Result<()> {
//!     let mut vfs = Vfs::new();
//!     vfs.mkdir("/docs")?;
//!     vfs.create_file("/docs/note.txt")?;
//!     vfs.write_file("/docs/note.txt", "hello", false)?;
//!     assert_eq!(vfs.read_file("/docs/note.txt")?, "hello");
//!
//!     vfs.compress("/docs")?;
//!     vfs.decompress("/docs")?;
//!     vfs.save_json("/state.json")?;
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod content;
pub mod error;
pub mod index;
pub mod node;
pub mod path;
pub mod snapshot;
pub mod stream;
pub mod vfs;

pub use compression::Algorithm;
pub use content::Content;
pub use error::{Result, VfsError};
pub use index::{BStarTree, IndexViolation};
pub use node::{NodeKind, NodeRef, NodeStats};
pub use path::Preference;
pub use stream::{ByteStream, StreamMode};
pub use vfs::Vfs;
