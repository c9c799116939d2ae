//! slotring-fs: paravirtualized filesystem client over shared-memory slot rings.
//!
//! # Architecture
//!
//! ```text
//! host VFS entry points
//!        │
//!        ▼
//!   FsClient ──── InodeTable (cached RemoteInode records)
//!        │ build request / interpret reply
//!        ▼
//!   message (codec) ──▶ Rpc (allocate → arm RX → post TX → await)
//!                              │
//!                              ▼
//!                     slotring::Transport ◀──▶ peer (file server)
//! ```
//!
//! - One mount = one [`Session`]; id 0 mounts read-only.
//! - Every entry point is a synchronous call: the caller's thread polls the
//!   rings until the peer answers. Nothing retries or times out.
//! - [`loopback::LoopbackServer`] answers the protocol from an in-memory tree,
//!   for tests and the benchmark binary.

pub mod client;
pub mod error;
pub mod inode;
pub mod loopback;
pub mod message;
pub mod rpc;
pub mod session;

pub use client::{
    ClientConfig, DirStream, FsClient, LinkTarget, Lookup, Page, PageState, SetAttr, SetAttrValid,
};
pub use error::{FsError, Result};
pub use inode::{FileType, RemoteInode, Timespec};
pub use message::{DirEntry, Opcode, ReadDirReply, StatFs};
pub use session::Session;

pub use slotring::PAGE_SIZE;

/// Inode id of the export root, attached at mount.
pub const ROOT_ID: u64 = 1;
