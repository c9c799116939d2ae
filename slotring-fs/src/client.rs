//! The filesystem adapter: host VFS entry points mapped onto remote calls.
//!
//! Every entry point builds one request, runs it through [`Rpc`], interprets
//! the reply and updates the local [`InodeTable`] before returning. Calls are
//! synchronous and may be issued from any number of threads at once.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use log::debug;
use slotring::Transport;

use crate::ROOT_ID;
use crate::error::{FsError, Result};
use crate::inode::{InodeTable, RemoteInode, S_IFDIR, S_IFMT, S_IFREG, Timespec};
use crate::message::{
    self, AttrSnapshot, DirEntry, ENTRY_RESPONSE_SIZE, MIN_READDIR_BUFFER, ReadDirReply,
    Request, STATFS_RESPONSE_SIZE, STATUS_SIZE, StatFs, WRITE_RESPONSE_SIZE,
};
use crate::rpc::Rpc;
use crate::session::Session;
use slotring::PAGE_SIZE;

/// Client tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Response buffer offered to each ReadDir call, in bytes. Clamped to
    /// `[MIN_READDIR_BUFFER, PAGE_SIZE]` so any single entry fits.
    pub readdir_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            readdir_buffer: PAGE_SIZE,
        }
    }
}

/// Outcome of a lookup. A missing name is an answer, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found(RemoteInode),
    Absent,
}

impl Lookup {
    pub fn found(self) -> Option<RemoteInode> {
        match self {
            Lookup::Found(inode) => Some(inode),
            Lookup::Absent => None,
        }
    }
}

bitflags! {
    /// Which fields of a [`SetAttr`] the caller is changing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SetAttrValid: u32 {
        const MODE = 1 << 0;
        const UID = 1 << 1;
        const GID = 1 << 2;
        const SIZE = 1 << 3;
        const ATIME = 1 << 4;
        const MTIME = 1 << 5;
        const CTIME = 1 << 6;
    }
}

/// Requested attribute change. Fields not named in `valid` are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetAttr {
    pub valid: SetAttrValid,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
}

impl SetAttr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Permission bits. The file type is never changed.
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self.valid |= SetAttrValid::MODE;
        self
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self.valid |= SetAttrValid::UID;
        self
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = gid;
        self.valid |= SetAttrValid::GID;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self.valid |= SetAttrValid::SIZE;
        self
    }

    pub fn atime(mut self, atime: Timespec) -> Self {
        self.atime = atime;
        self.valid |= SetAttrValid::ATIME;
        self
    }

    pub fn mtime(mut self, mtime: Timespec) -> Self {
        self.mtime = mtime;
        self.valid |= SetAttrValid::MTIME;
        self
    }

    pub fn ctime(mut self, ctime: Timespec) -> Self {
        self.ctime = ctime;
        self.valid |= SetAttrValid::CTIME;
        self
    }

    /// Overlay the requested fields onto `current`.
    fn apply(&self, current: &RemoteInode) -> AttrSnapshot {
        let mut snap = AttrSnapshot::from(current);
        if self.valid.contains(SetAttrValid::MODE) {
            snap.mode = (current.mode & S_IFMT) | (self.mode & !S_IFMT);
        }
        if self.valid.contains(SetAttrValid::UID) {
            snap.uid = self.uid;
        }
        if self.valid.contains(SetAttrValid::GID) {
            snap.gid = self.gid;
        }
        if self.valid.contains(SetAttrValid::SIZE) {
            snap.size = self.size;
        }
        if self.valid.contains(SetAttrValid::ATIME) {
            snap.atime = self.atime;
        }
        if self.valid.contains(SetAttrValid::MTIME) {
            snap.mtime = self.mtime;
        }
        if self.valid.contains(SetAttrValid::CTIME) {
            snap.ctime = self.ctime;
        }
        snap
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Never filled.
    Empty,
    Valid,
    /// The last read failed; contents are all zero.
    Error,
}

/// One page of file data plus its fill state.
pub struct Page {
    data: Box<[u8]>,
    state: PageState,
}

impl Page {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
            state: PageState::Empty,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn fail(&mut self) {
        self.data.fill(0);
        self.state = PageState::Error;
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page").field("state", &self.state).finish()
    }
}

/// Symlink target text returned by [`FsClient::readlink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    text: Vec<u8>,
}

impl LinkTarget {
    pub fn as_bytes(&self) -> &[u8] {
        &self.text
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl fmt::Display for LinkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.text))
    }
}

/// Resumable directory enumeration.
///
/// Holds the peer's opaque cursor between calls. The cursor of every reply is
/// kept, including the final empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirStream {
    id: u64,
    cursor: u64,
    done: bool,
}

impl DirStream {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// A mounted remote filesystem.
pub struct FsClient {
    session: Session,
    rpc: Rpc,
    inodes: InodeTable,
    config: ClientConfig,
}

impl FsClient {
    /// Mount `target` (a session id such as `"/7"`) over `transport`.
    ///
    /// Attaches by fetching the root's attributes.
    pub fn mount(transport: Arc<Transport>, target: &str, config: ClientConfig) -> Result<Self> {
        let session = Session::parse(target)?;
        let client = Self {
            session,
            rpc: Rpc::new(transport),
            inodes: InodeTable::new(),
            config,
        };
        let root = client.getattr(ROOT_ID)?;
        debug!(
            "mounted session {} read_only={} root mode={:o}",
            session,
            session.is_read_only(),
            root.mode
        );
        Ok(client)
    }

    /// Drop every cached record and release the transport handle.
    pub fn unmount(self) {
        debug!(
            "unmount session {} ({} cached inodes)",
            self.session,
            self.inodes.len()
        );
        self.inodes.clear();
    }

    pub fn session(&self) -> Session {
        self.session
    }

    /// Cached record for the export root.
    pub fn root(&self) -> Option<RemoteInode> {
        self.inodes.get(ROOT_ID)
    }

    /// Current local record for `id`, if any response has mentioned it.
    pub fn cached(&self, id: u64) -> Option<RemoteInode> {
        self.inodes.get(id)
    }

    /// Drop the local record for `id`.
    pub fn forget(&self, id: u64) -> Option<RemoteInode> {
        self.inodes.forget(id)
    }

    // === Call helpers ===

    fn writable(&self) -> Result<()> {
        if self.session.is_read_only() {
            return Err(FsError::ReadOnly);
        }
        Ok(())
    }

    fn entry_call(&self, req: Request<'_>) -> Result<RemoteInode> {
        let bytes = req.encode(self.session.id())?;
        let mut resp = [0u8; ENTRY_RESPONSE_SIZE];
        let len = self.rpc.call(&bytes, &mut resp)?;
        let inode = message::decode_entry(&resp[..len])?;
        Ok(self.inodes.refresh(inode))
    }

    fn status_call(&self, req: Request<'_>) -> Result<()> {
        let bytes = req.encode(self.session.id())?;
        let mut resp = [0u8; STATUS_SIZE];
        let len = self.rpc.call(&bytes, &mut resp)?;
        message::decode_status(&resp[..len])
    }

    // === Entry points ===

    pub fn lookup(&self, parent: u64, name: &[u8]) -> Result<Lookup> {
        match self.entry_call(Request::Lookup { parent, name }) {
            Ok(inode) => Ok(Lookup::Found(inode)),
            Err(e) if e.is_not_found() => Ok(Lookup::Absent),
            Err(e) => Err(e),
        }
    }

    pub fn getattr(&self, id: u64) -> Result<RemoteInode> {
        self.entry_call(Request::GetAttr { id })
    }

    /// Apply `attr` to `id`.
    ///
    /// The peer always receives a full snapshot: fields not being changed are
    /// taken from the cached record, which is fetched first if absent.
    pub fn setattr(&self, id: u64, attr: &SetAttr) -> Result<RemoteInode> {
        self.writable()?;
        let current = match self.inodes.get(id) {
            Some(inode) => inode,
            None => self.getattr(id)?,
        };
        let snapshot = attr.apply(&current);
        self.entry_call(Request::SetAttr { id, attr: snapshot })
    }

    /// Create a file. A mode without type bits makes a regular file.
    pub fn create(&self, parent: u64, name: &[u8], mode: u32) -> Result<RemoteInode> {
        let mode = if mode & S_IFMT == 0 {
            mode | S_IFREG
        } else {
            mode
        };
        self.mknod(parent, name, mode, 0)
    }

    pub fn mkdir(&self, parent: u64, name: &[u8], mode: u32) -> Result<RemoteInode> {
        self.mknod(parent, name, (mode & !S_IFMT) | S_IFDIR, 0)
    }

    /// Create a node of any type; the type comes from `mode`.
    pub fn mknod(&self, parent: u64, name: &[u8], mode: u32, rdev: u32) -> Result<RemoteInode> {
        self.writable()?;
        self.entry_call(Request::Create {
            parent,
            mode,
            rdev,
            name,
        })
    }

    pub fn unlink(&self, parent: u64, name: &[u8]) -> Result<()> {
        self.remove(parent, name, false)
    }

    pub fn rmdir(&self, parent: u64, name: &[u8]) -> Result<()> {
        self.remove(parent, name, true)
    }

    fn remove(&self, parent: u64, name: &[u8], is_dir: bool) -> Result<()> {
        self.writable()?;
        self.status_call(Request::Unlink {
            parent,
            is_dir,
            name,
        })
    }

    pub fn symlink(&self, parent: u64, name: &[u8], target: &[u8]) -> Result<RemoteInode> {
        self.writable()?;
        self.entry_call(Request::Symlink {
            parent,
            name,
            target,
        })
    }

    /// Add a hard link to `target` named `name` under `new_parent`.
    ///
    /// The reply describes `target` itself, whose record is refreshed.
    pub fn link(&self, target: u64, new_parent: u64, name: &[u8]) -> Result<RemoteInode> {
        self.writable()?;
        self.entry_call(Request::HardLink {
            target,
            new_parent,
            name,
        })
    }

    pub fn rename(
        &self,
        old_parent: u64,
        old_name: &[u8],
        new_parent: u64,
        new_name: &[u8],
    ) -> Result<()> {
        self.writable()?;
        self.status_call(Request::Rename {
            old_parent,
            new_parent,
            old_name,
            new_name,
        })
    }

    /// One ReadDir call starting at `cursor`.
    pub fn readdir(&self, id: u64, cursor: u64) -> Result<ReadDirReply> {
        let size = self
            .config
            .readdir_buffer
            .clamp(MIN_READDIR_BUFFER, PAGE_SIZE);
        let bytes = Request::ReadDir {
            id,
            cursor,
            max_size: size as u32,
        }
        .encode(self.session.id())?;
        let mut resp = vec![0u8; size];
        let len = self.rpc.call(&bytes, &mut resp)?;
        message::decode_readdir(&resp[..len])
    }

    pub fn opendir(&self, id: u64) -> DirStream {
        DirStream {
            id,
            cursor: 0,
            done: false,
        }
    }

    /// Next page of entries, or `None` once the peer returns an empty page.
    pub fn readdir_next(&self, stream: &mut DirStream) -> Result<Option<Vec<DirEntry>>> {
        if stream.done {
            return Ok(None);
        }
        let reply = self.readdir(stream.id, stream.cursor)?;
        stream.cursor = reply.cursor;
        if reply.entries.is_empty() {
            stream.done = true;
            return Ok(None);
        }
        Ok(Some(reply.entries))
    }

    /// Read page `index` of `id` into `page`.
    ///
    /// Returns the number of data bytes the peer delivered; the rest of the
    /// page is zero. On failure the whole page is zeroed and marked
    /// [`PageState::Error`].
    pub fn read_page(&self, id: u64, index: u64, page: &mut Page) -> Result<usize> {
        let result = self.read_page_inner(id, index, page);
        match &result {
            Ok(len) => {
                page.data[*len..].fill(0);
                page.state = PageState::Valid;
            }
            Err(_) => page.fail(),
        }
        result
    }

    fn read_page_inner(&self, id: u64, index: u64, page: &mut Page) -> Result<usize> {
        let bytes = Request::ReadPage {
            id,
            offset: page_offset(index)?,
            len: PAGE_SIZE as u32,
        }
        .encode(self.session.id())?;
        let mut status = [0u8; STATUS_SIZE];
        let [status_len, data_len] = self
            .rpc
            .call_legs([bytes.as_slice()], [&mut status[..], &mut page.data[..]])?;
        message::decode_status(&status[..status_len])?;
        Ok(data_len)
    }

    /// Write `data` at byte `offset` of `id`. At most one page per call.
    ///
    /// The bytes are posted straight from `data`. On success the cached size
    /// grows to cover the written range. A range ending past `u64::MAX` is
    /// rejected before anything is posted.
    pub fn write(&self, id: u64, offset: u64, data: &[u8]) -> Result<usize> {
        self.writable()?;
        if data.len() > PAGE_SIZE {
            return Err(FsError::TooLarge(data.len()));
        }
        if data.is_empty() {
            return Ok(0);
        }
        if offset.checked_add(data.len() as u64).is_none() {
            return Err(FsError::InvalidArgument);
        }
        let header = Request::WritePage {
            id,
            offset,
            len: data.len() as u32,
        }
        .encode(self.session.id())?;
        let mut resp = [0u8; WRITE_RESPONSE_SIZE];
        let [len] = self
            .rpc
            .call_legs([header.as_slice(), data], [&mut resp[..]])?;
        let written = (message::decode_write(&resp[..len])? as usize).min(data.len());
        self.inodes.grow_size(id, offset + written as u64);
        Ok(written)
    }

    /// Write the first `len` bytes of `page` as page `index` of `id`.
    pub fn write_page(&self, id: u64, index: u64, page: &Page, len: usize) -> Result<usize> {
        if len > PAGE_SIZE {
            return Err(FsError::TooLarge(len));
        }
        self.write(id, page_offset(index)?, &page.data[..len])
    }

    pub fn readlink(&self, id: u64) -> Result<LinkTarget> {
        let bytes = Request::ReadLink { id }.encode(self.session.id())?;
        let mut resp = vec![0u8; PAGE_SIZE];
        let len = self.rpc.call(&bytes, &mut resp)?;
        let text = message::decode_readlink(&resp[..len])?;
        Ok(LinkTarget { text })
    }

    pub fn statfs(&self, id: u64) -> Result<StatFs> {
        let bytes = Request::StatFs { id }.encode(self.session.id())?;
        let mut resp = [0u8; STATFS_RESPONSE_SIZE];
        let len = self.rpc.call(&bytes, &mut resp)?;
        message::decode_statfs(&resp[..len])
    }

    pub fn fsync(&self, id: u64, datasync: bool) -> Result<()> {
        self.status_call(Request::Fsync { id, datasync })
    }
}

/// Byte offset of page `index`.
fn page_offset(index: u64) -> Result<u64> {
    index
        .checked_mul(PAGE_SIZE as u64)
        .ok_or(FsError::InvalidArgument)
}

impl fmt::Debug for FsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsClient")
            .field("session", &self.session)
            .field("cached", &self.inodes.len())
            .finish()
    }
}
