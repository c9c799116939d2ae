//! Wire messages between the client and the file-serving peer.
//!
//! All integers are little-endian and packed with no padding. Every request
//! starts with the prefix
//!
//! ```text
//! session_id: u16 | opcode: u16
//! ```
//!
//! followed by a fixed per-opcode header and at most one raw tail (a name,
//! two names back-to-back, or name + symlink target). A whole request must
//! fit in one page.

use crate::error::{FsError, Result};
use crate::inode::{RemoteInode, Timespec};
use slotring::PAGE_SIZE;

/// Request prefix: session id + opcode.
pub const PREFIX_SIZE: usize = 4;

/// Bare status response.
pub const STATUS_SIZE: usize = 4;

/// Status plus the full attribute record.
pub const ENTRY_RESPONSE_SIZE: usize = 76;

/// Status plus the returned cursor, before any directory entries.
pub const READDIR_HEADER_SIZE: usize = 12;

/// Fixed part of one directory entry: id, offset, type, record length.
pub const DIRENT_HEADER_SIZE: usize = 19;

/// Longest name a directory entry may carry.
pub const NAME_MAX: usize = 255;

/// Smallest ReadDir buffer that always has room for the next entry.
pub const MIN_READDIR_BUFFER: usize = READDIR_HEADER_SIZE + DIRENT_HEADER_SIZE + NAME_MAX;

/// Status plus the byte count acknowledged by the peer.
pub const WRITE_RESPONSE_SIZE: usize = 8;

pub const STATFS_RESPONSE_SIZE: usize = 52;

/// Attribute snapshot carried by SetAttr.
pub const ATTR_SNAPSHOT_SIZE: usize = 44;

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    GetAttr = 0,
    SetAttr = 1,
    Lookup = 2,
    Create = 3,
    Unlink = 4,
    Symlink = 5,
    Rename = 6,
    HardLink = 7,
    ReadDir = 8,
    ReadPage = 9,
    WritePage = 10,
    ReadLink = 11,
    StatFs = 12,
    Fsync = 13,
}

impl Opcode {
    /// TX slots one operation of this kind occupies.
    pub fn tx_legs(self) -> u32 {
        match self {
            Opcode::WritePage => 2,
            _ => 1,
        }
    }

    /// RX slots one operation of this kind occupies.
    pub fn rx_legs(self) -> u32 {
        match self {
            Opcode::ReadPage => 2,
            _ => 1,
        }
    }
}

impl TryFrom<u16> for Opcode {
    type Error = FsError;

    fn try_from(value: u16) -> Result<Self> {
        Ok(match value {
            0 => Opcode::GetAttr,
            1 => Opcode::SetAttr,
            2 => Opcode::Lookup,
            3 => Opcode::Create,
            4 => Opcode::Unlink,
            5 => Opcode::Symlink,
            6 => Opcode::Rename,
            7 => Opcode::HardLink,
            8 => Opcode::ReadDir,
            9 => Opcode::ReadPage,
            10 => Opcode::WritePage,
            11 => Opcode::ReadLink,
            12 => Opcode::StatFs,
            13 => Opcode::Fsync,
            other => return Err(FsError::UnknownOpcode(other)),
        })
    }
}

/// Complete attribute set sent by SetAttr.
///
/// The protocol has no "leave unchanged" marker, so every field is always
/// meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttrSnapshot {
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
}

impl From<&RemoteInode> for AttrSnapshot {
    fn from(inode: &RemoteInode) -> Self {
        Self {
            size: inode.size,
            mode: inode.mode,
            uid: inode.uid,
            gid: inode.gid,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        }
    }
}

/// A request as it appears on the wire, borrowing its name tails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    GetAttr {
        id: u64,
    },
    SetAttr {
        id: u64,
        attr: AttrSnapshot,
    },
    Lookup {
        parent: u64,
        name: &'a [u8],
    },
    /// Regular files, directories and device nodes alike; the type lives in
    /// `mode`.
    Create {
        parent: u64,
        mode: u32,
        rdev: u32,
        name: &'a [u8],
    },
    Unlink {
        parent: u64,
        is_dir: bool,
        name: &'a [u8],
    },
    Symlink {
        parent: u64,
        name: &'a [u8],
        target: &'a [u8],
    },
    Rename {
        old_parent: u64,
        new_parent: u64,
        old_name: &'a [u8],
        new_name: &'a [u8],
    },
    HardLink {
        target: u64,
        new_parent: u64,
        name: &'a [u8],
    },
    ReadDir {
        id: u64,
        cursor: u64,
        max_size: u32,
    },
    ReadPage {
        id: u64,
        offset: u64,
        len: u32,
    },
    /// Header leg only; the bytes travel in the next TX slot.
    WritePage {
        id: u64,
        offset: u64,
        len: u32,
    },
    ReadLink {
        id: u64,
    },
    StatFs {
        id: u64,
    },
    Fsync {
        id: u64,
        datasync: bool,
    },
}

impl Request<'_> {
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::GetAttr { .. } => Opcode::GetAttr,
            Request::SetAttr { .. } => Opcode::SetAttr,
            Request::Lookup { .. } => Opcode::Lookup,
            Request::Create { .. } => Opcode::Create,
            Request::Unlink { .. } => Opcode::Unlink,
            Request::Symlink { .. } => Opcode::Symlink,
            Request::Rename { .. } => Opcode::Rename,
            Request::HardLink { .. } => Opcode::HardLink,
            Request::ReadDir { .. } => Opcode::ReadDir,
            Request::ReadPage { .. } => Opcode::ReadPage,
            Request::WritePage { .. } => Opcode::WritePage,
            Request::ReadLink { .. } => Opcode::ReadLink,
            Request::StatFs { .. } => Opcode::StatFs,
            Request::Fsync { .. } => Opcode::Fsync,
        }
    }

    /// Encoded size in bytes, prefix included.
    pub fn encoded_len(&self) -> usize {
        PREFIX_SIZE
            + match self {
                Request::GetAttr { .. } | Request::ReadLink { .. } | Request::StatFs { .. } => 8,
                Request::SetAttr { .. } => 8 + ATTR_SNAPSHOT_SIZE,
                Request::Lookup { name, .. } => 8 + name.len(),
                Request::Create { name, .. } => 16 + name.len(),
                Request::Unlink { name, .. } => 12 + name.len(),
                Request::Symlink { name, target, .. } => 12 + name.len() + target.len(),
                Request::Rename {
                    old_name, new_name, ..
                } => 20 + old_name.len() + new_name.len(),
                Request::HardLink { name, .. } => 16 + name.len(),
                Request::ReadDir { .. } | Request::ReadPage { .. } | Request::WritePage { .. } => {
                    20
                }
                Request::Fsync { .. } => 12,
            }
    }

    /// Encode for `session`. Fails if the request would exceed one page.
    pub fn encode(&self, session: u16) -> Result<Vec<u8>> {
        let len = self.encoded_len();
        if len > PAGE_SIZE {
            return Err(FsError::NameTooLong(len));
        }

        let mut w = Writer::with_capacity(len);
        w.u16(session);
        w.u16(self.opcode() as u16);
        match *self {
            Request::GetAttr { id } | Request::ReadLink { id } | Request::StatFs { id } => {
                w.u64(id);
            }
            Request::SetAttr { id, attr } => {
                w.u64(id);
                w.u64(attr.size);
                w.u32(attr.mode);
                w.u32(attr.uid);
                w.u32(attr.gid);
                w.time(attr.atime);
                w.time(attr.mtime);
                w.time(attr.ctime);
            }
            Request::Lookup { parent, name } => {
                w.u64(parent);
                w.bytes(name);
            }
            Request::Create {
                parent,
                mode,
                rdev,
                name,
            } => {
                w.u64(parent);
                w.u32(mode);
                w.u32(rdev);
                w.bytes(name);
            }
            Request::Unlink {
                parent,
                is_dir,
                name,
            } => {
                w.u64(parent);
                w.u32(is_dir as u32);
                w.bytes(name);
            }
            Request::Symlink {
                parent,
                name,
                target,
            } => {
                w.u64(parent);
                w.u32(name.len() as u32);
                w.bytes(name);
                w.bytes(target);
            }
            Request::Rename {
                old_parent,
                new_parent,
                old_name,
                new_name,
            } => {
                w.u64(old_parent);
                w.u64(new_parent);
                w.u32(old_name.len() as u32);
                w.bytes(old_name);
                w.bytes(new_name);
            }
            Request::HardLink {
                target,
                new_parent,
                name,
            } => {
                w.u64(target);
                w.u64(new_parent);
                w.bytes(name);
            }
            Request::ReadDir {
                id,
                cursor,
                max_size,
            } => {
                w.u64(id);
                w.u64(cursor);
                w.u32(max_size);
            }
            Request::ReadPage { id, offset, len } | Request::WritePage { id, offset, len } => {
                w.u64(id);
                w.u64(offset);
                w.u32(len);
            }
            Request::Fsync { id, datasync } => {
                w.u64(id);
                w.u32(datasync as u32);
            }
        }
        debug_assert_eq!(w.len(), len);
        Ok(w.finish())
    }
}

impl<'a> Request<'a> {
    /// Decode a request header leg. Returns the session id alongside.
    pub fn decode(buf: &'a [u8]) -> Result<(u16, Request<'a>)> {
        let mut r = Reader::new(buf);
        let session = r.u16()?;
        let opcode = Opcode::try_from(r.u16()?)?;
        let request = match opcode {
            Opcode::GetAttr => Request::GetAttr { id: r.u64()? },
            Opcode::ReadLink => Request::ReadLink { id: r.u64()? },
            Opcode::StatFs => Request::StatFs { id: r.u64()? },
            Opcode::SetAttr => Request::SetAttr {
                id: r.u64()?,
                attr: AttrSnapshot {
                    size: r.u64()?,
                    mode: r.u32()?,
                    uid: r.u32()?,
                    gid: r.u32()?,
                    atime: r.time()?,
                    mtime: r.time()?,
                    ctime: r.time()?,
                },
            },
            Opcode::Lookup => Request::Lookup {
                parent: r.u64()?,
                name: r.rest(),
            },
            Opcode::Create => Request::Create {
                parent: r.u64()?,
                mode: r.u32()?,
                rdev: r.u32()?,
                name: r.rest(),
            },
            Opcode::Unlink => Request::Unlink {
                parent: r.u64()?,
                is_dir: r.u32()? != 0,
                name: r.rest(),
            },
            Opcode::Symlink => {
                let parent = r.u64()?;
                let name_len = r.u32()? as usize;
                let name = r.bytes(name_len)?;
                Request::Symlink {
                    parent,
                    name,
                    target: r.rest(),
                }
            }
            Opcode::Rename => {
                let old_parent = r.u64()?;
                let new_parent = r.u64()?;
                let old_len = r.u32()? as usize;
                let old_name = r.bytes(old_len)?;
                Request::Rename {
                    old_parent,
                    new_parent,
                    old_name,
                    new_name: r.rest(),
                }
            }
            Opcode::HardLink => Request::HardLink {
                target: r.u64()?,
                new_parent: r.u64()?,
                name: r.rest(),
            },
            Opcode::ReadDir => Request::ReadDir {
                id: r.u64()?,
                cursor: r.u64()?,
                max_size: r.u32()?,
            },
            Opcode::ReadPage => Request::ReadPage {
                id: r.u64()?,
                offset: r.u64()?,
                len: r.u32()?,
            },
            Opcode::WritePage => Request::WritePage {
                id: r.u64()?,
                offset: r.u64()?,
                len: r.u32()?,
            },
            Opcode::Fsync => Request::Fsync {
                id: r.u64()?,
                datasync: r.u32()? != 0,
            },
        };
        Ok((session, request))
    }
}

// === Responses ===

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub id: u64,
    /// Cursor that resumes enumeration after this entry.
    pub offset: u64,
    /// `d_type` tag, see [`crate::FileType::dirent_type`].
    pub kind: u8,
    pub name: Vec<u8>,
}

impl DirEntry {
    /// Bytes this entry occupies on the wire.
    #[inline]
    pub fn record_len(&self) -> usize {
        DIRENT_HEADER_SIZE + self.name.len()
    }
}

/// Decoded ReadDir response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadDirReply {
    pub cursor: u64,
    pub entries: Vec<DirEntry>,
}

/// Free-space report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatFs {
    pub block_size: u32,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_avail: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_max: u32,
}

fn check_status(r: &mut Reader<'_>) -> Result<()> {
    match r.i32()? {
        0 => Ok(()),
        status => Err(FsError::Remote(status)),
    }
}

/// Decode a bare status response.
pub fn decode_status(buf: &[u8]) -> Result<()> {
    check_status(&mut Reader::new(buf))
}

/// Decode an entry-bearing response.
///
/// A failure status may arrive without the attribute record.
pub fn decode_entry(buf: &[u8]) -> Result<RemoteInode> {
    let mut r = Reader::new(buf);
    check_status(&mut r)?;
    Ok(RemoteInode {
        id: r.u64()?,
        size: r.u64()?,
        mode: r.u32()?,
        nlink: r.u32()?,
        uid: r.u32()?,
        gid: r.u32()?,
        rdev: r.u32()?,
        atime: r.time()?,
        mtime: r.time()?,
        ctime: r.time()?,
        blksize: r.u32()?,
        blocks: r.u64()?,
    })
}

/// Decode a ReadDir response of `buf.len()` delivered bytes.
///
/// Stops at the first entry that does not fit entirely within the delivered
/// bytes, or whose record length is smaller than the entry header.
pub fn decode_readdir(buf: &[u8]) -> Result<ReadDirReply> {
    let mut r = Reader::new(buf);
    check_status(&mut r)?;
    let cursor = r.u64()?;

    let mut entries = Vec::new();
    while r.remaining() >= DIRENT_HEADER_SIZE {
        let record = r.peek(DIRENT_HEADER_SIZE);
        let record_len = u16::from_le_bytes([record[17], record[18]]) as usize;
        if record_len < DIRENT_HEADER_SIZE || record_len > r.remaining() {
            break;
        }
        let id = r.u64()?;
        let offset = r.u64()?;
        let kind = r.u8()?;
        let _ = r.u16()?;
        let name = r.bytes(record_len - DIRENT_HEADER_SIZE)?.to_vec();
        entries.push(DirEntry {
            id,
            offset,
            kind,
            name,
        });
    }
    Ok(ReadDirReply { cursor, entries })
}

/// Decode a ReadLink response: status followed by the raw target text.
///
/// The text runs to the end of the delivered bytes or to the first NUL.
pub fn decode_readlink(buf: &[u8]) -> Result<Vec<u8>> {
    let mut r = Reader::new(buf);
    check_status(&mut r)?;
    let text = r.rest();
    let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
    Ok(text[..end].to_vec())
}

/// Decode a WritePage status leg, returning the acknowledged byte count.
pub fn decode_write(buf: &[u8]) -> Result<u32> {
    let mut r = Reader::new(buf);
    check_status(&mut r)?;
    r.u32()
}

pub fn decode_statfs(buf: &[u8]) -> Result<StatFs> {
    let mut r = Reader::new(buf);
    check_status(&mut r)?;
    Ok(StatFs {
        block_size: r.u32()?,
        blocks: r.u64()?,
        blocks_free: r.u64()?,
        blocks_avail: r.u64()?,
        files: r.u64()?,
        files_free: r.u64()?,
        name_max: r.u32()?,
    })
}

pub fn encode_status(status: i32) -> Vec<u8> {
    status.to_le_bytes().to_vec()
}

pub fn encode_entry(inode: &RemoteInode) -> Vec<u8> {
    let mut w = Writer::with_capacity(ENTRY_RESPONSE_SIZE);
    w.i32(0);
    w.u64(inode.id);
    w.u64(inode.size);
    w.u32(inode.mode);
    w.u32(inode.nlink);
    w.u32(inode.uid);
    w.u32(inode.gid);
    w.u32(inode.rdev);
    w.time(inode.atime);
    w.time(inode.mtime);
    w.time(inode.ctime);
    w.u32(inode.blksize);
    w.u64(inode.blocks);
    debug_assert_eq!(w.len(), ENTRY_RESPONSE_SIZE);
    w.finish()
}

/// Start a successful ReadDir response carrying `cursor`.
pub fn begin_readdir(cursor: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(PAGE_SIZE);
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&cursor.to_le_bytes());
    buf
}

/// Overwrite the cursor of a response started by [`begin_readdir`].
pub fn set_readdir_cursor(buf: &mut [u8], cursor: u64) {
    buf[STATUS_SIZE..READDIR_HEADER_SIZE].copy_from_slice(&cursor.to_le_bytes());
}

/// Append one directory entry.
pub fn push_dirent(buf: &mut Vec<u8>, entry: &DirEntry) {
    buf.extend_from_slice(&entry.id.to_le_bytes());
    buf.extend_from_slice(&entry.offset.to_le_bytes());
    buf.push(entry.kind);
    buf.extend_from_slice(&(entry.record_len() as u16).to_le_bytes());
    buf.extend_from_slice(&entry.name);
}

pub fn encode_readlink(target: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(STATUS_SIZE + target.len());
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(target);
    buf
}

pub fn encode_write(written: u32) -> Vec<u8> {
    let mut w = Writer::with_capacity(WRITE_RESPONSE_SIZE);
    w.i32(0);
    w.u32(written);
    w.finish()
}

pub fn encode_statfs(st: &StatFs) -> Vec<u8> {
    let mut w = Writer::with_capacity(STATFS_RESPONSE_SIZE);
    w.i32(0);
    w.u32(st.block_size);
    w.u64(st.blocks);
    w.u64(st.blocks_free);
    w.u64(st.blocks_avail);
    w.u64(st.files);
    w.u64(st.files_free);
    w.u32(st.name_max);
    debug_assert_eq!(w.len(), STATFS_RESPONSE_SIZE);
    w.finish()
}

// === Byte cursor helpers ===

struct Writer(Vec<u8>);

impl Writer {
    fn with_capacity(n: usize) -> Self {
        Self(Vec::with_capacity(n))
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn u16(&mut self, v: u16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn time(&mut self, t: Timespec) {
        self.u32(t.sec);
        self.u32(t.nsec);
    }

    fn bytes(&mut self, b: &[u8]) {
        self.0.extend_from_slice(b);
    }

    fn finish(self) -> Vec<u8> {
        self.0
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(FsError::Short {
                len: self.buf.len(),
                need: self.pos + n,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Look at the next `n` bytes without consuming them. `n` must not exceed
    /// `remaining()`.
    fn peek(&self, n: usize) -> &'a [u8] {
        &self.buf[self.pos..self.pos + n]
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn time(&mut self) -> Result<Timespec> {
        Ok(Timespec {
            sec: self.u32()?,
            nsec: self.u32()?,
        })
    }
}
