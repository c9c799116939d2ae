//! Remote inode records and the client-side table that caches them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// File type bits of a wire mode.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

/// Wire timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timespec {
    pub sec: u32,
    pub nsec: u32,
}

impl Timespec {
    pub const fn new(sec: u32, nsec: u32) -> Self {
        Self { sec, nsec }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
    Unknown,
}

impl FileType {
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => FileType::Regular,
            S_IFDIR => FileType::Directory,
            S_IFLNK => FileType::Symlink,
            S_IFCHR => FileType::CharDevice,
            S_IFBLK => FileType::BlockDevice,
            S_IFIFO => FileType::Fifo,
            S_IFSOCK => FileType::Socket,
            _ => FileType::Unknown,
        }
    }

    /// `d_type` tag used in directory entries.
    pub fn dirent_type(self) -> u8 {
        match self {
            FileType::Unknown => 0,
            FileType::Fifo => 1,
            FileType::CharDevice => 2,
            FileType::Directory => 4,
            FileType::BlockDevice => 6,
            FileType::Regular => 8,
            FileType::Symlink => 10,
            FileType::Socket => 12,
        }
    }

    pub fn from_dirent_type(tag: u8) -> Self {
        match tag {
            1 => FileType::Fifo,
            2 => FileType::CharDevice,
            4 => FileType::Directory,
            6 => FileType::BlockDevice,
            8 => FileType::Regular,
            10 => FileType::Symlink,
            12 => FileType::Socket,
            _ => FileType::Unknown,
        }
    }
}

/// Attributes of a remote inode as carried by entry-bearing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoteInode {
    pub id: u64,
    pub size: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
    pub blksize: u32,
    pub blocks: u64,
}

impl RemoteInode {
    #[inline]
    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }

    /// Permission bits without the type.
    #[inline]
    pub fn permissions(&self) -> u32 {
        self.mode & !S_IFMT
    }
}

/// Local records of every inode a response has mentioned.
///
/// Records are created on first sight and overwritten by every later
/// response that carries attributes. Nothing here evicts them; only the host
/// may [`InodeTable::forget`] one.
#[derive(Debug, Default)]
pub struct InodeTable {
    map: Mutex<HashMap<u64, RemoteInode>>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, RemoteInode>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the record for `inode.id`.
    pub fn refresh(&self, inode: RemoteInode) -> RemoteInode {
        self.lock().insert(inode.id, inode);
        inode
    }

    pub fn get(&self, id: u64) -> Option<RemoteInode> {
        self.lock().get(&id).copied()
    }

    /// Raise the cached size to `end` if it is currently smaller.
    ///
    /// Returns the resulting size, or `None` if the inode is not cached.
    pub fn grow_size(&self, id: u64, end: u64) -> Option<u64> {
        let mut map = self.lock();
        let inode = map.get_mut(&id)?;
        if end > inode.size {
            inode.size = end;
        }
        Some(inode.size)
    }

    pub fn forget(&self, id: u64) -> Option<RemoteInode> {
        self.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
