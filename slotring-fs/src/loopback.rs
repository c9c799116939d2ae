//! In-memory file server speaking the wire protocol through a [`Peer`].
//!
//! Stands in for the remote peer in tests and benchmarks. It serves one
//! request at a time in ring order, which is all the client relies on.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::trace;
use slotring::{Backoff, PAGE_SIZE, Peer};

use crate::ROOT_ID;
use crate::inode::{FileType, RemoteInode, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG, Timespec};
use crate::message::{
    self, AttrSnapshot, DirEntry, NAME_MAX, Opcode, READDIR_HEADER_SIZE, Request, StatFs,
};

/// Negative errno, as sent in a response status.
type Errno = i32;

const MAX_FILE_SIZE: u64 = 1 << 32;
const TOTAL_BLOCKS: u64 = 1 << 18;
const TOTAL_FILES: u64 = 1 << 16;

/// Directory entries. Each insertion takes a fresh cookie; a ReadDir cursor
/// is the cookie of the last entry returned, so it stays valid while other
/// entries come and go.
#[derive(Debug, Default)]
struct Dir {
    cookies: BTreeMap<Vec<u8>, u64>,
    entries: BTreeMap<u64, (Vec<u8>, u64)>,
    last_cookie: u64,
}

impl Dir {
    fn get(&self, name: &[u8]) -> Option<u64> {
        let cookie = self.cookies.get(name)?;
        self.entries.get(cookie).map(|&(_, id)| id)
    }

    fn contains(&self, name: &[u8]) -> bool {
        self.cookies.contains_key(name)
    }

    fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    fn insert(&mut self, name: Vec<u8>, id: u64) {
        self.remove(&name);
        self.last_cookie += 1;
        self.cookies.insert(name.clone(), self.last_cookie);
        self.entries.insert(self.last_cookie, (name, id));
    }

    fn remove(&mut self, name: &[u8]) -> Option<u64> {
        let cookie = self.cookies.remove(name)?;
        self.entries.remove(&cookie).map(|(_, id)| id)
    }

    /// `(cookie, name, id)` for every entry inserted after `cursor`.
    fn after(&self, cursor: u64) -> impl Iterator<Item = (u64, &[u8], u64)> {
        self.entries
            .range((Bound::Excluded(cursor), Bound::Unbounded))
            .map(|(&cookie, (name, id))| (cookie, name.as_slice(), *id))
    }
}

#[derive(Debug)]
enum Body {
    File(Vec<u8>),
    Dir(Dir),
    Symlink(Vec<u8>),
    /// Device nodes, fifos and sockets: attributes only.
    Special,
}

#[derive(Debug)]
struct Node {
    attr: RemoteInode,
    body: Body,
}

impl Node {
    fn set_size(&mut self, size: u64) {
        self.attr.size = size;
        self.attr.blocks = size.div_ceil(512);
    }
}

/// The served tree. Inode ids are never reused.
#[derive(Debug)]
struct Tree {
    nodes: HashMap<u64, Node>,
    next_id: u64,
    clock: u32,
}

fn check_name(name: &[u8]) -> Result<(), Errno> {
    if name.is_empty() || name == b"." || name == b".." || name.contains(&b'/') {
        return Err(-libc::EINVAL);
    }
    if name.len() > NAME_MAX {
        return Err(-libc::ENAMETOOLONG);
    }
    Ok(())
}

impl Tree {
    fn new() -> Self {
        let mut tree = Self {
            nodes: HashMap::new(),
            next_id: ROOT_ID + 1,
            clock: 0,
        };
        let now = tree.tick();
        let attr = RemoteInode {
            id: ROOT_ID,
            mode: S_IFDIR | 0o755,
            nlink: 2,
            blksize: PAGE_SIZE as u32,
            atime: now,
            mtime: now,
            ctime: now,
            ..Default::default()
        };
        tree.nodes.insert(
            ROOT_ID,
            Node {
                attr,
                body: Body::Dir(Dir::default()),
            },
        );
        tree
    }

    fn tick(&mut self) -> Timespec {
        self.clock += 1;
        Timespec::new(self.clock, 0)
    }

    fn node(&self, id: u64) -> Result<&Node, Errno> {
        self.nodes.get(&id).ok_or(-libc::ENOENT)
    }

    fn node_mut(&mut self, id: u64) -> Result<&mut Node, Errno> {
        self.nodes.get_mut(&id).ok_or(-libc::ENOENT)
    }

    fn dir(&self, id: u64) -> Result<&Dir, Errno> {
        match &self.node(id)?.body {
            Body::Dir(entries) => Ok(entries),
            _ => Err(-libc::ENOTDIR),
        }
    }

    fn dir_mut(&mut self, id: u64) -> Result<&mut Dir, Errno> {
        match &mut self.node_mut(id)?.body {
            Body::Dir(entries) => Ok(entries),
            _ => Err(-libc::ENOTDIR),
        }
    }

    fn touch_dir(&mut self, id: u64, nlink_delta: i32) {
        let now = self.tick();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attr.mtime = now;
            node.attr.ctime = now;
            node.attr.nlink = node.attr.nlink.saturating_add_signed(nlink_delta);
        }
    }

    fn getattr(&self, id: u64) -> Result<RemoteInode, Errno> {
        Ok(self.node(id)?.attr)
    }

    fn lookup(&self, parent: u64, name: &[u8]) -> Result<RemoteInode, Errno> {
        let id = self.dir(parent)?.get(name).ok_or(-libc::ENOENT)?;
        self.getattr(id)
    }

    fn setattr(&mut self, id: u64, snap: &AttrSnapshot) -> Result<RemoteInode, Errno> {
        let node = self.node_mut(id)?;
        if snap.size != node.attr.size {
            match &mut node.body {
                Body::File(data) => {
                    if snap.size > MAX_FILE_SIZE {
                        return Err(-libc::EFBIG);
                    }
                    data.resize(snap.size as usize, 0);
                }
                Body::Dir(_) => return Err(-libc::EISDIR),
                _ => return Err(-libc::EINVAL),
            }
            node.set_size(snap.size);
        }
        node.attr.mode = (node.attr.mode & S_IFMT) | (snap.mode & !S_IFMT);
        node.attr.uid = snap.uid;
        node.attr.gid = snap.gid;
        node.attr.atime = snap.atime;
        node.attr.mtime = snap.mtime;
        node.attr.ctime = snap.ctime;
        Ok(node.attr)
    }

    fn insert(
        &mut self,
        parent: u64,
        name: &[u8],
        mode: u32,
        rdev: u32,
        body: Body,
    ) -> Result<RemoteInode, Errno> {
        check_name(name)?;
        if self.dir(parent)?.contains(name) {
            return Err(-libc::EEXIST);
        }

        let id = self.next_id;
        self.next_id += 1;
        let now = self.tick();
        let is_dir = matches!(body, Body::Dir(_));
        let mut node = Node {
            attr: RemoteInode {
                id,
                mode,
                nlink: if is_dir { 2 } else { 1 },
                rdev,
                blksize: PAGE_SIZE as u32,
                atime: now,
                mtime: now,
                ctime: now,
                ..Default::default()
            },
            body,
        };
        if let Body::Symlink(target) = &node.body {
            let len = target.len() as u64;
            node.set_size(len);
        }
        let attr = node.attr;
        self.nodes.insert(id, node);
        self.dir_mut(parent)?.insert(name.to_vec(), id);
        self.touch_dir(parent, if is_dir { 1 } else { 0 });
        Ok(attr)
    }

    fn create(
        &mut self,
        parent: u64,
        name: &[u8],
        mode: u32,
        rdev: u32,
    ) -> Result<RemoteInode, Errno> {
        let body = match FileType::from_mode(mode) {
            FileType::Regular => Body::File(Vec::new()),
            FileType::Directory => Body::Dir(Dir::default()),
            FileType::Symlink | FileType::Unknown => return Err(-libc::EINVAL),
            _ => Body::Special,
        };
        self.insert(parent, name, mode, rdev, body)
    }

    fn symlink(&mut self, parent: u64, name: &[u8], target: &[u8]) -> Result<RemoteInode, Errno> {
        if target.is_empty() {
            return Err(-libc::ENOENT);
        }
        self.insert(parent, name, S_IFLNK | 0o777, 0, Body::Symlink(target.to_vec()))
    }

    /// Drop one link to `id`, freeing the node when none remain.
    fn release(&mut self, id: u64) {
        let now = self.tick();
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let is_dir = matches!(node.body, Body::Dir(_));
        node.attr.nlink = node.attr.nlink.saturating_sub(1);
        node.attr.ctime = now;
        if is_dir || node.attr.nlink == 0 {
            self.nodes.remove(&id);
        }
    }

    /// Check that the entry `id` may be removed as a directory (`is_dir`) or
    /// as a non-directory.
    fn check_removable(&self, id: u64, is_dir: bool) -> Result<(), Errno> {
        match (&self.node(id)?.body, is_dir) {
            (Body::Dir(entries), true) if !entries.is_empty() => Err(-libc::ENOTEMPTY),
            (Body::Dir(_), true) => Ok(()),
            (Body::Dir(_), false) => Err(-libc::EISDIR),
            (_, true) => Err(-libc::ENOTDIR),
            (_, false) => Ok(()),
        }
    }

    fn unlink(&mut self, parent: u64, name: &[u8], is_dir: bool) -> Result<(), Errno> {
        let id = self.dir(parent)?.get(name).ok_or(-libc::ENOENT)?;
        self.check_removable(id, is_dir)?;
        self.dir_mut(parent)?.remove(name);
        self.touch_dir(parent, if is_dir { -1 } else { 0 });
        self.release(id);
        Ok(())
    }

    fn rename(
        &mut self,
        old_parent: u64,
        old_name: &[u8],
        new_parent: u64,
        new_name: &[u8],
    ) -> Result<(), Errno> {
        check_name(new_name)?;
        let id = self.dir(old_parent)?.get(old_name).ok_or(-libc::ENOENT)?;
        let moving_dir = matches!(self.node(id)?.body, Body::Dir(_));
        if moving_dir && id == new_parent {
            return Err(-libc::EINVAL);
        }

        if let Some(existing) = self.dir(new_parent)?.get(new_name) {
            if existing == id {
                return Ok(());
            }
            self.check_removable(existing, moving_dir)?;
            self.dir_mut(new_parent)?.remove(new_name);
            self.touch_dir(new_parent, if moving_dir { -1 } else { 0 });
            self.release(existing);
        }

        self.dir_mut(old_parent)?.remove(old_name);
        self.dir_mut(new_parent)?.insert(new_name.to_vec(), id);
        let delta = if moving_dir { 1 } else { 0 };
        self.touch_dir(old_parent, -delta);
        self.touch_dir(new_parent, delta);
        let now = self.tick();
        self.node_mut(id)?.attr.ctime = now;
        Ok(())
    }

    fn link(&mut self, target: u64, new_parent: u64, name: &[u8]) -> Result<RemoteInode, Errno> {
        check_name(name)?;
        if matches!(self.node(target)?.body, Body::Dir(_)) {
            return Err(-libc::EPERM);
        }
        if self.dir(new_parent)?.contains(name) {
            return Err(-libc::EEXIST);
        }
        self.dir_mut(new_parent)?.insert(name.to_vec(), target);
        self.touch_dir(new_parent, 0);
        let now = self.tick();
        let node = self.node_mut(target)?;
        node.attr.nlink += 1;
        node.attr.ctime = now;
        Ok(node.attr)
    }

    /// Entries after `cursor`, packed into at most `max_size` response bytes.
    fn readdir(&self, id: u64, cursor: u64, max_size: u32) -> Result<Vec<u8>, Errno> {
        let entries = self.dir(id)?;
        let limit = (max_size as usize).clamp(READDIR_HEADER_SIZE, PAGE_SIZE);
        let mut buf = message::begin_readdir(cursor);
        let mut next = cursor;
        for (cookie, name, child) in entries.after(cursor) {
            let kind = self
                .nodes
                .get(&child)
                .map(|n| n.attr.file_type())
                .unwrap_or(FileType::Unknown);
            let entry = DirEntry {
                id: child,
                offset: cookie,
                kind: kind.dirent_type(),
                name: name.to_vec(),
            };
            if buf.len() + entry.record_len() > limit {
                break;
            }
            message::push_dirent(&mut buf, &entry);
            next = entry.offset;
        }
        message::set_readdir_cursor(&mut buf, next);
        Ok(buf)
    }

    fn read(&self, id: u64, offset: u64, len: u32) -> Result<Vec<u8>, Errno> {
        match &self.node(id)?.body {
            Body::File(data) => {
                let start = (offset.min(data.len() as u64)) as usize;
                let end = (start + len as usize).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Body::Dir(_) => Err(-libc::EISDIR),
            _ => Err(-libc::EINVAL),
        }
    }

    fn write(&mut self, id: u64, offset: u64, bytes: &[u8]) -> Result<u32, Errno> {
        let end = offset
            .checked_add(bytes.len() as u64)
            .filter(|&end| end <= MAX_FILE_SIZE)
            .ok_or(-libc::EFBIG)?;
        let now = self.tick();
        let node = self.node_mut(id)?;
        let data = match &mut node.body {
            Body::File(data) => data,
            Body::Dir(_) => return Err(-libc::EISDIR),
            _ => return Err(-libc::EINVAL),
        };
        if end as usize > data.len() {
            data.resize(end as usize, 0);
        }
        data[offset as usize..end as usize].copy_from_slice(bytes);
        let size = data.len() as u64;
        node.set_size(size);
        node.attr.mtime = now;
        node.attr.ctime = now;
        Ok(bytes.len() as u32)
    }

    fn readlink(&self, id: u64) -> Result<&[u8], Errno> {
        match &self.node(id)?.body {
            Body::Symlink(target) => Ok(target.as_slice()),
            _ => Err(-libc::EINVAL),
        }
    }

    fn statfs(&self, id: u64) -> Result<StatFs, Errno> {
        self.node(id)?;
        let used: u64 = self
            .nodes
            .values()
            .map(|n| n.attr.size.div_ceil(PAGE_SIZE as u64))
            .sum();
        let free = TOTAL_BLOCKS.saturating_sub(used);
        Ok(StatFs {
            block_size: PAGE_SIZE as u32,
            blocks: TOTAL_BLOCKS,
            blocks_free: free,
            blocks_avail: free,
            files: TOTAL_FILES,
            files_free: TOTAL_FILES.saturating_sub(self.nodes.len() as u64),
            name_max: NAME_MAX as u32,
        })
    }

    /// Answer every single-leg request.
    fn answer(&mut self, request: Request<'_>) -> Vec<u8> {
        let entry = |r: Result<RemoteInode, Errno>| match r {
            Ok(inode) => message::encode_entry(&inode),
            Err(status) => message::encode_status(status),
        };
        let status = |r: Result<(), Errno>| message::encode_status(r.err().unwrap_or(0));

        match request {
            Request::GetAttr { id } => entry(self.getattr(id)),
            Request::SetAttr { id, attr } => entry(self.setattr(id, &attr)),
            Request::Lookup { parent, name } => entry(self.lookup(parent, name)),
            Request::Create {
                parent,
                mode,
                rdev,
                name,
            } => entry(self.create(parent, name, mode, rdev)),
            Request::Unlink {
                parent,
                is_dir,
                name,
            } => status(self.unlink(parent, name, is_dir)),
            Request::Symlink {
                parent,
                name,
                target,
            } => entry(self.symlink(parent, name, target)),
            Request::Rename {
                old_parent,
                new_parent,
                old_name,
                new_name,
            } => status(self.rename(old_parent, old_name, new_parent, new_name)),
            Request::HardLink {
                target,
                new_parent,
                name,
            } => entry(self.link(target, new_parent, name)),
            Request::ReadDir {
                id,
                cursor,
                max_size,
            } => self
                .readdir(id, cursor, max_size)
                .unwrap_or_else(message::encode_status),
            Request::ReadLink { id } => match self.readlink(id) {
                Ok(target) => message::encode_readlink(target),
                Err(status) => message::encode_status(status),
            },
            Request::StatFs { id } => match self.statfs(id) {
                Ok(st) => message::encode_statfs(&st),
                Err(status) => message::encode_status(status),
            },
            Request::Fsync { id, .. } => status(self.node(id).map(|_| ())),
            // Multi-leg requests never reach here.
            Request::ReadPage { .. } | Request::WritePage { .. } => {
                message::encode_status(-libc::EINVAL)
            }
        }
    }
}

/// A [`Peer`] plus the tree it serves.
pub struct LoopbackServer {
    peer: Peer,
    tree: Tree,
}

impl LoopbackServer {
    /// Serve an empty tree (just the root directory) through `peer`.
    pub fn new(peer: Peer) -> Self {
        Self {
            peer,
            tree: Tree::new(),
        }
    }

    /// Place a regular file directly in the tree, bypassing the rings.
    pub fn seed_file(&mut self, parent: u64, name: &[u8], contents: &[u8]) -> Result<u64, Errno> {
        let inode = self.tree.create(parent, name, S_IFREG | 0o644, 0)?;
        if !contents.is_empty() {
            self.tree.write(inode.id, 0, contents)?;
        }
        Ok(inode.id)
    }

    /// Number of live inodes, root included.
    pub fn inode_count(&self) -> usize {
        self.tree.nodes.len()
    }

    /// Serve the next request if one is posted. Returns whether one was.
    pub fn serve_one(&mut self) -> bool {
        let Some(bytes) = self.peer.try_take() else {
            return false;
        };
        self.handle(&bytes);
        true
    }

    fn handle(&mut self, bytes: &[u8]) {
        let (session, request) = match Request::decode(bytes) {
            Ok(decoded) => decoded,
            Err(_) => {
                self.reject(bytes);
                return;
            }
        };
        trace!("loopback session={} {:?}", session, request.opcode());

        match request {
            Request::ReadPage { id, offset, len } => {
                // Data leg first; the client waits on both.
                match self.tree.read(id, offset, len) {
                    Ok(data) => {
                        self.peer.fill(1, &data);
                        self.peer.fill(0, &message::encode_status(0));
                    }
                    Err(status) => {
                        self.peer.fill(1, &[]);
                        self.peer.fill(0, &message::encode_status(status));
                    }
                }
                self.peer.advance(2);
            }
            Request::WritePage { id, offset, len } => {
                let data = self.peer.take();
                let n = (len as usize).min(data.len());
                let reply = match self.tree.write(id, offset, &data[..n]) {
                    Ok(written) => message::encode_write(written),
                    Err(status) => message::encode_status(status),
                };
                self.peer.respond(&reply);
            }
            other => {
                let reply = self.tree.answer(other);
                self.peer.respond(&reply);
            }
        }
    }

    /// Fail a request whose header did not decode.
    ///
    /// Every leg the opcode implies is still consumed and answered, so the
    /// ring cursors stay in step with the client. An unreadable opcode is
    /// treated as a single-leg call.
    fn reject(&mut self, bytes: &[u8]) {
        let (tx_legs, rx_legs) = bytes
            .get(2..4)
            .and_then(|raw| Opcode::try_from(u16::from_le_bytes([raw[0], raw[1]])).ok())
            .map_or((1, 1), |op| (op.tx_legs(), op.rx_legs()));
        for _ in 1..tx_legs {
            self.peer.take();
        }
        for leg in 1..rx_legs {
            self.peer.fill(leg as u64, &[]);
        }
        self.peer.fill(0, &message::encode_status(-libc::EINVAL));
        self.peer.advance(rx_legs as u64);
    }

    /// Serve until `stop` is set.
    pub fn run(&mut self, stop: &AtomicBool) {
        let mut backoff = Backoff::new();
        while !stop.load(Ordering::Relaxed) {
            if self.serve_one() {
                backoff.reset();
            } else {
                backoff.snooze();
            }
        }
    }

    /// Serve on a new thread until the handle is shut down.
    pub fn spawn(mut self) -> LoopbackHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let thread = thread::spawn(move || {
            self.run(&stop_clone);
            self
        });
        LoopbackHandle {
            stop,
            thread: Some(thread),
        }
    }
}

/// Running [`LoopbackServer`] thread.
pub struct LoopbackHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<LoopbackServer>>,
}

impl LoopbackHandle {
    /// Stop serving and hand the server back.
    ///
    /// Returns `None` if the server thread panicked.
    pub fn shutdown(mut self) -> Option<LoopbackServer> {
        self.stop.store(true, Ordering::Relaxed);
        self.thread.take()?.join().ok()
    }
}

impl Drop for LoopbackHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readdir_respects_max_size() {
        let mut tree = Tree::new();
        for i in 0..10 {
            tree.create(ROOT_ID, format!("entry{i}").as_bytes(), S_IFREG | 0o644, 0)
                .unwrap();
        }
        // Room for the header and exactly two 25-byte records.
        let max = READDIR_HEADER_SIZE + 2 * 25;
        let page = tree.readdir(ROOT_ID, 0, max as u32).unwrap();
        let reply = message::decode_readdir(&page).unwrap();
        assert_eq!(reply.entries.len(), 2);
        assert_eq!(reply.cursor, 2);

        let rest = message::decode_readdir(&tree.readdir(ROOT_ID, 2, 4096).unwrap()).unwrap();
        assert_eq!(rest.entries.len(), 8);
        assert_eq!(rest.cursor, 10);
    }

    #[test]
    fn test_readdir_cursor_survives_mutation() {
        let mut tree = Tree::new();
        for i in 0..6 {
            tree.create(ROOT_ID, format!("entry{i}").as_bytes(), S_IFREG | 0o644, 0)
                .unwrap();
        }
        let max = READDIR_HEADER_SIZE + 2 * 25;
        let page = tree.readdir(ROOT_ID, 0, max as u32).unwrap();
        let first = message::decode_readdir(&page).unwrap();
        assert_eq!(first.entries.len(), 2);

        // Removing an already returned entry and adding a new one must not
        // shift the rest of the listing.
        tree.unlink(ROOT_ID, b"entry0", false).unwrap();
        tree.create(ROOT_ID, b"late", S_IFREG | 0o644, 0).unwrap();

        let page = tree.readdir(ROOT_ID, first.cursor, 4096).unwrap();
        let rest = message::decode_readdir(&page).unwrap();
        let names: Vec<&[u8]> = rest.entries.iter().map(|e| e.name.as_slice()).collect();
        let expected: Vec<&[u8]> = vec![b"entry2", b"entry3", b"entry4", b"entry5", b"late"];
        assert_eq!(names, expected);
    }

    #[test]
    fn test_unlink_keeps_linked_node() {
        let mut tree = Tree::new();
        let file = tree.create(ROOT_ID, b"a", S_IFREG | 0o644, 0).unwrap();
        let linked = tree.link(file.id, ROOT_ID, b"b").unwrap();
        assert_eq!(linked.nlink, 2);
        tree.unlink(ROOT_ID, b"a", false).unwrap();
        assert_eq!(tree.getattr(file.id).unwrap().nlink, 1);
        tree.unlink(ROOT_ID, b"b", false).unwrap();
        assert_eq!(tree.getattr(file.id), Err(-libc::ENOENT));
    }

    #[test]
    fn test_remove_errors() {
        let mut tree = Tree::new();
        let dir = tree.create(ROOT_ID, b"d", S_IFDIR | 0o755, 0).unwrap();
        tree.create(dir.id, b"f", S_IFREG | 0o644, 0).unwrap();
        assert_eq!(tree.unlink(ROOT_ID, b"d", true), Err(-libc::ENOTEMPTY));
        assert_eq!(tree.unlink(ROOT_ID, b"d", false), Err(-libc::EISDIR));
        assert_eq!(tree.unlink(dir.id, b"f", true), Err(-libc::ENOTDIR));
        assert_eq!(tree.unlink(ROOT_ID, b"missing", false), Err(-libc::ENOENT));
    }

    #[test]
    fn test_rename_replaces_file() {
        let mut tree = Tree::new();
        let a = tree.create(ROOT_ID, b"a", S_IFREG | 0o644, 0).unwrap();
        let b = tree.create(ROOT_ID, b"b", S_IFREG | 0o644, 0).unwrap();
        tree.rename(ROOT_ID, b"a", ROOT_ID, b"b").unwrap();
        assert_eq!(tree.lookup(ROOT_ID, b"b").unwrap().id, a.id);
        assert_eq!(tree.lookup(ROOT_ID, b"a"), Err(-libc::ENOENT));
        assert_eq!(tree.getattr(b.id), Err(-libc::ENOENT));
    }

    #[test]
    fn test_write_past_end_zero_fills_gap() {
        let mut tree = Tree::new();
        let f = tree.create(ROOT_ID, b"f", S_IFREG | 0o644, 0).unwrap();
        assert_eq!(tree.write(f.id, 10, b"xy").unwrap(), 2);
        assert_eq!(tree.getattr(f.id).unwrap().size, 12);
        let data = tree.read(f.id, 0, 4096).unwrap();
        assert_eq!(&data[..10], &[0u8; 10]);
        assert_eq!(&data[10..], b"xy");
        assert!(tree.read(f.id, 100, 10).unwrap().is_empty());
    }
}
