#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use ext2fs_async::*;

pub const BLOCK_SIZE: u64 = 1024;
pub const IMAGE_BLOCKS: u64 = 256;
pub const FIRST_DATA_BLOCK: u64 = 8;
const SUPERBLOCK_OFFSET: u64 = 1024;
const MAGIC_OFFSET: usize = 56;
const EXT2_MAGIC: u16 = 0xEF53;
/// 种子文件的时间戳，足够旧，便于检查写入后时间是否更新
pub const SEED_TIME: u64 = 1_600_000_000;

const ROOT_INO: u32 = 2;
const LOST_FOUND_INO: u32 = 11;
const O_ACCMODE: u32 = 3;

pub const SEED: [(&str, &[u8]); 5] = [
    ("1", b"one\n"),
    ("2", b"two\n"),
    ("3", b"three\n"),
    ("4", b"four\n"),
    ("5", b"five\n"),
];

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 构造测试镜像：超级块魔数 + 种子文件内容
pub fn image() -> Vec<u8> {
    let mut data = vec![0u8; (IMAGE_BLOCKS * BLOCK_SIZE) as usize];
    let magic = SUPERBLOCK_OFFSET as usize + MAGIC_OFFSET;
    data[magic..magic + 2].copy_from_slice(&EXT2_MAGIC.to_le_bytes());
    for (i, (_, content)) in SEED.iter().enumerate() {
        let start = ((FIRST_DATA_BLOCK + i as u64) * BLOCK_SIZE) as usize;
        data[start..start + content.len()].copy_from_slice(content);
    }
    data
}

/// 镜像嵌在容器的 `offset` 处，前面填充无关数据
pub fn image_at(offset: usize) -> Vec<u8> {
    let mut data = vec![0xee; offset];
    data.extend_from_slice(&image());
    data
}

/// 引擎移交给引擎线程后，测试通过它观察引擎状态
#[derive(Clone, Default)]
pub struct Probe {
    live: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    fail_stat: Arc<AtomicBool>,
    panic_on_mount: Arc<AtomicBool>,
    inflate_writes: Arc<AtomicBool>,
}

impl Probe {
    /// 引擎堆上尚未释放的分配数量
    pub fn live_allocations(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// 进入引擎（堆操作除外）的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 让之后的属性读取以 EIO 失败
    pub fn fail_stat(&self, on: bool) {
        self.fail_stat.store(on, Ordering::SeqCst);
    }

    /// 让之后的挂载在引擎内部 panic
    pub fn panic_on_mount(&self, on: bool) {
        self.panic_on_mount.store(on, Ordering::SeqCst);
    }

    /// 让写入报告比实际多出若干字节
    pub fn inflate_writes(&self, on: bool) {
        self.inflate_writes.store(on, Ordering::SeqCst);
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Clone, Debug)]
struct Node {
    mode: u32,
    uid: u32,
    gid: u32,
    nlink: u64,
    atime: u64,
    mtime: u64,
    ctime: u64,
    size: u64,
    blocks: Vec<u64>,
    entries: BTreeMap<Vec<u8>, u32>,
    target: Vec<u8>,
}

impl Node {
    fn new(mode: u32, time: u64) -> Self {
        Self {
            mode,
            uid: 0,
            gid: 0,
            nlink: if mode & S_IFMT == S_IFDIR { 2 } else { 1 },
            atime: time,
            mtime: time,
            ctime: time,
            size: 0,
            blocks: Vec::new(),
            entries: BTreeMap::new(),
            target: Vec::new(),
        }
    }

    fn kind(&self) -> u32 {
        self.mode & S_IFMT
    }

    fn is_dir(&self) -> bool {
        self.kind() == S_IFDIR
    }

    fn is_symlink(&self) -> bool {
        self.kind() == S_IFLNK
    }
}

struct Volume {
    io: Box<dyn BlockIo>,
    nodes: HashMap<u32, Node>,
    next_ino: u32,
    next_block: u64,
    free_blocks: Vec<u64>,
    /// 挂载以来释放、尚未 trim 的块
    freed: BTreeSet<u64>,
}

#[derive(Clone, Copy)]
struct OpenNode {
    fs: u64,
    ino: u32,
    pos: u64,
    flags: u32,
}

fn split_parent(path: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let trimmed = match path.iter().rposition(|&b| b != b'/') {
        Some(end) => &path[..=end],
        None => &path[..0],
    };
    match trimmed.iter().rposition(|&b| b == b'/') {
        Some(slash) => (trimmed[..slash.max(1)].to_vec(), trimmed[slash + 1..].to_vec()),
        None => (b"/".to_vec(), trimmed.to_vec()),
    }
}

impl Volume {
    fn node(&self, ino: u32) -> Result<&Node, i32> {
        self.nodes.get(&ino).ok_or(-EIO)
    }

    fn node_mut(&mut self, ino: u32) -> Result<&mut Node, i32> {
        self.nodes.get_mut(&ino).ok_or(-EIO)
    }

    fn resolve(&self, path: &[u8], follow_last: bool, depth: u32) -> Result<u32, i32> {
        if depth > 8 {
            return Err(-ELOOP);
        }
        let comps: Vec<&[u8]> = path
            .split(|&b| b == b'/')
            .filter(|c| !c.is_empty() && *c != b".")
            .collect();
        let mut cur = ROOT_INO;
        for (i, comp) in comps.iter().enumerate() {
            let dir = self.node(cur)?;
            if !dir.is_dir() {
                return Err(-ENOTDIR);
            }
            let child = *dir.entries.get(*comp).ok_or(-ENOENT)?;
            let last = i + 1 == comps.len();
            let node = self.node(child)?;
            if node.is_symlink() && (!last || follow_last) {
                let target = if node.target.starts_with(b"/") {
                    node.target.clone()
                } else {
                    let mut base = b"/".to_vec();
                    base.extend_from_slice(&comps[..i].join(&b'/'));
                    base.push(b'/');
                    base.extend_from_slice(&node.target);
                    base
                };
                cur = self.resolve(&target, true, depth + 1)?;
            } else {
                cur = child;
            }
        }
        Ok(cur)
    }

    fn parent_of(&self, path: &[u8]) -> Result<(u32, Vec<u8>), i32> {
        let (parent, name) = split_parent(path);
        let dir = self.resolve(&parent, true, 0)?;
        if !self.node(dir)?.is_dir() {
            return Err(-ENOTDIR);
        }
        if name.len() > 255 {
            return Err(-ENAMETOOLONG);
        }
        Ok((dir, name))
    }

    fn create(&mut self, path: &[u8], mode: u32) -> Result<u32, i32> {
        let (parent, name) = self.parent_of(path)?;
        if name.is_empty() || self.node(parent)?.entries.contains_key(&name) {
            return Err(-EEXIST);
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        let time = now();
        let node = Node::new(mode, time);
        let is_dir = node.is_dir();
        self.nodes.insert(ino, node);
        let dir = self.node_mut(parent)?;
        dir.entries.insert(name, ino);
        dir.mtime = time;
        dir.ctime = time;
        if is_dir {
            dir.nlink += 1;
        }
        Ok(ino)
    }

    fn block_io(&mut self, block: u64, buf: &mut [u8], write: bool) -> Result<(), i32> {
        let offset = block * BLOCK_SIZE;
        let req = if write {
            BlockRequest::write(offset, buf)
        } else {
            BlockRequest::read(offset, buf)
        };
        match self.io.request(req) {
            rc if rc < 0 => Err(rc as i32),
            rc if (rc as u64) < BLOCK_SIZE => Err(-EIO),
            _ => Ok(()),
        }
    }

    fn alloc_block(&mut self) -> Result<u64, i32> {
        let block = match self.free_blocks.pop() {
            Some(block) => {
                self.freed.remove(&block);
                block
            }
            None if self.next_block < IMAGE_BLOCKS => {
                self.next_block += 1;
                self.next_block - 1
            }
            None => return Err(-ENOSPC),
        };
        let rc = self.io.request(BlockRequest::control(
            BlockOp::Zeroout,
            block * BLOCK_SIZE,
            BLOCK_SIZE,
        ));
        if rc < 0 {
            return Err(rc as i32);
        }
        Ok(block)
    }

    fn release(&mut self, ino: u32) -> Result<(), i32> {
        let blocks = std::mem::take(&mut self.node_mut(ino)?.blocks);
        for block in blocks {
            self.free_blocks.push(block);
            self.freed.insert(block);
        }
        Ok(())
    }

    fn truncate(&mut self, ino: u32) -> Result<(), i32> {
        self.release(ino)?;
        let node = self.node_mut(ino)?;
        node.size = 0;
        node.mtime = now();
        node.ctime = node.mtime;
        Ok(())
    }

    fn read_data(&mut self, ino: u32, pos: u64, len: usize) -> Result<Vec<u8>, i32> {
        let node = self.node(ino)?;
        if node.is_dir() {
            return Err(-EISDIR);
        }
        let (size, blocks) = (node.size, node.blocks.clone());
        if pos >= size {
            return Ok(Vec::new());
        }
        let end = (pos + len as u64).min(size);
        let mut out = Vec::with_capacity((end - pos) as usize);
        let mut block = vec![0u8; BLOCK_SIZE as usize];
        let mut at = pos;
        while at < end {
            let index = (at / BLOCK_SIZE) as usize;
            let within = (at % BLOCK_SIZE) as usize;
            let n = (BLOCK_SIZE - within as u64).min(end - at) as usize;
            self.block_io(blocks[index], &mut block, false)?;
            out.extend_from_slice(&block[within..within + n]);
            at += n as u64;
        }
        self.node_mut(ino)?.atime = now();
        Ok(out)
    }

    fn write_data(&mut self, ino: u32, pos: u64, data: &[u8]) -> Result<usize, i32> {
        if self.node(ino)?.is_dir() {
            return Err(-EISDIR);
        }
        let end = pos + data.len() as u64;
        let needed = end.div_ceil(BLOCK_SIZE) as usize;
        while self.node(ino)?.blocks.len() < needed {
            let block = self.alloc_block()?;
            self.node_mut(ino)?.blocks.push(block);
        }
        let blocks = self.node(ino)?.blocks.clone();
        let mut block = vec![0u8; BLOCK_SIZE as usize];
        let mut at = pos;
        let mut src = 0;
        while src < data.len() {
            let index = (at / BLOCK_SIZE) as usize;
            let within = (at % BLOCK_SIZE) as usize;
            let n = (BLOCK_SIZE as usize - within).min(data.len() - src);
            if n < BLOCK_SIZE as usize {
                self.block_io(blocks[index], &mut block, false)?;
            }
            block[within..within + n].copy_from_slice(&data[src..src + n]);
            self.block_io(blocks[index], &mut block, true)?;
            at += n as u64;
            src += n;
        }
        let node = self.node_mut(ino)?;
        node.size = node.size.max(end);
        node.mtime = now();
        node.ctime = node.mtime;
        Ok(data.len())
    }

    fn remove_entry(&mut self, path: &[u8]) -> Result<(u32, u32), i32> {
        let (parent, name) = self.parent_of(path)?;
        let ino = *self.node(parent)?.entries.get(&name).ok_or(-ENOENT)?;
        Ok((parent, ino))
    }

    fn drop_link(&mut self, ino: u32) -> Result<(), i32> {
        let node = self.node_mut(ino)?;
        node.nlink = node.nlink.saturating_sub(1);
        node.ctime = now();
        if node.nlink == 0 || node.is_dir() {
            self.release(ino)?;
            self.nodes.remove(&ino);
        }
        Ok(())
    }
}

/// 测试用引擎
///
/// 目录结构保存在内存中，每次挂载重新生成；文件数据通过块请求读写磁盘。
#[derive(Default)]
pub struct FixtureEngine {
    heap: Vec<Option<Vec<u8>>>,
    volumes: HashMap<u64, Volume>,
    next_fs: u64,
    files: HashMap<u64, OpenNode>,
    next_file: u64,
    probe: Probe,
}

impl FixtureEngine {
    pub fn new() -> (Self, Probe) {
        let engine = Self::default();
        let probe = engine.probe.clone();
        (engine, probe)
    }

    fn hit(&self) {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn string(&self, ptr: HeapPtr) -> Result<Vec<u8>, i32> {
        let slot = (ptr.0 as usize)
            .checked_sub(1)
            .and_then(|i| self.heap.get(i))
            .and_then(Option::as_ref)
            .ok_or(-EFAULT)?;
        Ok(c_str(slot).to_vec())
    }

    fn volume(&mut self, fs: RawFs) -> Result<&mut Volume, i32> {
        self.volumes.get_mut(&fs.0).ok_or(-EBADF)
    }

    fn open_node(&self, file: RawFile) -> Result<OpenNode, i32> {
        self.files.get(&file.0).copied().ok_or(-EBADF)
    }

    fn do_open(&mut self, fs: RawFs, path: HeapPtr, flags: u32, mode: u32) -> Result<u64, i32> {
        let path = self.string(path)?;
        let vol = self.volume(fs)?;
        let writable = flags & O_ACCMODE != O_RDONLY;
        let ino = match vol.resolve(&path, flags & O_NOFOLLOW == 0, 0) {
            Ok(ino) => {
                if flags & O_CREAT != 0 && flags & O_EXCL != 0 {
                    return Err(-EEXIST);
                }
                let node = vol.node(ino)?;
                if flags & O_DIRECTORY != 0 && !node.is_dir() {
                    return Err(-ENOTDIR);
                }
                if node.is_dir() && writable {
                    return Err(-EISDIR);
                }
                if flags & O_TRUNC != 0 && writable {
                    vol.truncate(ino)?;
                }
                ino
            }
            Err(err) if err == -ENOENT && flags & O_CREAT != 0 => {
                vol.create(&path, S_IFREG | (mode & 0o7777))?
            }
            Err(err) => return Err(err),
        };
        self.next_file += 1;
        self.files.insert(
            self.next_file,
            OpenNode {
                fs: fs.0,
                ino,
                pos: 0,
                flags,
            },
        );
        Ok(self.next_file)
    }

    fn do_read(&mut self, file: RawFile, buf: HeapPtr, len: usize, position: i64) -> Result<usize, i32> {
        let open = self.open_node(file)?;
        if open.flags & O_ACCMODE == O_WRONLY {
            return Err(-EBADF);
        }
        let pos = if position < 0 { open.pos } else { position as u64 };
        let data = self.volume(RawFs(open.fs))?.read_data(open.ino, pos, len)?;
        let dst = self.heap_mut(buf).ok_or(-EFAULT)?;
        if dst.len() < data.len() {
            return Err(-EFAULT);
        }
        dst[..data.len()].copy_from_slice(&data);
        if position < 0 {
            if let Some(open) = self.files.get_mut(&file.0) {
                open.pos += data.len() as u64;
            }
        }
        Ok(data.len())
    }

    fn do_write(&mut self, file: RawFile, buf: HeapPtr, len: usize, position: i64) -> Result<usize, i32> {
        let open = self.open_node(file)?;
        if open.flags & O_ACCMODE == O_RDONLY {
            return Err(-EBADF);
        }
        let data = self
            .heap_mut(buf)
            .and_then(|src| src.get(..len))
            .ok_or(-EFAULT)?
            .to_vec();
        let vol = self.volume(RawFs(open.fs))?;
        let append = open.flags & O_APPEND != 0;
        let pos = if append {
            vol.node(open.ino)?.size
        } else if position < 0 {
            open.pos
        } else {
            position as u64
        };
        let n = vol.write_data(open.ino, pos, &data)?;
        if position < 0 || append {
            if let Some(open) = self.files.get_mut(&file.0) {
                open.pos = pos + n as u64;
            }
        }
        Ok(n)
    }

    fn with_node(&mut self, file: RawFile, f: impl FnOnce(&mut Node)) -> i32 {
        let result = self.open_node(file).and_then(|open| {
            let node = self.volume(RawFs(open.fs))?.node_mut(open.ino)?;
            f(node);
            node.ctime = now();
            Ok(())
        });
        rc(result)
    }

    fn do_rmdir(&mut self, fs: RawFs, path: HeapPtr) -> Result<(), i32> {
        let path = self.string(path)?;
        let vol = self.volume(fs)?;
        let ino = vol.resolve(&path, false, 0)?;
        if ino == ROOT_INO {
            return Err(-EBUSY);
        }
        let node = vol.node(ino)?;
        if !node.is_dir() {
            return Err(-ENOTDIR);
        }
        if !node.entries.is_empty() {
            return Err(-ENOTEMPTY);
        }
        let (parent, name) = vol.parent_of(&path)?;
        let dir = vol.node_mut(parent)?;
        dir.entries.remove(&name);
        dir.nlink -= 1;
        dir.mtime = now();
        vol.drop_link(ino)
    }

    fn do_unlink(&mut self, fs: RawFs, path: HeapPtr) -> Result<(), i32> {
        let path = self.string(path)?;
        let vol = self.volume(fs)?;
        let (parent, ino) = vol.remove_entry(&path)?;
        if vol.node(ino)?.is_dir() {
            return Err(-EISDIR);
        }
        let (_, name) = split_parent(&path);
        vol.node_mut(parent)?.entries.remove(&name);
        vol.drop_link(ino)
    }

    fn do_rename(&mut self, fs: RawFs, from: HeapPtr, to: HeapPtr) -> Result<(), i32> {
        let (from, to) = (self.string(from)?, self.string(to)?);
        let vol = self.volume(fs)?;
        let (src_parent, ino) = vol.remove_entry(&from)?;
        let (dst_parent, dst_name) = vol.parent_of(&to)?;
        if let Some(&existing) = vol.node(dst_parent)?.entries.get(&dst_name) {
            if existing == ino {
                return Ok(());
            }
            let target = vol.node(existing)?;
            if target.is_dir() && !vol.node(ino)?.is_dir() {
                return Err(-EISDIR);
            }
            if target.is_dir() && !target.entries.is_empty() {
                return Err(-ENOTEMPTY);
            }
            vol.node_mut(dst_parent)?.entries.remove(&dst_name);
            vol.drop_link(existing)?;
        }
        let (_, src_name) = split_parent(&from);
        vol.node_mut(src_parent)?.entries.remove(&src_name);
        vol.node_mut(dst_parent)?.entries.insert(dst_name, ino);
        vol.node_mut(ino)?.ctime = now();
        Ok(())
    }

    fn do_link(&mut self, fs: RawFs, existing: HeapPtr, new_path: HeapPtr) -> Result<(), i32> {
        let (existing, new_path) = (self.string(existing)?, self.string(new_path)?);
        let vol = self.volume(fs)?;
        let ino = vol.resolve(&existing, false, 0)?;
        if vol.node(ino)?.is_dir() {
            return Err(-EPERM);
        }
        let (parent, name) = vol.parent_of(&new_path)?;
        let dir = vol.node_mut(parent)?;
        if name.is_empty() || dir.entries.contains_key(&name) {
            return Err(-EEXIST);
        }
        dir.entries.insert(name, ino);
        let node = vol.node_mut(ino)?;
        node.nlink += 1;
        node.ctime = now();
        Ok(())
    }

    fn do_symlink(&mut self, fs: RawFs, target: HeapPtr, path: HeapPtr) -> Result<(), i32> {
        let (target, path) = (self.string(target)?, self.string(path)?);
        let vol = self.volume(fs)?;
        let ino = vol.create(&path, S_IFLNK | 0o777)?;
        let node = vol.node_mut(ino)?;
        node.size = target.len() as u64;
        node.target = target;
        Ok(())
    }

    fn do_trim(&mut self, fs: RawFs) -> Result<(), i32> {
        let vol = self.volume(fs)?;
        let freed: Vec<u64> = std::mem::take(&mut vol.freed).into_iter().collect();
        let mut runs: Vec<(u64, u64)> = Vec::new();
        for block in freed {
            match runs.last_mut() {
                Some((start, len)) if *start + *len == block => *len += 1,
                _ => runs.push((block, 1)),
            }
        }
        for (start, len) in runs {
            let rc = vol.io.request(BlockRequest::control(
                BlockOp::Discard,
                start * BLOCK_SIZE,
                len * BLOCK_SIZE,
            ));
            if rc < 0 {
                return Err(rc as i32);
            }
        }
        Ok(())
    }
}

fn rc(result: Result<(), i32>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => err,
    }
}

fn rc64(result: Result<u64, i32>) -> i64 {
    match result {
        Ok(value) => value as i64,
        Err(err) => err as i64,
    }
}

impl Engine for FixtureEngine {
    fn malloc(&mut self, len: usize) -> Option<HeapPtr> {
        let slot = Some(vec![0u8; len]);
        let index = match self.heap.iter().position(Option::is_none) {
            Some(index) => {
                self.heap[index] = slot;
                index
            }
            None => {
                self.heap.push(slot);
                self.heap.len() - 1
            }
        };
        self.probe.live.fetch_add(1, Ordering::SeqCst);
        Some(HeapPtr(index as u32 + 1))
    }

    fn free(&mut self, ptr: HeapPtr) -> i32 {
        let slot = (ptr.0 as usize)
            .checked_sub(1)
            .and_then(|i| self.heap.get_mut(i))
            .and_then(Option::take);
        match slot {
            Some(_) => {
                self.probe.live.fetch_sub(1, Ordering::SeqCst);
                0
            }
            None => -EFAULT,
        }
    }

    fn heap_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        self.heap
            .get_mut((ptr.0 as usize).checked_sub(1)?)?
            .as_deref_mut()
    }

    fn mount(&mut self, mut io: Box<dyn BlockIo>) -> i64 {
        self.hit();
        if self.probe.panic_on_mount.load(Ordering::SeqCst) {
            panic!("fixture engine fault during mount");
        }
        let rc = io.request(BlockRequest::control(BlockOp::Open, 0, 0));
        if rc < 0 {
            return rc;
        }
        let mut sb = vec![0u8; BLOCK_SIZE as usize];
        let rc = io.request(BlockRequest::read(SUPERBLOCK_OFFSET, &mut sb));
        if rc < 0 {
            return rc;
        }
        if u16::from_le_bytes([sb[MAGIC_OFFSET], sb[MAGIC_OFFSET + 1]]) != EXT2_MAGIC {
            return -(EINVAL as i64);
        }

        let mut nodes = HashMap::new();
        let mut root = Node::new(S_IFDIR | 0o755, SEED_TIME);
        root.nlink = 3;
        root.entries.insert(b"lost+found".to_vec(), LOST_FOUND_INO);
        nodes.insert(LOST_FOUND_INO, Node::new(S_IFDIR | 0o700, SEED_TIME));
        for (i, (name, content)) in SEED.iter().enumerate() {
            let ino = LOST_FOUND_INO + 1 + i as u32;
            let mut node = Node::new(S_IFREG | 0o644, SEED_TIME);
            node.size = content.len() as u64;
            node.blocks.push(FIRST_DATA_BLOCK + i as u64);
            root.entries.insert(name.as_bytes().to_vec(), ino);
            nodes.insert(ino, node);
        }
        nodes.insert(ROOT_INO, root);

        self.next_fs += 1;
        self.volumes.insert(
            self.next_fs,
            Volume {
                io,
                nodes,
                next_ino: LOST_FOUND_INO + 1 + SEED.len() as u32,
                next_block: FIRST_DATA_BLOCK + SEED.len() as u64,
                free_blocks: Vec::new(),
                freed: BTreeSet::new(),
            },
        );
        self.next_fs as i64
    }

    fn umount(&mut self, fs: RawFs) -> i32 {
        self.hit();
        let Some(mut vol) = self.volumes.remove(&fs.0) else {
            return -EBADF;
        };
        self.files.retain(|_, open| open.fs != fs.0);
        let flushed = vol.io.request(BlockRequest::control(BlockOp::Flush, 0, 0));
        let closed = vol.io.request(BlockRequest::control(BlockOp::Close, 0, 0));
        if flushed < 0 {
            flushed as i32
        } else {
            closed.min(0) as i32
        }
    }

    fn trim(&mut self, fs: RawFs) -> i32 {
        self.hit();
        rc(self.do_trim(fs))
    }

    fn open(&mut self, fs: RawFs, path: HeapPtr, flags: u32, mode: u32) -> i64 {
        self.hit();
        rc64(self.do_open(fs, path, flags, mode))
    }

    fn close(&mut self, file: RawFile) -> i32 {
        self.hit();
        match self.files.remove(&file.0) {
            Some(_) => 0,
            None => -EBADF,
        }
    }

    fn read(&mut self, file: RawFile, _flags: u32, buf: HeapPtr, len: usize, position: i64) -> i64 {
        self.hit();
        rc64(self.do_read(file, buf, len, position).map(|n| n as u64))
    }

    fn write(&mut self, file: RawFile, _flags: u32, buf: HeapPtr, len: usize, position: i64) -> i64 {
        self.hit();
        let extra = if self.probe.inflate_writes.load(Ordering::SeqCst) { 7 } else { 0 };
        rc64(self.do_write(file, buf, len, position).map(|n| n as u64 + extra))
    }

    fn chmod(&mut self, file: RawFile, mode: u32) -> i32 {
        self.hit();
        self.with_node(file, |node| node.mode = (node.mode & S_IFMT) | (mode & 0o7777))
    }

    fn chown(&mut self, file: RawFile, uid: u32, gid: u32) -> i32 {
        self.hit();
        self.with_node(file, |node| {
            node.uid = uid;
            node.gid = gid;
        })
    }

    fn stat_attr(&mut self, file: RawFile, attr: StatAttr) -> i64 {
        self.hit();
        if self.probe.fail_stat.load(Ordering::SeqCst) {
            return -(EIO as i64);
        }
        let result = self.open_node(file).and_then(|open| {
            let node = self.volume(RawFs(open.fs))?.node(open.ino)?;
            Ok(match attr {
                StatAttr::Mode => node.mode as u64,
                StatAttr::LinksCount => node.nlink,
                StatAttr::Uid => node.uid as u64,
                StatAttr::Gid => node.gid as u64,
                StatAttr::BlockSize => BLOCK_SIZE,
                StatAttr::Size => node.size,
                StatAttr::Ino => open.ino as u64,
                StatAttr::Blocks => node.blocks.len() as u64 * (BLOCK_SIZE / 512),
                StatAttr::Atime => node.atime,
                StatAttr::Mtime => node.mtime,
                StatAttr::Ctime => node.ctime,
            })
        });
        rc64(result)
    }

    fn mkdir(&mut self, fs: RawFs, path: HeapPtr, mode: u32) -> i32 {
        self.hit();
        let result = self.string(path).and_then(|path| {
            if path == b"/panic" {
                panic!("fixture engine fault");
            }
            self.volume(fs)?.create(&path, S_IFDIR | (mode & 0o7777))
        });
        rc(result.map(drop))
    }

    fn rmdir(&mut self, fs: RawFs, path: HeapPtr) -> i32 {
        self.hit();
        rc(self.do_rmdir(fs, path))
    }

    fn unlink(&mut self, fs: RawFs, path: HeapPtr) -> i32 {
        self.hit();
        rc(self.do_unlink(fs, path))
    }

    fn readdir(&mut self, fs: RawFs, path: HeapPtr, out: ObjectId, host: &mut dyn HostObjects) -> i32 {
        self.hit();
        let result = self.string(path).and_then(|path| {
            let vol = self.volume(fs)?;
            let node = vol.node(vol.resolve(&path, true, 0)?)?;
            if !node.is_dir() {
                return Err(-ENOTDIR);
            }
            for name in node.entries.keys() {
                let rc = host.push_bytes(out, name);
                if rc < 0 {
                    return Err(rc);
                }
            }
            Ok(())
        });
        rc(result)
    }

    fn readlink(&mut self, fs: RawFs, path: HeapPtr, out: ObjectId, host: &mut dyn HostObjects) -> i32 {
        self.hit();
        let result = self.string(path).and_then(|path| {
            let vol = self.volume(fs)?;
            let node = vol.node(vol.resolve(&path, false, 0)?)?;
            if !node.is_symlink() {
                return Err(-EINVAL);
            }
            match host.push_bytes(out, &node.target) {
                rc if rc < 0 => Err(rc),
                _ => Ok(()),
            }
        });
        rc(result)
    }

    fn symlink(&mut self, fs: RawFs, target: HeapPtr, path: HeapPtr) -> i32 {
        self.hit();
        rc(self.do_symlink(fs, target, path))
    }

    fn rename(&mut self, fs: RawFs, from: HeapPtr, to: HeapPtr) -> i32 {
        self.hit();
        rc(self.do_rename(fs, from, to))
    }

    fn link(&mut self, fs: RawFs, existing: HeapPtr, new_path: HeapPtr) -> i32 {
        self.hit();
        rc(self.do_link(fs, existing, new_path))
    }
}

/// 读请求总是失败的磁盘（错误不带系统错误码）
pub struct BrokenDisk;

#[async_trait]
impl Disk for BrokenDisk {
    async fn read(&self, _buf: &mut [u8], _position: u64) -> io::Result<usize> {
        Err(io::Error::other("sector unreadable"))
    }

    async fn write(&self, buf: &[u8], _position: u64) -> io::Result<usize> {
        Ok(buf.len())
    }

    async fn flush(&self) -> io::Result<()> {
        Ok(())
    }

    async fn discard(&self, _position: u64, _length: u64) -> io::Result<()> {
        Ok(())
    }
}

/// 可随时切换为读写失败的内存磁盘
pub struct FlakyDisk {
    inner: MemoryDisk,
    failing: AtomicBool,
}

impl FlakyDisk {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: MemoryDisk::new(data),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::other("disk went away"));
        }
        Ok(())
    }
}

#[async_trait]
impl Disk for FlakyDisk {
    async fn read(&self, buf: &mut [u8], position: u64) -> io::Result<usize> {
        self.check()?;
        self.inner.read(buf, position).await
    }

    async fn write(&self, buf: &[u8], position: u64) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf, position).await
    }

    async fn flush(&self) -> io::Result<()> {
        self.check()?;
        self.inner.flush().await
    }

    async fn discard(&self, position: u64, length: u64) -> io::Result<()> {
        self.check()?;
        self.inner.discard(position, length).await
    }
}

/// 新引擎 + 挂载好的内存镜像
pub async fn mounted(config: FsConfig) -> (Ext2, FileSystem, Arc<MemoryDisk>, Probe) {
    init_logger();
    let (engine, probe) = FixtureEngine::new();
    let ext2 = Ext2::with_config(engine, config);
    let disk = Arc::new(MemoryDisk::new(image()));
    let fs = ext2.mount(disk.clone(), 0).await.unwrap();
    (ext2, fs, disk, probe)
}
