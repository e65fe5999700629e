//! 单元测试用的最小引擎：只实现引擎堆，其余入口返回 `-ENOTSUP`。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ext2fs_core::*;

#[derive(Default)]
pub(crate) struct HeapEngine {
    slots: Vec<Option<Vec<u8>>>,
    live: Arc<AtomicUsize>,
    fail_free: bool,
}

impl HeapEngine {
    /// 每次释放都报告失败（分配仍会被回收）
    pub(crate) fn failing_free() -> Self {
        Self {
            fail_free: true,
            ..Self::default()
        }
    }

    /// 当前未释放的分配数量（引擎移交给其他线程后仍可读取）
    pub(crate) fn live(&self) -> Arc<AtomicUsize> {
        self.live.clone()
    }
}

impl Engine for HeapEngine {
    fn malloc(&mut self, len: usize) -> Option<HeapPtr> {
        self.slots.push(Some(vec![0; len]));
        self.live.fetch_add(1, Ordering::SeqCst);
        Some(HeapPtr(self.slots.len() as u32))
    }

    fn free(&mut self, ptr: HeapPtr) -> i32 {
        let slot = (ptr.0 as usize)
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(i))
            .and_then(Option::take);
        if slot.is_none() {
            return -EFAULT;
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
        if self.fail_free {
            -EIO
        } else {
            0
        }
    }

    fn heap_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        self.slots
            .get_mut((ptr.0 as usize).checked_sub(1)?)?
            .as_deref_mut()
    }

    fn mount(&mut self, _io: Box<dyn BlockIo>) -> i64 {
        -(ENOTSUP as i64)
    }

    fn umount(&mut self, _fs: RawFs) -> i32 {
        -ENOTSUP
    }

    fn trim(&mut self, _fs: RawFs) -> i32 {
        -ENOTSUP
    }

    fn open(&mut self, _fs: RawFs, _path: HeapPtr, _flags: u32, _mode: u32) -> i64 {
        -(ENOTSUP as i64)
    }

    fn close(&mut self, _file: RawFile) -> i32 {
        -ENOTSUP
    }

    fn read(&mut self, _: RawFile, _: u32, _: HeapPtr, _: usize, _: i64) -> i64 {
        -(ENOTSUP as i64)
    }

    fn write(&mut self, _: RawFile, _: u32, _: HeapPtr, _: usize, _: i64) -> i64 {
        -(ENOTSUP as i64)
    }

    fn chmod(&mut self, _file: RawFile, _mode: u32) -> i32 {
        -ENOTSUP
    }

    fn chown(&mut self, _file: RawFile, _uid: u32, _gid: u32) -> i32 {
        -ENOTSUP
    }

    fn stat_attr(&mut self, _file: RawFile, _attr: StatAttr) -> i64 {
        -(ENOTSUP as i64)
    }

    fn mkdir(&mut self, _fs: RawFs, _path: HeapPtr, _mode: u32) -> i32 {
        -ENOTSUP
    }

    fn rmdir(&mut self, _fs: RawFs, _path: HeapPtr) -> i32 {
        -ENOTSUP
    }

    fn unlink(&mut self, _fs: RawFs, _path: HeapPtr) -> i32 {
        -ENOTSUP
    }

    fn readdir(&mut self, _: RawFs, _: HeapPtr, out: ObjectId, host: &mut dyn HostObjects) -> i32 {
        for name in [&b"a"[..], b"b"] {
            let rc = host.push_bytes(out, name);
            if rc < 0 {
                return rc;
            }
        }
        0
    }

    fn readlink(&mut self, _: RawFs, _: HeapPtr, _: ObjectId, _: &mut dyn HostObjects) -> i32 {
        -ENOTSUP
    }

    fn symlink(&mut self, _fs: RawFs, _target: HeapPtr, _path: HeapPtr) -> i32 {
        -ENOTSUP
    }

    fn rename(&mut self, _fs: RawFs, _from: HeapPtr, _to: HeapPtr) -> i32 {
        -ENOTSUP
    }

    fn link(&mut self, _fs: RawFs, _existing: HeapPtr, _new_path: HeapPtr) -> i32 {
        -ENOTSUP
    }
}
