//! 操作作用域：一次逻辑调用期间的临时资源管理。
//!
//! 跨越引擎边界的数据（路径、读写缓冲区）只能放在引擎堆上；引擎回调宿主侧集合
//! （目录项列表、链接目标）需要先登记对象 id。这些资源都挂在 [`Scope`] 上，
//! 作用域结束时（正常返回、引擎错误、磁盘错误或 panic 展开）统一释放且只释放一次。
//!
//! 作用域显式传递：每个引擎入口都拿到自己的 `&mut Scope`，组合操作通过
//! [`Scope::child`] 开启嵌套作用域，借用规则保证子作用域不会比父作用域活得更久。

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use ext2fs_core::{
    Context, Engine, FsError, FsResult, HeapPtr, HostObjects, ObjectId, EINVAL, ENOMEM,
};

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

/// 引擎回调可以访问的宿主侧对象表
#[derive(Default)]
struct ObjectTable {
    next: u32,
    slots: BTreeMap<u32, Box<dyn Any + Send>>,
}

impl ObjectTable {
    fn insert(&mut self, value: Box<dyn Any + Send>) -> ObjectId {
        self.next += 1;
        self.slots.insert(self.next, value);
        ObjectId(self.next)
    }
}

impl HostObjects for ObjectTable {
    fn push_bytes(&mut self, id: ObjectId, bytes: &[u8]) -> i32 {
        match self
            .slots
            .get_mut(&id.0)
            .and_then(|v| v.downcast_mut::<Vec<Vec<u8>>>())
        {
            Some(list) => {
                list.push(bytes.to_vec());
                0
            }
            None => {
                warn!("engine pushed into unknown host object {}", id.0);
                -EINVAL
            }
        }
    }
}

/// 一次逻辑调用的作用域
pub struct Scope<'e> {
    id: u64,
    syscall: &'static str,
    args: String,
    engine: &'e mut dyn Engine,
    buffers: Vec<HeapPtr>,
    objects: ObjectTable,
}

impl<'e> Scope<'e> {
    /// 开启新的作用域，`syscall` 和 `args` 用于构造错误记录
    pub fn begin(engine: &'e mut dyn Engine, syscall: &'static str, args: String) -> Self {
        let id = NEXT_SCOPE.fetch_add(1, Ordering::Relaxed);
        debug!("scope {id} begin: {syscall} {args}");
        Self {
            id,
            syscall,
            args,
            engine,
            buffers: Vec::new(),
            objects: ObjectTable::default(),
        }
    }

    /// 在当前作用域内开启嵌套作用域（组合操作中的一次原语调用）
    pub fn child(&mut self, syscall: &'static str, args: String) -> Scope<'_> {
        Scope::begin(&mut *self.engine, syscall, args)
    }

    pub fn engine(&mut self) -> &mut dyn Engine {
        &mut *self.engine
    }

    /// 同时借出引擎和对象表，供需要回调宿主侧集合的引擎入口使用
    pub fn with_host<R>(
        &mut self,
        f: impl FnOnce(&mut dyn Engine, &mut dyn HostObjects) -> R,
    ) -> R {
        f(&mut *self.engine, &mut self.objects)
    }

    /// 在引擎堆上分配 `len` 字节，作用域结束时释放
    pub fn alloc_buffer(&mut self, len: usize) -> FsResult<HeapPtr> {
        // 零长度分配在部分分配器上会返回空指针
        let ptr = self
            .engine
            .malloc(len.max(1))
            .ok_or_else(|| self.error(ENOMEM))?;
        self.buffers.push(ptr);
        Ok(ptr)
    }

    /// 分配并填入 `bytes` 的副本
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> FsResult<HeapPtr> {
        let ptr = self.alloc_buffer(bytes.len())?;
        self.buffer_mut(ptr)[..bytes.len()].copy_from_slice(bytes);
        Ok(ptr)
    }

    /// 分配 NUL 结尾的字符串
    pub fn alloc_c_str(&mut self, bytes: &[u8]) -> FsResult<HeapPtr> {
        let ptr = self.alloc_buffer(bytes.len() + 1)?;
        let buf = self.buffer_mut(ptr);
        buf[..bytes.len()].copy_from_slice(bytes);
        buf[bytes.len()] = 0;
        Ok(ptr)
    }

    /// 访问本作用域分配的缓冲区
    ///
    /// # Panics
    ///
    /// `ptr` 不属于本作用域时 panic：这是调用方的编程错误。
    pub fn buffer_mut(&mut self, ptr: HeapPtr) -> &mut [u8] {
        if !self.buffers.contains(&ptr) {
            panic!("heap buffer {ptr:?} is not owned by scope {}", self.id);
        }
        match self.engine.heap_mut(ptr) {
            Some(buf) => buf,
            None => panic!("engine lost heap buffer {ptr:?} of scope {}", self.id),
        }
    }

    /// 登记一个宿主侧对象，引擎可以通过返回的 id 回调它
    pub fn register<T: Any + Send>(&mut self, value: T) -> ObjectId {
        self.objects.insert(Box::new(value))
    }

    /// 取回登记的对象，类型不符或已取回时返回 `None`
    pub fn take<T: Any>(&mut self, id: ObjectId) -> Option<T> {
        let slot = self.objects.slots.remove(&id.0)?;
        match slot.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(slot) => {
                self.objects.slots.insert(id.0, slot);
                None
            }
        }
    }

    /// 把引擎的原始返回值转换为结果
    pub fn check<C: Context>(&self, rc: C) -> FsResult<u64> {
        rc.context(self.syscall, &self.args)
    }

    /// 以本作用域的操作名和参数构造错误记录
    pub fn error(&self, errno: i32) -> FsError {
        FsError::new(errno, self.syscall, self.args.clone())
    }

    /// 结束作用域
    pub fn end(self) {}

    fn release(&mut self) {
        for ptr in self.buffers.drain(..) {
            let rc = self.engine.free(ptr);
            if rc < 0 {
                warn!(
                    "scope {} ({}): failed to release {ptr:?}: {rc}",
                    self.id, self.syscall
                );
            }
        }
        self.objects.slots.clear();
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        self.release();
        debug!("scope {} end: {}", self.id, self.syscall);
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("syscall", &self.syscall)
            .field("args", &self.args)
            .field("buffers", &self.buffers.len())
            .field("objects", &self.objects.slots.len())
            .finish()
    }
}
