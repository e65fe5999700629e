//! 引擎调用面
//!
//! 文件系统引擎（理解 ext2/3/4 磁盘结构的实现）是非可重入、单线程的，
//! 因此所有入口都以 `&mut self` 的形式出现。原始返回值沿用引擎约定：
//! 非负值为结果或句柄，负值为 `-errno`，由调用方通过 [`Context`](crate::Context)
//! 转换为错误记录。
//!
//! 路径和数据缓冲区只能通过引擎堆（[`Engine::malloc`]）跨越边界，路径以 NUL 结尾。

use alloc::boxed::Box;

use crate::block::BlockIo;

/// 引擎堆上一段内存的地址
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapPtr(pub u32);

/// 引擎内已挂载文件系统的句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawFs(pub u64);

/// 引擎内已打开文件的句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawFile(pub u64);

/// 宿主侧对象的 id，引擎通过 [`HostObjects`] 回调填充对应的集合
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// 引擎回调宿主侧集合的接口
pub trait HostObjects {
    /// 向 `id` 对应的列表追加一段字节，`id` 未注册或类型不符时返回 `-EINVAL`
    fn push_bytes(&mut self, id: ObjectId, bytes: &[u8]) -> i32;
}

/// 可以单独读取的 inode 属性
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatAttr {
    /// 类型与权限位
    Mode,
    /// 硬链接数量
    LinksCount,
    Uid,
    Gid,
    /// 文件系统块大小
    BlockSize,
    /// 文件大小（字节）
    Size,
    /// inode 编号
    Ino,
    /// 分配的 512B 块数量
    Blocks,
    /// 最后访问时间（秒）
    Atime,
    /// 最后修改时间（秒）
    Mtime,
    /// 最后状态修改时间（秒）
    Ctime,
}

/// 文件系统引擎
pub trait Engine: Send + 'static {
    /// 在引擎堆上分配 `len` 字节（内容未定义）
    fn malloc(&mut self, len: usize) -> Option<HeapPtr>;

    /// 释放引擎堆上的内存
    fn free(&mut self, ptr: HeapPtr) -> i32;

    /// 访问引擎堆上的一段内存
    fn heap_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]>;

    /// 挂载文件系统，此后该文件系统的所有块请求都通过 `io` 发出
    ///
    /// 成功返回 [`RawFs`] 句柄的数值。
    fn mount(&mut self, io: Box<dyn BlockIo>) -> i64;

    /// 卸载文件系统（会刷新并关闭块设备）
    fn umount(&mut self, fs: RawFs) -> i32;

    /// 将当前空闲的区域通过 DISCARD 请求告知块设备
    fn trim(&mut self, fs: RawFs) -> i32;

    /// 打开文件，成功返回 [`RawFile`] 句柄的数值
    fn open(&mut self, fs: RawFs, path: HeapPtr, flags: u32, mode: u32) -> i64;

    fn close(&mut self, file: RawFile) -> i32;

    /// 读取 `len` 字节到 `buf`，`position` 为 -1 时从当前位置读取
    fn read(&mut self, file: RawFile, flags: u32, buf: HeapPtr, len: usize, position: i64) -> i64;

    /// 从 `buf` 写入 `len` 字节，`position` 为 -1 时写到当前位置
    fn write(&mut self, file: RawFile, flags: u32, buf: HeapPtr, len: usize, position: i64)
        -> i64;

    /// 修改权限位（类型位保持不变）
    fn chmod(&mut self, file: RawFile, mode: u32) -> i32;

    fn chown(&mut self, file: RawFile, uid: u32, gid: u32) -> i32;

    /// 读取单个 inode 属性
    fn stat_attr(&mut self, file: RawFile, attr: StatAttr) -> i64;

    fn mkdir(&mut self, fs: RawFs, path: HeapPtr, mode: u32) -> i32;

    fn rmdir(&mut self, fs: RawFs, path: HeapPtr) -> i32;

    fn unlink(&mut self, fs: RawFs, path: HeapPtr) -> i32;

    /// 列出目录，每个条目（不含 `.` 和 `..`）通过 `host` 追加到 `out`
    fn readdir(
        &mut self,
        fs: RawFs,
        path: HeapPtr,
        out: ObjectId,
        host: &mut dyn HostObjects,
    ) -> i32;

    /// 读取符号链接目标，通过 `host` 追加到 `out`
    fn readlink(
        &mut self,
        fs: RawFs,
        path: HeapPtr,
        out: ObjectId,
        host: &mut dyn HostObjects,
    ) -> i32;

    /// 在 `path` 处创建指向 `target` 的符号链接
    fn symlink(&mut self, fs: RawFs, target: HeapPtr, path: HeapPtr) -> i32;

    fn rename(&mut self, fs: RawFs, from: HeapPtr, to: HeapPtr) -> i32;

    /// 为 `existing` 创建硬链接 `new_path`
    fn link(&mut self, fs: RawFs, existing: HeapPtr, new_path: HeapPtr) -> i32;
}

/// 截取 NUL 结尾的字符串（不含 NUL），没有 NUL 时返回整段
pub fn c_str(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}
