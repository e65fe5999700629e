//! ext2fs-async：以异步 POSIX 风格访问 ext2/3/4 镜像。
//!
//! 文件系统引擎（任何实现 [`Engine`] 的类型）运行在专用线程上，调用经由 FIFO 网关
//! 逐个送入；引擎发出的块请求被路由到调用方提供的异步 [`Disk`]。
//!
//! ```ignore
//! let ext2 = Ext2::new(engine);
//! let disk = Arc::new(FileDisk::open("image.ext2").await?);
//! let fs = ext2.mount(disk, 0).await?;
//! let fd = fs.open("/hello.txt", "w", 0o644).await?;
//! fs.write(fd, b"hello", 0, 5, None).await?;
//! fs.close(fd).await?;
//! ext2.umount(&fs).await?;
//! ```

// 引入日志宏
#[macro_use]
extern crate log;

// 磁盘抽象及其实现
mod disk;
// 文件描述符表
mod fd;
// 引擎生命周期与调用面
mod fs;
// 串行调用网关
mod gateway;
// 文件句柄包装
mod handle;
// 块请求路由
mod router;
// 操作作用域
mod scope;
// 文件状态
mod stat;
// 参数校验工具
mod util;

#[cfg(test)]
mod testing;

pub use disk::{Disk, FileDisk, MemoryDisk};
pub use fd::Fd;
pub use fs::{Ext2, FileSystem, FsConfig};
pub use handle::FileHandle;
pub use router::{BlockRouter, DiskRef};
pub use stat::Stats;

// 引擎契约与错误类型
pub use ext2fs_core::*;
