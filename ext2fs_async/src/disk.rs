//! 磁盘抽象模块：调用方提供的异步字节区间读写设备。
//!
//! 任何实现了 [`Disk`] 四个原语的类型都可以作为文件系统镜像的后端。
//! 这里提供两个具体实现：内存镜像 [`MemoryDisk`] 和基于文件的 [`FileDisk`]。

use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// 磁盘接口
///
/// 所有偏移都是磁盘上的绝对字节偏移。读写返回实际处理的字节数，
/// 读到的字节数少于缓冲区长度不算错误。
///
/// # 示例
///
/// ```ignore
/// struct MyDisk { /* ... */ }
///
/// #[async_trait]
/// impl Disk for MyDisk {
///     async fn read(&self, buf: &mut [u8], position: u64) -> io::Result<usize> {
///         // 读取 buf.len() 字节
///     }
///
///     async fn write(&self, buf: &[u8], position: u64) -> io::Result<usize> {
///         // 写入 buf 的全部内容
///     }
///
///     async fn flush(&self) -> io::Result<()> {
///         Ok(())
///     }
///
///     async fn discard(&self, position: u64, length: u64) -> io::Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Disk: Send + Sync {
    /// 从 `position` 开始读取，最多填满 `buf`
    async fn read(&self, buf: &mut [u8], position: u64) -> io::Result<usize>;

    /// 从 `position` 开始写入 `buf`
    async fn write(&self, buf: &[u8], position: u64) -> io::Result<usize>;

    /// 确保之前的写入已持久化
    async fn flush(&self) -> io::Result<()>;

    /// 告知磁盘 `[position, position + length)` 的内容可以丢弃
    async fn discard(&self, position: u64, length: u64) -> io::Result<()>;
}

/// 内存磁盘
///
/// 写入超出当前大小时自动扩展；DISCARD 会把对应区间清零并记录下来。
#[derive(Debug, Default)]
pub struct MemoryDisk {
    inner: Mutex<MemoryDiskInner>,
}

#[derive(Debug, Default)]
struct MemoryDiskInner {
    data: Vec<u8>,
    discarded: Vec<(u64, u64)>,
    flushes: usize,
}

impl MemoryDisk {
    /// 以给定内容创建内存磁盘
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            inner: Mutex::new(MemoryDiskInner {
                data,
                ..Default::default()
            }),
        }
    }

    /// 创建指定大小、内容全零的内存磁盘
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    fn lock(&self) -> MutexGuard<'_, MemoryDiskInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 当前镜像内容的副本
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().data.clone()
    }

    /// 镜像大小（字节）
    pub fn len(&self) -> u64 {
        self.lock().data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 收到过的 DISCARD 区间 `(position, length)`，按到达顺序排列
    pub fn discarded(&self) -> Vec<(u64, u64)> {
        self.lock().discarded.clone()
    }

    /// 收到过的 FLUSH 次数
    pub fn flushes(&self) -> usize {
        self.lock().flushes
    }
}

fn out_of_range(position: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("position {position} is out of range"),
    )
}

#[async_trait]
impl Disk for MemoryDisk {
    async fn read(&self, buf: &mut [u8], position: u64) -> io::Result<usize> {
        let inner = self.lock();
        let start = usize::try_from(position).map_err(|_| out_of_range(position))?;
        if start >= inner.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(inner.data.len() - start);
        buf[..n].copy_from_slice(&inner.data[start..start + n]);
        Ok(n)
    }

    async fn write(&self, buf: &[u8], position: u64) -> io::Result<usize> {
        let mut inner = self.lock();
        let start = usize::try_from(position).map_err(|_| out_of_range(position))?;
        let end = start + buf.len();
        if end > inner.data.len() {
            inner.data.resize(end, 0);
        }
        inner.data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&self) -> io::Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }

    async fn discard(&self, position: u64, length: u64) -> io::Result<()> {
        let mut inner = self.lock();
        inner.discarded.push((position, length));
        let len = inner.data.len() as u64;
        let start = position.min(len) as usize;
        let end = position.saturating_add(length).min(len) as usize;
        inner.data[start..end].fill(0);
        Ok(())
    }
}

/// 基于文件的磁盘
///
/// 每次访问都先定位再读写，文件句柄由异步互斥锁保护。DISCARD 不做任何事。
#[derive(Debug)]
pub struct FileDisk {
    file: tokio::sync::Mutex<File>,
}

impl FileDisk {
    /// 以读写方式打开镜像文件
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(path).await?;
        Ok(Self::from_file(file))
    }

    pub fn from_file(file: File) -> Self {
        Self {
            file: tokio::sync::Mutex::new(file),
        }
    }
}

#[async_trait]
impl Disk for FileDisk {
    async fn read(&self, buf: &mut [u8], position: u64) -> io::Result<usize> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(position)).await?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..]).await?;
            if n == 0 {
                break; // EOF
            }
            total += n;
        }
        Ok(total)
    }

    async fn write(&self, buf: &[u8], position: u64) -> io::Result<usize> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(position)).await?;
        file.write_all(buf).await?;
        Ok(buf.len())
    }

    async fn flush(&self) -> io::Result<()> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_data().await
    }

    async fn discard(&self, position: u64, length: u64) -> io::Result<()> {
        trace!("file disk ignores discard of {length} bytes at {position}");
        Ok(())
    }
}
