//! 文件句柄：绑定了 fd 的便捷包装。

use std::sync::{Mutex, PoisonError};

use ext2fs_core::{FsError, FsResult, EBADF};

use crate::fd::Fd;
use crate::fs::FileSystem;
use crate::stat::Stats;

/// 每次 `read_to_end` 读取的字节数
const CHUNK: usize = 16 * 1024;

/// 打开的文件
///
/// 关闭后所有操作都以 EBADF 失败。句柄被丢弃时不会自动关闭 fd：
/// 关闭需要进入引擎，只能异步完成，遗留的 fd 会在卸载时统一关闭。
#[derive(Debug)]
pub struct FileHandle {
    fs: FileSystem,
    fd: Mutex<Option<Fd>>,
}

impl FileHandle {
    pub(crate) fn new(fs: FileSystem, fd: Fd) -> Self {
        Self {
            fs,
            fd: Mutex::new(Some(fd)),
        }
    }

    /// 文件描述符，关闭后为 `None`
    pub fn fd(&self) -> Option<Fd> {
        *self.fd.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self, syscall: &'static str) -> FsResult<Fd> {
        self.fd()
            .ok_or_else(|| FsError::new(EBADF, syscall, "[closed]"))
    }

    /// 读取到 `buf`，`position` 为 `None` 时从当前位置读取
    pub async fn read(&self, buf: &mut [u8], position: Option<u64>) -> FsResult<usize> {
        let fd = self.current("read")?;
        let len = buf.len();
        self.fs.read(fd, buf, 0, len, position).await
    }

    /// 写入 `data`，`position` 为 `None` 时写到当前位置
    pub async fn write(&self, data: &[u8], position: Option<u64>) -> FsResult<usize> {
        let fd = self.current("write")?;
        self.fs.write(fd, data, 0, data.len(), position).await
    }

    /// 从当前位置读到文件末尾
    pub async fn read_to_end(&self) -> FsResult<Vec<u8>> {
        let fd = self.current("read")?;
        let mut data = Vec::new();
        let mut chunk = vec![0u8; CHUNK];
        loop {
            let n = self.fs.read(fd, &mut chunk, 0, CHUNK, None).await?;
            if n == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn stat(&self) -> FsResult<Stats> {
        let fd = self.current("fstat")?;
        self.fs.fstat(fd).await
    }

    pub async fn chmod(&self, mode: u32) -> FsResult<()> {
        let fd = self.current("fchmod")?;
        self.fs.fchmod(fd, mode).await
    }

    pub async fn chown(&self, uid: u32, gid: u32) -> FsResult<()> {
        let fd = self.current("fchown")?;
        self.fs.fchown(fd, uid, gid).await
    }

    /// 关闭文件；关闭失败时句柄保持打开
    pub async fn close(&self) -> FsResult<()> {
        let fd = self.current("close")?;
        self.fs.close(fd).await?;
        let mut slot = self.fd.lock().unwrap_or_else(PoisonError::into_inner);
        if *slot == Some(fd) {
            *slot = None;
        }
        Ok(())
    }
}
