//! 块请求路由：把引擎发出的块请求转发到外部磁盘。
//!
//! 引擎线程上的请求是同步的，磁盘是异步的；路由器通过挂载时捕获的运行时句柄
//! 在引擎线程上 `block_on` 磁盘操作，因此一个块请求总是属于发出它的那次引擎调用。

use std::io;
use std::sync::Arc;

use ext2fs_core::{BlockIo, BlockOp, BlockRequest, EINVAL, EIO};
use tokio::runtime::Handle;

use crate::disk::Disk;

/// ZEROOUT 每次写入的最大字节数
const ZEROOUT_CHUNK: usize = 64 * 1024;

/// 带偏移的磁盘视图
///
/// 文件系统镜像可能嵌在更大的容器里，所有请求在转发前都加上 `offset`。
#[derive(Clone)]
pub struct DiskRef {
    disk: Arc<dyn Disk>,
    offset: u64,
}

impl DiskRef {
    pub fn new(disk: Arc<dyn Disk>, offset: u64) -> Self {
        Self { disk, offset }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn disk(&self) -> &Arc<dyn Disk> {
        &self.disk
    }

    fn translate(&self, position: u64) -> Option<u64> {
        position.checked_add(self.offset)
    }
}

/// 磁盘错误对应的 errno：带有系统错误码时沿用，否则为 EIO
fn disk_errno(err: &io::Error) -> i64 {
    let errno = err.raw_os_error().filter(|&e| e > 0).unwrap_or(EIO);
    -(errno as i64)
}

/// 块请求路由器，引擎在挂载时拿到它的所有权
pub struct BlockRouter {
    target: DiskRef,
    rt: Handle,
}

impl BlockRouter {
    pub fn new(target: DiskRef, rt: Handle) -> Self {
        Self { target, rt }
    }

    fn read(&self, position: u64, buf: &mut [u8]) -> i64 {
        match self.rt.block_on(self.target.disk.read(buf, position)) {
            Ok(n) => n as i64,
            Err(err) => {
                debug!("disk read of {} bytes at {position} failed: {err}", buf.len());
                disk_errno(&err)
            }
        }
    }

    fn write(&self, position: u64, buf: &[u8]) -> i64 {
        match self.rt.block_on(self.target.disk.write(buf, position)) {
            Ok(n) => n as i64,
            Err(err) => {
                debug!("disk write of {} bytes at {position} failed: {err}", buf.len());
                disk_errno(&err)
            }
        }
    }

    fn flush(&self) -> i64 {
        match self.rt.block_on(self.target.disk.flush()) {
            Ok(()) => 0,
            Err(err) => {
                debug!("disk flush failed: {err}");
                disk_errno(&err)
            }
        }
    }

    fn discard(&self, position: u64, length: u64) -> i64 {
        match self.rt.block_on(self.target.disk.discard(position, length)) {
            Ok(()) => 0,
            Err(err) => {
                debug!("disk discard of {length} bytes at {position} failed: {err}");
                disk_errno(&err)
            }
        }
    }

    /// 先写零再丢弃，中途观察到的内容总是零
    ///
    /// 零缓冲区大小固定，大范围分多次写入。
    fn zeroout(&self, position: u64, length: u64) -> i64 {
        if position.checked_add(length).is_none() {
            return -(EINVAL as i64);
        }
        let zeros = [0u8; ZEROOUT_CHUNK];
        let mut done = 0;
        while done < length {
            let len = (length - done).min(ZEROOUT_CHUNK as u64) as usize;
            let written = self.write(position + done, &zeros[..len]);
            if written < 0 {
                return written;
            }
            if written == 0 {
                warn!("disk accepted no bytes while zeroing at {}", position + done);
                return -(EIO as i64);
            }
            done += (written as u64).min(len as u64);
        }
        self.discard(position, length)
    }
}

impl BlockIo for BlockRouter {
    fn request(&mut self, req: BlockRequest<'_>) -> i64 {
        trace!("block request {req:?}");
        let op = match BlockOp::try_from(req.op) {
            Ok(op) => op,
            Err(code) => {
                warn!("unknown block request type {code}");
                return -(EINVAL as i64);
            }
        };
        let Some(position) = self.target.translate(req.offset) else {
            return -(EINVAL as i64);
        };
        match op {
            BlockOp::Open | BlockOp::Close | BlockOp::CacheReadahead => 0,
            BlockOp::Read | BlockOp::Write => {
                let Some(buf) = usize::try_from(req.length)
                    .ok()
                    .and_then(|len| req.data.get_mut(..len))
                else {
                    return -(EINVAL as i64);
                };
                if op == BlockOp::Read {
                    self.read(position, buf)
                } else {
                    self.write(position, buf)
                }
            }
            BlockOp::Flush => self.flush(),
            BlockOp::Discard => self.discard(position, req.length),
            BlockOp::Zeroout => self.zeroout(position, req.length),
        }
    }
}
