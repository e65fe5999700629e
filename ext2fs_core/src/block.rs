//! 块请求：引擎在执行过程中向外发出的块级 I/O 请求。
//!
//! 引擎只看到 [`BlockIo`]，请求如何被满足（转发到外部磁盘、加上挂载偏移等）由实现方决定。

use core::fmt;

use crate::consts::*;

/// 块请求类型
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockOp {
    Open = E2FS_BLK_OPEN,
    Close = E2FS_BLK_CLOSE,
    Read = E2FS_BLK_READ,
    Write = E2FS_BLK_WRITE,
    Flush = E2FS_BLK_FLUSH,
    Discard = E2FS_BLK_DISCARD,
    CacheReadahead = E2FS_BLK_CACHE_READAHEAD,
    Zeroout = E2FS_BLK_ZEROOUT,
}

impl TryFrom<u16> for BlockOp {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Ok(match value {
            E2FS_BLK_OPEN => BlockOp::Open,
            E2FS_BLK_CLOSE => BlockOp::Close,
            E2FS_BLK_READ => BlockOp::Read,
            E2FS_BLK_WRITE => BlockOp::Write,
            E2FS_BLK_FLUSH => BlockOp::Flush,
            E2FS_BLK_DISCARD => BlockOp::Discard,
            E2FS_BLK_CACHE_READAHEAD => BlockOp::CacheReadahead,
            E2FS_BLK_ZEROOUT => BlockOp::Zeroout,
            other => return Err(other),
        })
    }
}

/// 一次块请求
///
/// `offset` 是相对于文件系统镜像起始位置的字节偏移。
/// READ 时 `data` 是目标缓冲区，WRITE 时是源数据；其余类型 `data` 为空。
pub struct BlockRequest<'a> {
    /// 请求类型码，见 [`BlockOp`]
    pub op: u16,
    /// 镜像内的字节偏移
    pub offset: u64,
    /// 请求涉及的字节数
    pub length: u64,
    /// 数据缓冲区
    pub data: &'a mut [u8],
}

impl<'a> BlockRequest<'a> {
    /// 不带数据的请求（OPEN/CLOSE/FLUSH/DISCARD/CACHE_READAHEAD/ZEROOUT）
    pub fn control(op: BlockOp, offset: u64, length: u64) -> Self {
        Self {
            op: op as u16,
            offset,
            length,
            data: &mut [],
        }
    }

    /// 读请求，读取 `data.len()` 字节
    pub fn read(offset: u64, data: &'a mut [u8]) -> Self {
        Self {
            op: BlockOp::Read as u16,
            offset,
            length: data.len() as u64,
            data,
        }
    }

    /// 写请求，写入 `data` 的全部内容
    pub fn write(offset: u64, data: &'a mut [u8]) -> Self {
        Self {
            op: BlockOp::Write as u16,
            offset,
            length: data.len() as u64,
            data,
        }
    }
}

impl fmt::Debug for BlockRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRequest")
            .field("op", &self.op)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("data_len", &self.data.len())
            .finish()
    }
}

/// 引擎侧的块 I/O 接口
///
/// 每个请求都必须得到回答：非负返回值表示处理的字节数（无数据请求返回 0），
/// 负值为 `-errno`。调用是同步的，引擎在请求返回前不会继续执行。
pub trait BlockIo: Send {
    fn request(&mut self, req: BlockRequest<'_>) -> i64;
}
