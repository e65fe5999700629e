//! 错误处理模块：引擎错误码到 POSIX 错误种类的映射，以及对外暴露的错误记录类型。

use alloc::borrow::ToOwned;
use alloc::string::String;
use core::fmt;

use crate::consts::*;

/// 错误种类
///
/// 引擎返回的是负的 errno，调用方看到的是这里的符号化种类。
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// 路径不存在
    NotFound,
    /// 目标意外地是一个目录
    IsADirectory,
    /// 目标意外地不是目录
    NotADirectory,
    /// 文件描述符无效
    BadFileDescriptor,
    /// 权限不足
    PermissionDenied,
    /// 打开的文件过多
    TooManyOpenFiles,
    /// 目标已存在
    AlreadyExists,
    /// 参数无效
    InvalidInput,
    /// 输入输出错误（包括磁盘错误）
    Io,
    /// 内存不足
    NoMemory,
    /// 存储空间已满
    StorageFull,
    /// 目录非空
    DirectoryNotEmpty,
    /// 文件过大
    FileTooLarge,
    /// 设备或资源忙
    ResourceBusy,
    /// 链接过多（包括符号链接循环）
    TooManyLinks,
    /// 地址无效
    BadAddress,
    /// 只读文件系统
    ReadOnlyFilesystem,
    /// 文件名过长
    NameTooLong,
    /// 操作不被允许
    OperationNotPermitted,
    /// 操作不受支持
    Unsupported,
    /// 没有对应映射的错误码
    Unknown,
}

impl ErrorKind {
    /// 根据 errno 的绝对值查找错误种类，没有映射时返回 `Unknown`
    pub fn from_errno(errno: u32) -> Self {
        use ErrorKind::*;
        match errno as i32 {
            ENOENT | ENODATA => NotFound,
            EISDIR => IsADirectory,
            ENOTDIR => NotADirectory,
            EBADF => BadFileDescriptor,
            EACCES => PermissionDenied,
            EMFILE => TooManyOpenFiles,
            EEXIST => AlreadyExists,
            EINVAL => InvalidInput,
            EIO => Io,
            ENOMEM => NoMemory,
            ENOSPC => StorageFull,
            ENOTEMPTY => DirectoryNotEmpty,
            EFBIG => FileTooLarge,
            EBUSY => ResourceBusy,
            EMLINK | ELOOP => TooManyLinks,
            EFAULT => BadAddress,
            EROFS => ReadOnlyFilesystem,
            ENAMETOOLONG => NameTooLong,
            EPERM => OperationNotPermitted,
            ENOTSUP => Unsupported,
            _ => Unknown,
        }
    }

    /// 符号化的错误名（如 `"ENOENT"`）
    pub fn code(&self) -> &'static str {
        use ErrorKind::*;
        match *self {
            NotFound => "ENOENT",
            IsADirectory => "EISDIR",
            NotADirectory => "ENOTDIR",
            BadFileDescriptor => "EBADF",
            PermissionDenied => "EACCES",
            TooManyOpenFiles => "EMFILE",
            AlreadyExists => "EEXIST",
            InvalidInput => "EINVAL",
            Io => "EIO",
            NoMemory => "ENOMEM",
            StorageFull => "ENOSPC",
            DirectoryNotEmpty => "ENOTEMPTY",
            FileTooLarge => "EFBIG",
            ResourceBusy => "EBUSY",
            TooManyLinks => "EMLINK",
            BadAddress => "EFAULT",
            ReadOnlyFilesystem => "EROFS",
            NameTooLong => "ENAMETOOLONG",
            OperationNotPermitted => "EPERM",
            Unsupported => "ENOTSUP",
            Unknown => "UNKNOWN",
        }
    }

    /// 错误描述
    pub fn as_str(&self) -> &'static str {
        use ErrorKind::*;
        match *self {
            NotFound => "No such file or directory",
            IsADirectory => "Is a directory",
            NotADirectory => "Not a directory",
            BadFileDescriptor => "Bad file descriptor",
            PermissionDenied => "Permission denied",
            TooManyOpenFiles => "Too many open files",
            AlreadyExists => "File exists",
            InvalidInput => "Invalid argument",
            Io => "I/O error",
            NoMemory => "Out of memory",
            StorageFull => "No space left on device",
            DirectoryNotEmpty => "Directory not empty",
            FileTooLarge => "File too large",
            ResourceBusy => "Device or resource busy",
            TooManyLinks => "Too many links",
            BadAddress => "Bad address",
            ReadOnlyFilesystem => "Read-only file system",
            NameTooLong => "File name too long",
            OperationNotPermitted => "Operation not permitted",
            Unsupported => "Operation not supported",
            Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 错误记录：错误码、错误种类、出错的操作名以及原始参数
///
/// 构造后不可变。
#[derive(Clone, PartialEq, Eq)]
pub struct FsError {
    errno: u32,
    kind: ErrorKind,
    syscall: &'static str,
    args: String,
}

/// 文件系统操作的结果类型
pub type FsResult<T = ()> = Result<T, FsError>;

impl FsError {
    /// 创建新的错误记录，`errno` 的符号会被忽略（引擎返回的是负值）
    pub fn new(errno: i32, syscall: &'static str, args: impl Into<String>) -> Self {
        let errno = errno.unsigned_abs();
        Self {
            errno,
            kind: ErrorKind::from_errno(errno),
            syscall,
            args: args.into(),
        }
    }

    /// errno 的绝对值
    pub fn errno(&self) -> u32 {
        self.errno
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 符号化的错误名
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// 出错的操作名
    pub fn syscall(&self) -> &'static str {
        self.syscall
    }

    /// 调用时的参数（格式化后的文本）
    pub fn args(&self) -> &str {
        &self.args
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) args: {}",
            self.syscall,
            self.code(),
            self.errno,
            self.args
        )
    }
}

impl fmt::Debug for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl core::error::Error for FsError {}

#[cfg(feature = "std")]
impl From<FsError> for std::io::Error {
    fn from(err: FsError) -> Self {
        use std::io::ErrorKind as Io;
        let kind = match err.kind {
            ErrorKind::NotFound => Io::NotFound,
            ErrorKind::PermissionDenied | ErrorKind::OperationNotPermitted => Io::PermissionDenied,
            ErrorKind::AlreadyExists => Io::AlreadyExists,
            ErrorKind::InvalidInput => Io::InvalidInput,
            ErrorKind::NoMemory => Io::OutOfMemory,
            ErrorKind::Unsupported => Io::Unsupported,
            _ => Io::Other,
        };
        std::io::Error::new(kind, err)
    }
}

/// 为引擎的原始返回值添加上下文
///
/// 非负值原样返回，负值转换为错误记录。
pub trait Context {
    fn context(self, syscall: &'static str, args: &str) -> FsResult<u64>;
}

impl Context for i64 {
    fn context(self, syscall: &'static str, args: &str) -> FsResult<u64> {
        if self < EOK as i64 {
            Err(FsError::new(
                i32::try_from(self).unwrap_or(-EIO),
                syscall,
                args.to_owned(),
            ))
        } else {
            Ok(self as u64)
        }
    }
}

impl Context for i32 {
    fn context(self, syscall: &'static str, args: &str) -> FsResult<u64> {
        (self as i64).context(syscall, args)
    }
}
