//! 打开标志：引擎使用的数值编码，以及 `"r"`、`"w+"`、`"a"` 等符号形式的解析。

use bitflags::bitflags;

use crate::consts::*;

bitflags! {
    /// 打开文件时的标志位（数值与 Linux 一致）
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRONLY = O_WRONLY;
        const RDWR = O_RDWR;
        const CREAT = O_CREAT;
        const EXCL = O_EXCL;
        const NOCTTY = O_NOCTTY;
        const TRUNC = O_TRUNC;
        const APPEND = O_APPEND;
        const NONBLOCK = O_NONBLOCK;
        const DIRECT = O_DIRECT;
        const DIRECTORY = O_DIRECTORY;
        const NOFOLLOW = O_NOFOLLOW;
        const NOATIME = O_NOATIME;
        const SYNC = O_SYNC;
    }
}

impl OpenFlags {
    /// 只读（数值为 0）
    pub const RDONLY: Self = Self::empty();

    /// 解析符号形式的打开标志，无法识别时返回 `None`
    pub fn parse(flag: &str) -> Option<Self> {
        let flags = match flag {
            "r" => Self::RDONLY,
            "rs" | "sr" => Self::RDONLY | Self::SYNC,
            "r+" => Self::RDWR,
            "rs+" | "sr+" => Self::RDWR | Self::SYNC,

            "w" => Self::TRUNC | Self::CREAT | Self::WRONLY,
            "wx" | "xw" => Self::TRUNC | Self::CREAT | Self::WRONLY | Self::EXCL,
            "w+" => Self::TRUNC | Self::CREAT | Self::RDWR,
            "wx+" | "xw+" => Self::TRUNC | Self::CREAT | Self::RDWR | Self::EXCL,

            "a" => Self::APPEND | Self::CREAT | Self::WRONLY,
            "ax" | "xa" => Self::APPEND | Self::CREAT | Self::WRONLY | Self::EXCL,
            "a+" => Self::APPEND | Self::CREAT | Self::RDWR,
            "ax+" | "xa+" => Self::APPEND | Self::CREAT | Self::RDWR | Self::EXCL,

            _ => return None,
        };
        Some(flags)
    }

    /// 是否允许读
    pub fn is_readable(&self) -> bool {
        !self.contains(Self::WRONLY)
    }

    /// 是否允许写
    pub fn is_writable(&self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }
}

/// 可以转换为打开标志的类型：符号字符串、原始数值或 `OpenFlags` 本身
pub trait IntoOpenFlags {
    fn into_open_flags(self) -> Option<OpenFlags>;
}

impl IntoOpenFlags for OpenFlags {
    fn into_open_flags(self) -> Option<OpenFlags> {
        Some(self)
    }
}

impl IntoOpenFlags for u32 {
    fn into_open_flags(self) -> Option<OpenFlags> {
        Some(OpenFlags::from_bits_retain(self))
    }
}

impl IntoOpenFlags for &str {
    fn into_open_flags(self) -> Option<OpenFlags> {
        OpenFlags::parse(self)
    }
}
