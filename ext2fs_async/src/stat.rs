//! 文件状态信息

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ext2fs_core::*;

/// `stat` 返回的文件状态
///
/// 时间戳为毫秒，由引擎的秒级时间戳乘以 1000 得到；创建时间取状态修改时间。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// 设备号（单镜像挂载，恒为 0）
    pub dev: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    /// 特殊设备号（恒为 0）
    pub rdev: u64,
    pub blksize: u64,
    pub ino: u64,
    pub size: u64,
    /// 分配的 512B 块数量
    pub blocks: u64,
    pub atime_ms: u64,
    pub mtime_ms: u64,
    pub ctime_ms: u64,
    pub birthtime_ms: u64,
}

impl Stats {
    /// 文件类型位
    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    /// 权限位
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == S_IFREG
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == S_IFLNK
    }

    pub fn is_block_device(&self) -> bool {
        self.file_type() == S_IFBLK
    }

    pub fn is_char_device(&self) -> bool {
        self.file_type() == S_IFCHR
    }

    pub fn is_fifo(&self) -> bool {
        self.file_type() == S_IFIFO
    }

    pub fn is_socket(&self) -> bool {
        self.file_type() == S_IFSOCK
    }

    pub fn accessed(&self) -> SystemTime {
        to_system_time(self.atime_ms)
    }

    pub fn modified(&self) -> SystemTime {
        to_system_time(self.mtime_ms)
    }

    pub fn changed(&self) -> SystemTime {
        to_system_time(self.ctime_ms)
    }

    pub fn created(&self) -> SystemTime {
        to_system_time(self.birthtime_ms)
    }
}

fn to_system_time(ms: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms)
}
