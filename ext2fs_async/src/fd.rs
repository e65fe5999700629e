//! 文件描述符表：小整数 fd 到引擎文件句柄的映射。

use ext2fs_core::{OpenFlags, RawFile};

/// 文件描述符
pub type Fd = u32;

/// 一个打开的文件
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenFile {
    pub raw: RawFile,
    pub flags: OpenFlags,
}

/// 固定容量的 fd 表，新 fd 总是取最小的空闲编号
#[derive(Debug)]
pub struct FdTable {
    slots: Vec<Option<OpenFile>>,
    capacity: usize,
}

impl FdTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity,
        }
    }

    /// 登记打开的文件，表满时返回 `None`
    pub fn insert(&mut self, file: OpenFile) -> Option<Fd> {
        let index = match self.slots.iter().position(Option::is_none) {
            Some(index) => index,
            None if self.slots.len() < self.capacity => {
                self.slots.push(None);
                self.slots.len() - 1
            }
            None => return None,
        };
        self.slots[index] = Some(file);
        Some(index as Fd)
    }

    pub fn get(&self, fd: Fd) -> Option<OpenFile> {
        self.slots.get(fd as usize).copied().flatten()
    }

    pub fn remove(&mut self, fd: Fd) -> Option<OpenFile> {
        let file = self.slots.get_mut(fd as usize)?.take();
        // 收缩尾部空槽
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        file
    }

    /// 打开的 fd 数量
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// 所有打开的 fd，按升序排列
    pub fn fds(&self) -> Vec<Fd> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| i as Fd)
            .collect()
    }
}
