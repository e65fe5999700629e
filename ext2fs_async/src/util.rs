//! 工具函数模块：参数校验以及组合操作的错误合并。

use ext2fs_core::{FsError, FsResult, EINVAL, ENOENT};

/// 校验并规范化路径
///
/// 含 NUL 字节或为空的路径以 ENOENT 拒绝；去掉末尾的 `/`（根目录 `/` 保持不变）。
pub fn validate_path(path: &str, syscall: &'static str, args: &str) -> FsResult<String> {
    if path.is_empty() || path.as_bytes().contains(&0) {
        return Err(FsError::new(ENOENT, syscall, args));
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok("/".to_owned())
    } else {
        Ok(trimmed.to_owned())
    }
}

/// 校验 `[offset, offset + length)` 落在长度为 `len` 的缓冲区内
pub fn check_range(
    len: usize,
    offset: usize,
    length: usize,
    syscall: &'static str,
    args: &str,
) -> FsResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= len => Ok(()),
        _ => Err(FsError::new(EINVAL, syscall, args)),
    }
}

/// 文件位置参数：`None` 表示使用文件当前位置（引擎约定为 -1）
pub fn position_arg(position: Option<u64>, syscall: &'static str, args: &str) -> FsResult<i64> {
    match position {
        None => Ok(-1),
        Some(pos) => i64::try_from(pos).map_err(|_| FsError::new(EINVAL, syscall, args)),
    }
}

/// 合并主操作和清理操作的结果，主操作的错误优先
pub fn finish<T>(primary: FsResult<T>, cleanup: FsResult<()>) -> FsResult<T> {
    match (primary, cleanup) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(cleanup)) => {
            warn!("cleanup after {} failed: {cleanup}", err.syscall());
            Err(err)
        }
    }
}
