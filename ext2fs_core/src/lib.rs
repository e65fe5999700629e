//! ext2fs-core: engine contract for the asynchronous ext2/3/4 bridge
//!
//! This crate defines what a filesystem engine must provide (the [`Engine`] trait),
//! how the engine talks to block storage ([`BlockIo`]), and the errno taxonomy
//! shared by everything that observes an engine return code.

#![cfg_attr(not(test), no_std)]

extern crate alloc;
#[cfg(all(feature = "std", not(test)))]
extern crate std;

// 公共模块
pub mod block;
pub mod consts;
pub mod engine;
pub mod error;
pub mod flags;

// 重新导出常用类型
pub use block::{BlockIo, BlockOp, BlockRequest};
pub use consts::*;
pub use engine::{c_str, Engine, HeapPtr, HostObjects, ObjectId, RawFile, RawFs, StatAttr};
pub use error::{Context, ErrorKind, FsError, FsResult};
pub use flags::{IntoOpenFlags, OpenFlags};
