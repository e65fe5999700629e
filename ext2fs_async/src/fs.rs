//! 文件系统核心模块：引擎生命周期管理以及 POSIX 风格的调用面。
//!
//! [`Ext2`] 拥有引擎：第一次挂载时启动网关线程并把引擎交给它，最后一次卸载时停止线程
//! 并取回引擎。每次挂载得到一个 [`FileSystem`]，它持有挂载句柄、磁盘视图和 fd 表，
//! 所有操作都作为网关任务在引擎线程上执行。

use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ext2fs_core::*;
use tokio::runtime::Handle;

use crate::disk::Disk;
use crate::fd::{Fd, FdTable, OpenFile};
use crate::gateway::Gateway;
use crate::handle::FileHandle;
use crate::router::{BlockRouter, DiskRef};
use crate::scope::Scope;
use crate::stat::Stats;
use crate::util::{check_range, finish, position_arg, validate_path};

/// `read_file` 每次读取的字节数
const READ_CHUNK: usize = 64 * 1024;

/// 新建文件的默认权限
const DEFAULT_FILE_MODE: u32 = 0o666;

/// 文件系统配置参数
#[derive(Debug, Clone)]
pub struct FsConfig {
    pub max_open_files: usize, // 每个挂载的 fd 表容量
    pub thread_name: String,   // 引擎线程名
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            max_open_files: 1024,
            thread_name: "ext2fs-engine".to_owned(),
        }
    }
}

struct HostState {
    engine: Option<Box<dyn Engine>>,
    gateway: Option<Arc<Gateway>>,
    mounts: usize,
}

struct EngineHost {
    config: FsConfig,
    state: tokio::sync::Mutex<HostState>,
}

/// 引擎生命周期对象
///
/// 可以被克隆，克隆体共享同一个引擎。
#[derive(Clone)]
pub struct Ext2 {
    host: Arc<EngineHost>,
}

impl Ext2 {
    pub fn new<E: Engine>(engine: E) -> Self {
        Self::with_config(engine, FsConfig::default())
    }

    pub fn with_config<E: Engine>(engine: E, config: FsConfig) -> Self {
        Self {
            host: Arc::new(EngineHost {
                config,
                state: tokio::sync::Mutex::new(HostState {
                    engine: Some(Box::new(engine)),
                    gateway: None,
                    mounts: 0,
                }),
            }),
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.host.config
    }

    /// 当前挂载数量
    pub async fn mounts(&self) -> usize {
        self.host.state.lock().await.mounts
    }

    /// 引擎线程是否在运行
    pub async fn is_running(&self) -> bool {
        self.host.state.lock().await.gateway.is_some()
    }

    /// 在没有任何挂载时取回引擎
    pub async fn into_engine(self) -> Option<Box<dyn Engine>> {
        let mut state = self.host.state.lock().await;
        if state.mounts > 0 {
            return None;
        }
        state.engine.take()
    }

    /// 挂载 `disk` 上从 `offset` 字节开始的文件系统镜像
    ///
    /// 必须在 tokio 运行时内调用：引擎线程通过运行时句柄驱动磁盘操作。
    pub async fn mount(&self, disk: Arc<dyn Disk>, offset: u64) -> FsResult<FileSystem> {
        let args = format!("[offset={offset}]");
        let rt = Handle::try_current().map_err(|err| {
            error!("mount outside of a tokio runtime: {err}");
            FsError::new(EINVAL, "mount", args.as_str())
        })?;

        let mut state = self.host.state.lock().await;
        let gateway = match state.gateway.clone() {
            Some(gateway) => gateway,
            None => {
                let engine = state
                    .engine
                    .take()
                    .ok_or_else(|| FsError::new(EBUSY, "mount", args.as_str()))?;
                match Gateway::start(engine, &self.host.config.thread_name) {
                    Ok(gateway) => Arc::new(gateway),
                    Err((err, engine)) => {
                        state.engine = Some(engine);
                        error!("failed to start engine thread: {err}");
                        let errno = err.raw_os_error().unwrap_or(EIO);
                        return Err(FsError::new(errno, "mount", args));
                    }
                }
            }
        };

        let target = DiskRef::new(disk, offset);
        let router = BlockRouter::new(target.clone(), rt);
        // 挂载时的 panic 在引擎线程上就地捕获，先停掉新启动的网关再重新抛出
        let mounted = gateway
            .scoped("mount", args, move |scope| {
                let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                    scope.engine().mount(Box::new(router))
                }));
                Ok(caught.map(|rc| scope.check(rc).map(RawFs)))
            })
            .await;
        let mounted = match mounted {
            Ok(Ok(mounted)) => mounted,
            Ok(Err(payload)) => {
                if state.mounts == 0 {
                    Self::stop(&mut state, &gateway).await;
                }
                drop(state);
                panic::resume_unwind(payload)
            }
            Err(err) => Err(err),
        };

        match mounted {
            Ok(raw) => {
                state.mounts += 1;
                state.gateway = Some(gateway.clone());
                debug!("mounted {raw:?} at offset {offset} ({} mounts)", state.mounts);
                Ok(FileSystem {
                    mount: Arc::new(MountState {
                        raw,
                        fds: Mutex::new(FdTable::new(self.host.config.max_open_files)),
                        mounted: AtomicBool::new(true),
                    }),
                    gateway,
                    host: self.host.clone(),
                    target,
                })
            }
            Err(err) => {
                if state.mounts == 0 {
                    Self::stop(&mut state, &gateway).await;
                }
                Err(err)
            }
        }
    }

    /// 卸载文件系统
    ///
    /// 先关闭所有仍然打开的 fd，再卸载；卸载失败时文件系统保持挂载状态。
    pub async fn umount(&self, fs: &FileSystem) -> FsResult<()> {
        let args = format!("[{:?}]", fs.mount.raw);
        if !Arc::ptr_eq(&self.host, &fs.host) {
            return Err(FsError::new(EINVAL, "umount", args));
        }
        let mut state = self.host.state.lock().await;
        fs.ensure_mounted("umount", &args)?;

        let mount = fs.mount.clone();
        fs.gateway
            .scoped("umount", args, move |scope| {
                if !mount.is_mounted() {
                    return Err(scope.error(EBADF));
                }
                mount.close_all(scope);
                let rc = scope.engine().umount(mount.raw);
                scope.check(rc)?;
                mount.mounted.store(false, Ordering::SeqCst);
                Ok(())
            })
            .await?;

        state.mounts -= 1;
        debug!("unmounted {:?} ({} mounts)", fs.mount.raw, state.mounts);
        if state.mounts == 0 {
            Self::stop(&mut state, &fs.gateway).await;
        }
        Ok(())
    }

    /// 挂载、执行 `f`、卸载；无论 `f` 是否成功都会卸载，`f` 的错误优先
    pub async fn with_mounted_disk<T, F, Fut>(
        &self,
        disk: Arc<dyn Disk>,
        offset: u64,
        f: F,
    ) -> FsResult<T>
    where
        F: FnOnce(FileSystem) -> Fut,
        Fut: Future<Output = FsResult<T>>,
    {
        let fs = self.mount(disk, offset).await?;
        let result = f(fs.clone()).await;
        let unmounted = self.umount(&fs).await;
        finish(result, unmounted)
    }

    async fn stop(state: &mut HostState, gateway: &Gateway) {
        match gateway.shutdown().await {
            Some(engine) => state.engine = Some(engine),
            None => error!("engine lost while stopping the gateway"),
        }
        state.gateway = None;
    }
}

impl fmt::Debug for Ext2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ext2")
            .field("config", &self.host.config)
            .finish_non_exhaustive()
    }
}

/// 一次挂载的共享状态，网关任务通过它访问挂载句柄和 fd 表
struct MountState {
    raw: RawFs,
    fds: Mutex<FdTable>,
    mounted: AtomicBool,
}

impl MountState {
    /// fd 表的锁只在表操作期间持有，不跨越引擎调用
    fn fds(&self) -> MutexGuard<'_, FdTable> {
        self.fds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn file(&self, scope: &Scope<'_>, fd: Fd) -> FsResult<OpenFile> {
        self.fds().get(fd).ok_or_else(|| scope.error(EBADF))
    }

    fn open(&self, scope: &mut Scope<'_>, path: &str, flags: OpenFlags, mode: u32) -> FsResult<Fd> {
        if self.fds().is_full() {
            return Err(scope.error(EMFILE));
        }
        let p = scope.alloc_c_str(path.as_bytes())?;
        let rc = scope.engine().open(self.raw, p, flags.bits(), mode);
        let raw = RawFile(scope.check(rc)?);
        let inserted = self.fds().insert(OpenFile { raw, flags });
        match inserted {
            Some(fd) => Ok(fd),
            None => {
                let rc = scope.engine().close(raw);
                if rc < 0 {
                    warn!("failed to close {raw:?} after fd table overflow: {rc}");
                }
                Err(scope.error(EMFILE))
            }
        }
    }

    fn close(&self, scope: &mut Scope<'_>, fd: Fd) -> FsResult<()> {
        let file = self.file(scope, fd)?;
        let rc = scope.engine().close(file.raw);
        scope.check(rc)?;
        self.fds().remove(fd);
        Ok(())
    }

    /// 关闭所有 fd；关闭失败的 fd 也会从表中移除
    fn close_all(&self, scope: &mut Scope<'_>) {
        let fds = self.fds().fds();
        for fd in fds {
            if let Err(err) = self.close(&mut scope.child("close", format!("[{fd}]")), fd) {
                warn!("failed to close fd {fd}: {err}");
                self.fds().remove(fd);
            }
        }
    }

    fn read(&self, scope: &mut Scope<'_>, fd: Fd, length: usize, position: i64) -> FsResult<Vec<u8>> {
        let file = self.file(scope, fd)?;
        let buf = scope.alloc_buffer(length)?;
        let rc = scope
            .engine()
            .read(file.raw, file.flags.bits(), buf, length, position);
        let n = (scope.check(rc)? as usize).min(length);
        Ok(scope.buffer_mut(buf)[..n].to_vec())
    }

    fn write(&self, scope: &mut Scope<'_>, fd: Fd, data: &[u8], position: i64) -> FsResult<usize> {
        let file = self.file(scope, fd)?;
        let buf = scope.alloc_bytes(data)?;
        let rc = scope
            .engine()
            .write(file.raw, file.flags.bits(), buf, data.len(), position);
        Ok((scope.check(rc)? as usize).min(data.len()))
    }

    fn fstat(&self, scope: &mut Scope<'_>, fd: Fd) -> FsResult<Stats> {
        let file = self.file(scope, fd)?;
        let mut get = |attr| {
            let rc = scope.engine().stat_attr(file.raw, attr);
            scope.check(rc)
        };
        let mode = get(StatAttr::Mode)? as u32;
        let nlink = get(StatAttr::LinksCount)?;
        let uid = get(StatAttr::Uid)? as u32;
        let gid = get(StatAttr::Gid)? as u32;
        let blksize = get(StatAttr::BlockSize)?;
        let ino = get(StatAttr::Ino)?;
        let size = get(StatAttr::Size)?;
        let blocks = get(StatAttr::Blocks)?;
        let atime = get(StatAttr::Atime)?;
        let mtime = get(StatAttr::Mtime)?;
        let ctime = get(StatAttr::Ctime)?;
        Ok(Stats {
            dev: 0,
            mode,
            nlink,
            uid,
            gid,
            rdev: 0,
            blksize,
            ino,
            size,
            blocks,
            atime_ms: atime * 1000,
            mtime_ms: mtime * 1000,
            ctime_ms: ctime * 1000,
            birthtime_ms: ctime * 1000,
        })
    }

    fn fchmod(&self, scope: &mut Scope<'_>, fd: Fd, mode: u32) -> FsResult<()> {
        let file = self.file(scope, fd)?;
        let rc = scope.engine().chmod(file.raw, mode);
        scope.check(rc).map(drop)
    }

    fn fchown(&self, scope: &mut Scope<'_>, fd: Fd, uid: u32, gid: u32) -> FsResult<()> {
        let file = self.file(scope, fd)?;
        let rc = scope.engine().chown(file.raw, uid, gid);
        scope.check(rc).map(drop)
    }

    /// 打开 `path`，对得到的 fd 执行 `f`，然后关闭；关闭总会执行
    fn with_path_fd<T>(
        &self,
        scope: &mut Scope<'_>,
        path: &str,
        flags: OpenFlags,
        f: impl FnOnce(&Self, &mut Scope<'_>, Fd) -> FsResult<T>,
    ) -> FsResult<T> {
        let args = format!("[{path:?}, {:#o}]", flags.bits());
        let fd = self.open(&mut scope.child("open", args), path, flags, 0)?;
        let result = f(self, &mut *scope, fd);
        let closed = self.close(&mut scope.child("close", format!("[{fd}]")), fd);
        finish(result, closed)
    }

    fn stat_path(&self, scope: &mut Scope<'_>, path: &str, flags: OpenFlags) -> FsResult<Stats> {
        self.with_path_fd(scope, path, flags, |mount, scope, fd| {
            mount.fstat(&mut scope.child("fstat", format!("[{fd}]")), fd)
        })
    }

    /// 单路径的引擎调用
    fn path_call(
        &self,
        scope: &mut Scope<'_>,
        path: &str,
        f: impl FnOnce(&mut dyn Engine, RawFs, HeapPtr) -> i32,
    ) -> FsResult<()> {
        let p = scope.alloc_c_str(path.as_bytes())?;
        let rc = f(scope.engine(), self.raw, p);
        scope.check(rc).map(drop)
    }

    /// 双路径的引擎调用
    fn paths_call(
        &self,
        scope: &mut Scope<'_>,
        first: &str,
        second: &str,
        f: impl FnOnce(&mut dyn Engine, RawFs, HeapPtr, HeapPtr) -> i32,
    ) -> FsResult<()> {
        let a = scope.alloc_c_str(first.as_bytes())?;
        let b = scope.alloc_c_str(second.as_bytes())?;
        let rc = f(scope.engine(), self.raw, a, b);
        scope.check(rc).map(drop)
    }

    /// 通过宿主对象回调收集字节串
    fn collect(
        &self,
        scope: &mut Scope<'_>,
        path: &str,
        f: impl FnOnce(&mut dyn Engine, RawFs, HeapPtr, ObjectId, &mut dyn HostObjects) -> i32,
    ) -> FsResult<Vec<Vec<u8>>> {
        let p = scope.alloc_c_str(path.as_bytes())?;
        let out = scope.register(Vec::<Vec<u8>>::new());
        let raw = self.raw;
        let rc = scope.with_host(|engine, host| f(engine, raw, p, out, host));
        scope.check(rc)?;
        Ok(scope.take::<Vec<Vec<u8>>>(out).unwrap_or_default())
    }
}

/// 一个已挂载的文件系统
///
/// 可以被克隆，克隆体共享同一个挂载和 fd 表。
#[derive(Clone)]
pub struct FileSystem {
    mount: Arc<MountState>,
    gateway: Arc<Gateway>,
    host: Arc<EngineHost>,
    target: DiskRef,
}

impl fmt::Debug for FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSystem")
            .field("raw", &self.mount.raw)
            .field("offset", &self.target.offset())
            .field("mounted", &self.is_mounted())
            .field("open_files", &self.open_files())
            .finish()
    }
}

impl FileSystem {
    /// 镜像在磁盘上的起始偏移
    pub fn offset(&self) -> u64 {
        self.target.offset()
    }

    pub fn disk(&self) -> &Arc<dyn Disk> {
        self.target.disk()
    }

    pub fn is_mounted(&self) -> bool {
        self.mount.is_mounted()
    }

    /// 打开的 fd 数量
    pub fn open_files(&self) -> usize {
        self.mount.fds().len()
    }

    /// 打开的 fd，按升序排列
    pub fn open_fds(&self) -> Vec<Fd> {
        self.mount.fds().fds()
    }

    /// 网关上排队或正在执行的调用数（所有挂载共享同一个网关）
    pub fn pending_calls(&self) -> usize {
        self.gateway.pending()
    }

    fn ensure_mounted(&self, syscall: &'static str, args: &str) -> FsResult<()> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(FsError::new(EBADF, syscall, args))
        }
    }

    /// 在网关上以新作用域执行 `body`
    async fn run<T, F>(&self, syscall: &'static str, args: String, body: F) -> FsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Scope<'_>, &MountState) -> FsResult<T> + Send + 'static,
    {
        self.ensure_mounted(syscall, &args)?;
        let mount = self.mount.clone();
        self.gateway
            .scoped(syscall, args, move |scope| {
                // 卸载可能排在本任务之前
                if !mount.is_mounted() {
                    return Err(scope.error(EBADF));
                }
                body(scope, &mount)
            })
            .await
    }

    /// 打开文件
    ///
    /// `flags` 可以是 `"r"`、`"w+"` 这样的符号形式、原始数值或 [`OpenFlags`]。
    pub async fn open(
        &self,
        path: &str,
        flags: impl IntoOpenFlags + fmt::Debug,
        mode: u32,
    ) -> FsResult<Fd> {
        let args = format!("[{path:?}, {flags:?}, {mode:#o}]");
        let flags = flags
            .into_open_flags()
            .ok_or_else(|| FsError::new(EINVAL, "open", args.as_str()))?;
        let path = validate_path(path, "open", &args)?;
        self.run("open", args, move |scope, mount| {
            mount.open(scope, &path, flags, mode)
        })
        .await
    }

    /// 打开文件并包装为 [`FileHandle`]
    pub async fn open_handle(
        &self,
        path: &str,
        flags: impl IntoOpenFlags + fmt::Debug,
        mode: u32,
    ) -> FsResult<FileHandle> {
        let fd = self.open(path, flags, mode).await?;
        Ok(FileHandle::new(self.clone(), fd))
    }

    pub async fn close(&self, fd: Fd) -> FsResult<()> {
        self.run("close", format!("[{fd}]"), move |scope, mount| {
            mount.close(scope, fd)
        })
        .await
    }

    /// 关闭所有打开的 fd（卸载前的兜底清理）
    pub async fn close_all_file_descriptors(&self) -> FsResult<()> {
        self.run("close_all", String::new(), |scope, mount| {
            mount.close_all(scope);
            Ok(())
        })
        .await
    }

    /// 读取到 `buffer[offset..offset + length]`，返回读取的字节数
    ///
    /// `position` 为 `None` 时从文件当前位置读取并推进位置。
    pub async fn read(
        &self,
        fd: Fd,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
        position: Option<u64>,
    ) -> FsResult<usize> {
        let args = format!("[{fd}, {offset}, {length}, {position:?}]");
        check_range(buffer.len(), offset, length, "read", &args)?;
        let position = position_arg(position, "read", &args)?;
        if length == 0 {
            return self.check_fd(fd, "read", args);
        }
        let data = self
            .run("read", args, move |scope, mount| {
                mount.read(scope, fd, length, position)
            })
            .await?;
        buffer[offset..offset + data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// 写入 `buffer[offset..offset + length]`，返回写入的字节数
    pub async fn write(
        &self,
        fd: Fd,
        buffer: &[u8],
        offset: usize,
        length: usize,
        position: Option<u64>,
    ) -> FsResult<usize> {
        let args = format!("[{fd}, {offset}, {length}, {position:?}]");
        check_range(buffer.len(), offset, length, "write", &args)?;
        let position = position_arg(position, "write", &args)?;
        if length == 0 {
            return self.check_fd(fd, "write", args);
        }
        let data = buffer[offset..offset + length].to_vec();
        self.run("write", args, move |scope, mount| {
            mount.write(scope, fd, &data, position)
        })
        .await
    }

    /// 零长度读写不进入引擎，只校验 fd
    fn check_fd(&self, fd: Fd, syscall: &'static str, args: String) -> FsResult<usize> {
        self.ensure_mounted(syscall, &args)?;
        match self.mount.fds().get(fd) {
            Some(_) => Ok(0),
            None => Err(FsError::new(EBADF, syscall, args)),
        }
    }

    pub async fn fstat(&self, fd: Fd) -> FsResult<Stats> {
        self.run("fstat", format!("[{fd}]"), move |scope, mount| {
            mount.fstat(scope, fd)
        })
        .await
    }

    /// 查询文件状态（跟随符号链接）
    pub async fn stat(&self, path: &str) -> FsResult<Stats> {
        self.stat_with("stat", path, OpenFlags::RDONLY).await
    }

    /// 查询文件状态（不跟随符号链接）
    pub async fn lstat(&self, path: &str) -> FsResult<Stats> {
        self.stat_with("lstat", path, OpenFlags::NOFOLLOW).await
    }

    async fn stat_with(&self, syscall: &'static str, path: &str, flags: OpenFlags) -> FsResult<Stats> {
        let args = format!("[{path:?}]");
        let path = validate_path(path, syscall, &args)?;
        self.run(syscall, args, move |scope, mount| {
            mount.stat_path(scope, &path, flags)
        })
        .await
    }

    /// 路径是否存在
    pub async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// 检查访问权限
    ///
    /// 引擎总是允许读写，只有执行位需要检查。
    pub async fn access(&self, path: &str, mode: u32) -> FsResult<()> {
        let args = format!("[{path:?}, {mode:#o}]");
        let path = validate_path(path, "access", &args)?;
        self.run("access", args, move |scope, mount| {
            let stats = mount.stat_path(scope, &path, OpenFlags::RDONLY)?;
            if mode & X_OK != 0 && stats.mode & (S_IXUSR | S_IXGRP | S_IXOTH) == 0 {
                return Err(scope.error(EACCES));
            }
            Ok(())
        })
        .await
    }

    pub async fn fchmod(&self, fd: Fd, mode: u32) -> FsResult<()> {
        self.run("fchmod", format!("[{fd}, {mode:#o}]"), move |scope, mount| {
            mount.fchmod(scope, fd, mode)
        })
        .await
    }

    pub async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.chmod_with("chmod", path, OpenFlags::RDONLY, mode).await
    }

    /// 修改符号链接本身的权限
    pub async fn lchmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.chmod_with("lchmod", path, OpenFlags::NOFOLLOW, mode).await
    }

    async fn chmod_with(
        &self,
        syscall: &'static str,
        path: &str,
        flags: OpenFlags,
        mode: u32,
    ) -> FsResult<()> {
        let args = format!("[{path:?}, {mode:#o}]");
        let path = validate_path(path, syscall, &args)?;
        self.run(syscall, args, move |scope, mount| {
            mount.with_path_fd(scope, &path, flags, |mount, scope, fd| {
                mount.fchmod(&mut scope.child("fchmod", format!("[{fd}, {mode:#o}]")), fd, mode)
            })
        })
        .await
    }

    pub async fn fchown(&self, fd: Fd, uid: u32, gid: u32) -> FsResult<()> {
        self.run("fchown", format!("[{fd}, {uid}, {gid}]"), move |scope, mount| {
            mount.fchown(scope, fd, uid, gid)
        })
        .await
    }

    pub async fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        self.chown_with("chown", path, OpenFlags::RDONLY, uid, gid).await
    }

    /// 修改符号链接本身的属主
    pub async fn lchown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        self.chown_with("lchown", path, OpenFlags::NOFOLLOW, uid, gid).await
    }

    async fn chown_with(
        &self,
        syscall: &'static str,
        path: &str,
        flags: OpenFlags,
        uid: u32,
        gid: u32,
    ) -> FsResult<()> {
        let args = format!("[{path:?}, {uid}, {gid}]");
        let path = validate_path(path, syscall, &args)?;
        self.run(syscall, args, move |scope, mount| {
            mount.with_path_fd(scope, &path, flags, |mount, scope, fd| {
                let args = format!("[{fd}, {uid}, {gid}]");
                mount.fchown(&mut scope.child("fchown", args), fd, uid, gid)
            })
        })
        .await
    }

    pub async fn mkdir(&self, path: &str, mode: u32) -> FsResult<()> {
        let args = format!("[{path:?}, {mode:#o}]");
        let path = validate_path(path, "mkdir", &args)?;
        self.run("mkdir", args, move |scope, mount| {
            mount.path_call(scope, &path, |engine, fs, p| engine.mkdir(fs, p, mode))
        })
        .await
    }

    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        let args = format!("[{path:?}]");
        let path = validate_path(path, "rmdir", &args)?;
        self.run("rmdir", args, move |scope, mount| {
            mount.path_call(scope, &path, |engine, fs, p| engine.rmdir(fs, p))
        })
        .await
    }

    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        let args = format!("[{path:?}]");
        let path = validate_path(path, "unlink", &args)?;
        self.run("unlink", args, move |scope, mount| {
            mount.path_call(scope, &path, |engine, fs, p| engine.unlink(fs, p))
        })
        .await
    }

    pub async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let args = format!("[{from:?}, {to:?}]");
        let from = validate_path(from, "rename", &args)?;
        let to = validate_path(to, "rename", &args)?;
        self.run("rename", args, move |scope, mount| {
            mount.paths_call(scope, &from, &to, |engine, fs, a, b| engine.rename(fs, a, b))
        })
        .await
    }

    /// 为 `existing` 创建硬链接 `new_path`
    pub async fn link(&self, existing: &str, new_path: &str) -> FsResult<()> {
        let args = format!("[{existing:?}, {new_path:?}]");
        let existing = validate_path(existing, "link", &args)?;
        let new_path = validate_path(new_path, "link", &args)?;
        self.run("link", args, move |scope, mount| {
            mount.paths_call(scope, &existing, &new_path, |engine, fs, a, b| {
                engine.link(fs, a, b)
            })
        })
        .await
    }

    /// 在 `path` 处创建指向 `target` 的符号链接
    pub async fn symlink(&self, target: &str, path: &str) -> FsResult<()> {
        let args = format!("[{target:?}, {path:?}]");
        let target = validate_path(target, "symlink", &args)?;
        let path = validate_path(path, "symlink", &args)?;
        self.run("symlink", args, move |scope, mount| {
            mount.paths_call(scope, &target, &path, |engine, fs, t, p| {
                engine.symlink(fs, t, p)
            })
        })
        .await
    }

    /// 读取符号链接的目标
    pub async fn readlink(&self, path: &str) -> FsResult<String> {
        let args = format!("[{path:?}]");
        let path = validate_path(path, "readlink", &args)?;
        let target = self
            .run("readlink", args, move |scope, mount| {
                mount.collect(scope, &path, |engine, fs, p, out, host| {
                    engine.readlink(fs, p, out, host)
                })
            })
            .await?;
        Ok(target
            .into_iter()
            .next()
            .map(|t| String::from_utf8_lossy(&t).into_owned())
            .unwrap_or_default())
    }

    /// 列出目录（不含 `.` 和 `..`），名字按有损 UTF-8 解码
    pub async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let names = self.readdir_bytes(path).await?;
        Ok(names
            .iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect())
    }

    /// 列出目录，返回原始字节形式的名字
    pub async fn readdir_bytes(&self, path: &str) -> FsResult<Vec<Vec<u8>>> {
        let args = format!("[{path:?}]");
        let path = validate_path(path, "readdir", &args)?;
        self.run("readdir", args, move |scope, mount| {
            mount.collect(scope, &path, |engine, fs, p, out, host| {
                engine.readdir(fs, p, out, host)
            })
        })
        .await
    }

    /// 把当前空闲的区域通过 DISCARD 告知磁盘
    pub async fn trim(&self) -> FsResult<()> {
        self.run("trim", String::new(), |scope, mount| {
            let rc = scope.engine().trim(mount.raw);
            scope.check(rc).map(drop)
        })
        .await
    }

    /// 读取整个文件
    pub async fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let args = format!("[{path:?}]");
        let path = validate_path(path, "read_file", &args)?;
        self.run("read_file", args, move |scope, mount| {
            mount.with_path_fd(scope, &path, OpenFlags::RDONLY, |mount, scope, fd| {
                let mut data = Vec::new();
                loop {
                    let args = format!("[{fd}, {READ_CHUNK}]");
                    let chunk = mount.read(&mut scope.child("read", args), fd, READ_CHUNK, -1)?;
                    if chunk.is_empty() {
                        break;
                    }
                    data.extend_from_slice(&chunk);
                }
                Ok(data)
            })
        })
        .await
    }

    /// 以 `data` 替换文件内容（不存在时创建）
    pub async fn write_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let flags = OpenFlags::TRUNC | OpenFlags::CREAT | OpenFlags::WRONLY;
        self.put_file("write_file", path, data, flags).await
    }

    /// 在文件末尾追加 `data`（不存在时创建）
    pub async fn append_file(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let flags = OpenFlags::APPEND | OpenFlags::CREAT | OpenFlags::WRONLY;
        self.put_file("append_file", path, data, flags).await
    }

    async fn put_file(
        &self,
        syscall: &'static str,
        path: &str,
        data: &[u8],
        flags: OpenFlags,
    ) -> FsResult<()> {
        let args = format!("[{path:?}, <{} bytes>]", data.len());
        let path = validate_path(path, syscall, &args)?;
        let data = data.to_vec();
        self.run(syscall, args, move |scope, mount| {
            let args = format!("[{path:?}, {:#o}]", flags.bits());
            let fd = mount.open(&mut scope.child("open", args), &path, flags, DEFAULT_FILE_MODE)?;
            let mut written = 0;
            let result = loop {
                if written == data.len() {
                    break Ok(());
                }
                let remaining = data.len() - written;
                let args = format!("[{fd}, {remaining}]");
                let chunk = mount.write(&mut scope.child("write", args), fd, &data[written..], -1);
                match chunk {
                    Ok(0) => break Err(scope.error(EIO)),
                    Ok(n) => written += n.min(remaining),
                    Err(err) => break Err(err),
                }
            };
            let closed = mount.close(&mut scope.child("close", format!("[{fd}]")), fd);
            finish(result, closed)
        })
        .await
    }
}
