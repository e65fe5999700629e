//! 串行调用网关：引擎的唯一执行通道。
//!
//! 引擎运行在一个专用线程上，调用以任务形式进入 FIFO 队列，线程逐个取出并执行完毕
//! （包括期间发出的全部块请求）后再取下一个。每个任务的结果通过各自的 oneshot 通道
//! 交还给等待的调用方。任务失败不会影响队列；任务 panic 会在引擎线程上被捕获，
//! 然后在调用方重新抛出。

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use ext2fs_core::{Engine, FsError, FsResult, EIO};
use tokio::sync::{mpsc, oneshot};

use crate::scope::Scope;

type Job = Box<dyn FnOnce(&mut dyn Engine) + Send>;

enum Message {
    Run(Job),
    /// 停止执行并交还引擎，此前入队的任务仍会先执行
    Stop(oneshot::Sender<Box<dyn Engine>>),
}

/// 串行调用网关
#[derive(Debug)]
pub struct Gateway {
    queue: mpsc::UnboundedSender<Message>,
    pending: Arc<AtomicUsize>,
}

fn not_running(syscall: &'static str) -> FsError {
    FsError::new(EIO, syscall, "gateway not running")
}

impl Gateway {
    /// 启动引擎线程；线程创建失败时交还引擎
    pub fn start(
        engine: Box<dyn Engine>,
        thread_name: &str,
    ) -> Result<Self, (io::Error, Box<dyn Engine>)> {
        let (queue, jobs) = mpsc::unbounded_channel();
        let (handoff, engine_rx) = std::sync::mpsc::channel::<Box<dyn Engine>>();
        let pending = Arc::new(AtomicUsize::new(0));

        let counter = pending.clone();
        let spawned = thread::Builder::new()
            .name(thread_name.to_owned())
            .spawn(move || {
                if let Ok(engine) = engine_rx.recv() {
                    drain(engine, jobs, counter);
                }
            });
        if let Err(err) = spawned {
            return Err((err, engine));
        }
        if let Err(std::sync::mpsc::SendError(engine)) = handoff.send(engine) {
            let err = io::Error::new(io::ErrorKind::BrokenPipe, "engine thread exited early");
            return Err((err, engine));
        }
        debug!("gateway started on thread {thread_name}");
        Ok(Self { queue, pending })
    }

    /// 已入队但尚未执行完毕的任务数
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// 把 `f` 作为一个任务入队，等待它在引擎线程上执行完毕
    ///
    /// 入队发生在返回的 future 第一次被轮询时。
    pub async fn call<T, F>(&self, syscall: &'static str, f: F) -> FsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Engine) -> FsResult<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |engine: &mut dyn Engine| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(engine)));
            // 调用方可能已经放弃等待
            let _ = tx.send(result);
        });
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(Message::Run(job)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(not_running(syscall));
        }
        match rx.await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(not_running(syscall)),
        }
    }

    /// 在新的作用域内执行 `body`，作用域在任务结束前释放
    pub async fn scoped<T, F>(&self, syscall: &'static str, args: String, body: F) -> FsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Scope<'_>) -> FsResult<T> + Send + 'static,
    {
        self.call(syscall, move |engine| {
            let mut scope = Scope::begin(engine, syscall, args);
            let result = body(&mut scope);
            scope.end();
            result
        })
        .await
    }

    /// 停止引擎线程并取回引擎
    ///
    /// 已入队的任务先执行完；之后入队的任务以 EIO 失败。
    pub async fn shutdown(&self) -> Option<Box<dyn Engine>> {
        let (tx, rx) = oneshot::channel();
        self.queue.send(Message::Stop(tx)).ok()?;
        let engine = rx.await.ok();
        debug!("gateway stopped");
        engine
    }
}

fn drain(
    mut engine: Box<dyn Engine>,
    mut jobs: mpsc::UnboundedReceiver<Message>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(message) = jobs.blocking_recv() {
        match message {
            Message::Run(job) => {
                job(&mut *engine);
                pending.fetch_sub(1, Ordering::SeqCst);
            }
            Message::Stop(reply) => {
                jobs.close();
                let dropped = std::iter::from_fn(|| jobs.try_recv().ok())
                    .filter(|m| matches!(m, Message::Run(_)))
                    .count();
                if dropped > 0 {
                    warn!("gateway stopped with {dropped} queued calls");
                    pending.fetch_sub(dropped, Ordering::SeqCst);
                }
                if reply.send(engine).is_err() {
                    error!("engine dropped: nobody is waiting for gateway shutdown");
                }
                return;
            }
        }
    }
}
