//! Bounded pool of forked worker processes.
//!
//! Each worker is a `fork()` of the orchestrator holding one end of a
//! `UnixStream` pair. Tasks and replies travel as JSON lines; a worker owns
//! at most one task at a time. Per-worker reader threads only move reply
//! lines into a single channel, all handler work runs in the workers.
//!
//! A worker that dies (crash, signal, kill on timeout) is reaped and
//! replaced; the task it held resolves as [`UnitFailure::WorkerLost`] or
//! [`UnitFailure::TimedOut`]. Every submitted item resolves exactly once.

use crate::config::types::{Result, SieveError};
use crate::kernel::signal::{self, TERM_GRACE};
use crate::utils::fd_closure::close_inherited_fds_except;
use crossbeam_channel as chan;
use nix::unistd::{fork, getppid, setpgid, ForkResult, Pid};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::io::{BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::net::Shutdown;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// How long a worker gets to exit after its socket is half-closed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Worker exit codes (sysexits)
const EXIT_PROTOCOL: i32 = 65;
const EXIT_SETUP: i32 = 71;
const EXIT_IO: i32 = 74;

/// Consecutive task writes that may fail before the pool gives up
const MAX_FAILED_SENDS: usize = 3;

/// Why a unit of work produced no result.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum UnitFailure {
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("worker process lost: {0}")]
    WorkerLost(String),
    #[error("no result within {0:?}")]
    TimedOut(Duration),
}

impl UnitFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            UnitFailure::Panicked(_) => "Panic",
            UnitFailure::WorkerLost(_) => "WorkerLost",
            UnitFailure::TimedOut(_) => "Timeout",
        }
    }
}

pub type UnitResult<R> = std::result::Result<R, UnitFailure>;

#[derive(Serialize, Deserialize)]
struct TaskEnvelope<T> {
    seq: usize,
    payload: T,
}

#[derive(Serialize, Deserialize)]
struct ReplyEnvelope<R> {
    seq: usize,
    outcome: WireOutcome<R>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireOutcome<R> {
    Done(R),
    Panicked(String),
}

enum PoolEvent {
    Reply { slot: usize, generation: u64, line: String },
    Closed { slot: usize, generation: u64 },
}

struct Worker {
    pid: Pid,
    generation: u64,
    stream: UnixStream,
    busy: Option<usize>,
    reader: Option<JoinHandle<()>>,
}

/// Pool of forked workers running `handler` on serialized tasks.
pub struct ProcessPool<T, R, F>
where
    F: Fn(T) -> R,
{
    name: String,
    size: usize,
    handler: F,
    workers: Vec<Option<Worker>>,
    retired: Vec<JoinHandle<()>>,
    next_generation: u64,
    events_tx: chan::Sender<PoolEvent>,
    events_rx: chan::Receiver<PoolEvent>,
    _marker: PhantomData<fn(T) -> R>,
}

impl<T, R, F> ProcessPool<T, R, F>
where
    T: Serialize + DeserializeOwned,
    R: Serialize + DeserializeOwned,
    F: Fn(T) -> R,
{
    /// Workers are forked lazily, at most `size`, never more than the item count.
    pub fn new(name: impl Into<String>, size: usize, handler: F) -> Result<Self> {
        if size == 0 {
            return Err(SieveError::Pool("pool size cannot be zero".to_string()));
        }
        let (events_tx, events_rx) = chan::unbounded();
        Ok(Self {
            name: name.into(),
            size,
            handler,
            workers: Vec::new(),
            retired: Vec::new(),
            next_generation: 0,
            events_tx,
            events_rx,
            _marker: PhantomData,
        })
    }

    /// Pids of the live workers
    pub fn worker_pids(&self) -> Vec<i32> {
        self.workers
            .iter()
            .flatten()
            .map(|w| w.pid.as_raw())
            .collect()
    }

    /// Run every item, handing results to `on_result` as they complete.
    pub fn run_unordered<C>(&mut self, items: Vec<T>, mut on_result: C) -> Result<()>
    where
        C: FnMut(usize, UnitResult<R>),
    {
        let total = items.len();
        let mut queue: VecDeque<(usize, T)> = items.into_iter().enumerate().collect();
        self.ensure_workers(total)?;
        self.dispatch(&mut queue)?;

        let mut resolved = 0;
        while resolved < total {
            let event = self.events_rx.recv().map_err(|_| {
                SieveError::Pool(format!("{}: event channel closed", self.name))
            })?;
            for (seq, result) in self.handle_event(event)? {
                resolved += 1;
                on_result(seq, result);
            }
            self.dispatch(&mut queue)?;
        }
        Ok(())
    }

    /// Run every item and consume results in submission order. Each item
    /// gets at most `per_item_timeout`, counted from when the caller starts
    /// waiting on it; a worker holding a timed-out item is killed and replaced.
    pub fn run_ordered<C>(
        &mut self,
        items: Vec<T>,
        per_item_timeout: Duration,
        mut on_result: C,
    ) -> Result<()>
    where
        C: FnMut(usize, UnitResult<R>),
    {
        let total = items.len();
        let mut queue: VecDeque<(usize, T)> = items.into_iter().enumerate().collect();
        let mut ready: HashMap<usize, UnitResult<R>> = HashMap::new();
        self.ensure_workers(total)?;
        self.dispatch(&mut queue)?;

        for next in 0..total {
            let deadline = Instant::now() + per_item_timeout;
            let result = loop {
                if let Some(result) = ready.remove(&next) {
                    break result;
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                match self.events_rx.recv_timeout(remaining) {
                    Ok(event) => {
                        for (seq, result) in self.handle_event(event)? {
                            // Items below `next` already resolved; their late results are dropped.
                            if seq >= next {
                                ready.insert(seq, result);
                            }
                        }
                        self.dispatch(&mut queue)?;
                    }
                    Err(chan::RecvTimeoutError::Timeout) => {
                        self.abandon(next, &mut queue)?;
                        self.dispatch(&mut queue)?;
                        break Err(UnitFailure::TimedOut(per_item_timeout));
                    }
                    Err(chan::RecvTimeoutError::Disconnected) => {
                        return Err(SieveError::Pool(format!(
                            "{}: event channel closed",
                            self.name
                        )));
                    }
                }
            };
            on_result(next, result);
        }
        Ok(())
    }

    fn ensure_workers(&mut self, items: usize) -> Result<()> {
        let wanted = self.size.min(items);
        while self.workers.len() < wanted {
            self.workers.push(None);
        }
        for slot in 0..wanted {
            if self.workers[slot].is_none() {
                let worker = self.spawn_worker(slot)?;
                self.workers[slot] = Some(worker);
            }
        }
        if wanted > 0 {
            log::debug!("{}: {} worker(s) ready", self.name, wanted);
        }
        Ok(())
    }

    fn spawn_worker(&mut self, slot: usize) -> Result<Worker> {
        let (parent_end, child_end) = UnixStream::pair()?;
        let parent_pid = nix::unistd::getpid();

        // SAFETY: the child only runs the handler loop and leaves via _exit.
        match unsafe { fork() }? {
            ForkResult::Child => {
                drop(parent_end);
                let code = worker_main(&self.handler, child_end, parent_pid);
                unsafe { libc::_exit(code) }
            }
            ForkResult::Parent { child } => {
                drop(child_end);
                // Mirrors the child's own setpgid so group kills never race it.
                let _ = setpgid(child, child);

                let generation = self.next_generation;
                self.next_generation += 1;

                let reader_end = parent_end.try_clone()?;
                let tx = self.events_tx.clone();
                let reader = std::thread::Builder::new()
                    .name(format!("{}-reader-{}", self.name, slot))
                    .spawn(move || read_replies(reader_end, slot, generation, tx))?;

                Ok(Worker {
                    pid: child,
                    generation,
                    stream: parent_end,
                    busy: None,
                    reader: Some(reader),
                })
            }
        }
    }

    /// Hand queued items to idle workers.
    fn dispatch(&mut self, queue: &mut VecDeque<(usize, T)>) -> Result<()> {
        let mut slot = 0;
        let mut failed_sends = 0;
        while slot < self.workers.len() && !queue.is_empty() {
            let idle = matches!(&self.workers[slot], Some(w) if w.busy.is_none());
            if !idle {
                slot += 1;
                continue;
            }

            let Some((seq, payload)) = queue.pop_front() else {
                break;
            };
            let mut line = serde_json::to_string(&TaskEnvelope { seq, payload: &payload })?;
            line.push('\n');

            let sent = match self.workers[slot].as_mut() {
                Some(worker) => match (&worker.stream).write_all(line.as_bytes()) {
                    Ok(()) => {
                        worker.busy = Some(seq);
                        true
                    }
                    Err(e) => {
                        log::warn!("{}: worker {} rejected task {}: {}", self.name, worker.pid, seq, e);
                        false
                    }
                },
                None => false,
            };
            if !sent {
                queue.push_front((seq, payload));
                failed_sends += 1;
                if failed_sends > MAX_FAILED_SENDS {
                    return Err(SieveError::Pool(format!(
                        "{}: fresh workers keep refusing tasks",
                        self.name
                    )));
                }
                self.replace_worker(slot)?;
                continue;
            }
            failed_sends = 0;
            slot += 1;
        }
        Ok(())
    }

    /// Turn one event into the results it resolves.
    fn handle_event(&mut self, event: PoolEvent) -> Result<Vec<(usize, UnitResult<R>)>> {
        match event {
            PoolEvent::Reply { slot, generation, line } => {
                if !self.is_current(slot, generation) {
                    return Ok(Vec::new());
                }
                let reply: ReplyEnvelope<R> = match serde_json::from_str(&line) {
                    Ok(reply) => reply,
                    Err(e) => {
                        let lost = self.retire(slot, &format!("malformed reply: {e}"))?;
                        return Ok(lost.into_iter().collect());
                    }
                };
                if let Some(worker) = self.workers[slot].as_mut() {
                    if worker.busy == Some(reply.seq) {
                        worker.busy = None;
                    } else {
                        log::warn!(
                            "{}: worker {} answered task {} it does not hold",
                            self.name,
                            worker.pid,
                            reply.seq
                        );
                        return Ok(Vec::new());
                    }
                }
                let result = match reply.outcome {
                    WireOutcome::Done(value) => Ok(value),
                    WireOutcome::Panicked(message) => Err(UnitFailure::Panicked(message)),
                };
                Ok(vec![(reply.seq, result)])
            }
            PoolEvent::Closed { slot, generation } => {
                if !self.is_current(slot, generation) {
                    return Ok(Vec::new());
                }
                let lost = self.retire(slot, "connection closed")?;
                Ok(lost.into_iter().collect())
            }
        }
    }

    fn is_current(&self, slot: usize, generation: u64) -> bool {
        matches!(self.workers.get(slot), Some(Some(w)) if w.generation == generation)
    }

    /// Reap a dead worker, replace it, and fail the task it held.
    fn retire(&mut self, slot: usize, why: &str) -> Result<Option<(usize, UnitResult<R>)>> {
        let Some(worker) = self.workers[slot].take() else {
            return Ok(None);
        };
        let status = match signal::reap_with_grace(worker.pid, TERM_GRACE) {
            Ok(status) => format!("{status:?}"),
            Err(e) => e.to_string(),
        };
        log::warn!("{}: worker {} lost ({}; {})", self.name, worker.pid, why, status);
        if let Some(reader) = worker.reader {
            self.retired.push(reader);
        }
        self.workers[slot] = Some(self.spawn_worker(slot)?);
        Ok(worker
            .busy
            .map(|seq| (seq, Err(UnitFailure::WorkerLost(status)))))
    }

    fn replace_worker(&mut self, slot: usize) -> Result<()> {
        if let Some(worker) = self.workers[slot].take() {
            let _ = signal::kill_and_reap(worker.pid);
            if let Some(reader) = worker.reader {
                self.retired.push(reader);
            }
        }
        self.workers[slot] = Some(self.spawn_worker(slot)?);
        Ok(())
    }

    /// Give up on `seq`: kill the worker holding it, or drop it from the queue.
    fn abandon(&mut self, seq: usize, queue: &mut VecDeque<(usize, T)>) -> Result<()> {
        let holder = self
            .workers
            .iter()
            .position(|w| matches!(w, Some(w) if w.busy == Some(seq)));
        match holder {
            Some(slot) => {
                if let Some(pid) = self.workers[slot].as_ref().map(|w| w.pid) {
                    log::debug!("{}: killing worker {} stuck on item {}", self.name, pid, seq);
                }
                self.replace_worker(slot)
            }
            None => {
                queue.retain(|(queued, _)| *queued != seq);
                Ok(())
            }
        }
    }
}

impl<T, R, F> ProcessPool<T, R, F>
where
    F: Fn(T) -> R,
{
    /// Half-close every socket, give workers a grace period, then kill and reap.
    pub fn shutdown(&mut self) {
        for worker in self.workers.iter_mut().filter_map(Option::take) {
            let _ = worker.stream.shutdown(Shutdown::Write);
            if let Err(e) = signal::reap_with_grace(worker.pid, SHUTDOWN_GRACE) {
                log::warn!("{}: failed to reap worker {}: {}", self.name, worker.pid, e);
            }
            if let Some(reader) = worker.reader {
                let _ = reader.join();
            }
        }
        for reader in self.retired.drain(..) {
            let _ = reader.join();
        }
        self.workers.clear();
    }
}

impl<T, R, F> Drop for ProcessPool<T, R, F>
where
    F: Fn(T) -> R,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_replies(stream: UnixStream, slot: usize, generation: u64, tx: chan::Sender<PoolEvent>) {
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else { break };
        if tx.send(PoolEvent::Reply { slot, generation, line }).is_err() {
            return;
        }
    }
    let _ = tx.send(PoolEvent::Closed { slot, generation });
}

/// Worker process body. Returns the exit code.
fn worker_main<T, R, F>(handler: &F, stream: UnixStream, parent: Pid) -> i32
where
    T: DeserializeOwned,
    R: Serialize,
    F: Fn(T) -> R,
{
    if close_inherited_fds_except(stream.as_raw_fd()).is_err() {
        return EXIT_SETUP;
    }
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
    if signal::set_parent_death_signal().is_err() || getppid() != parent {
        return EXIT_SETUP;
    }

    let mut writer = &stream;
    for line in BufReader::new(&stream).lines() {
        let Ok(line) = line else { return EXIT_IO };
        let task: TaskEnvelope<T> = match serde_json::from_str(&line) {
            Ok(task) => task,
            Err(_) => return EXIT_PROTOCOL,
        };

        let outcome = match catch_unwind(AssertUnwindSafe(|| handler(task.payload))) {
            Ok(value) => WireOutcome::Done(value),
            Err(panic) => WireOutcome::Panicked(panic_message(panic.as_ref())),
        };
        let reply = match serde_json::to_string(&ReplyEnvelope { seq: task.seq, outcome }) {
            Ok(reply) => reply,
            Err(e) => serde_json::to_string(&ReplyEnvelope::<R> {
                seq: task.seq,
                outcome: WireOutcome::Panicked(format!("unserializable result: {e}")),
            })
            .unwrap_or_default(),
        };
        if writer.write_all(reply.as_bytes()).is_err() || writer.write_all(b"\n").is_err() {
            return EXIT_IO;
        }
    }
    0
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
