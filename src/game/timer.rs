//! Epoch-tagged scheduled tasks
//!
//! Every timer carries the round epoch it was created under. The scheduler
//! drops any firing whose epoch is no longer current, so cancellation only
//! has to be best-effort.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    CountdownTick,
    MultiplierTick,
    Settle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduledTask {
    pub epoch: u64,
    pub kind: TaskKind,
}

/// Timer backend used by the round scheduler
pub trait TaskScheduler: Send {
    /// Fire `task` every `every`, first firing one period from now
    fn schedule_repeating(&mut self, task: ScheduledTask, every: Duration);

    /// Fire `task` once after `after`
    fn schedule_once(&mut self, task: ScheduledTask, after: Duration);

    /// Stop every task created under `epoch`
    fn cancel(&mut self, epoch: u64);
}

/// Spawns tokio tasks that push fired timers into a channel read by the engine
pub struct TokioTaskScheduler {
    fired: mpsc::UnboundedSender<ScheduledTask>,
    handles: HashMap<u64, Vec<JoinHandle<()>>>,
}

impl TokioTaskScheduler {
    pub fn new(fired: mpsc::UnboundedSender<ScheduledTask>) -> Self {
        Self {
            fired,
            handles: HashMap::new(),
        }
    }

    fn track(&mut self, epoch: u64, handle: JoinHandle<()>) {
        self.handles.retain(|_, handles| {
            handles.retain(|h| !h.is_finished());
            !handles.is_empty()
        });
        self.handles.entry(epoch).or_default().push(handle);
    }

    pub fn active_tasks(&self) -> usize {
        self.handles.values().map(Vec::len).sum()
    }
}

impl TaskScheduler for TokioTaskScheduler {
    fn schedule_repeating(&mut self, task: ScheduledTask, every: Duration) {
        let fired = self.fired.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + every;
            let mut interval = tokio::time::interval_at(start, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if fired.send(task).is_err() {
                    break;
                }
            }
        });
        self.track(task.epoch, handle);
    }

    fn schedule_once(&mut self, task: ScheduledTask, after: Duration) {
        let fired = self.fired.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = fired.send(task);
        });
        self.track(task.epoch, handle);
    }

    fn cancel(&mut self, epoch: u64) {
        if let Some(handles) = self.handles.remove(&epoch) {
            debug!(epoch, count = handles.len(), "cancelling timers");
            for handle in handles {
                handle.abort();
            }
        }
    }
}

impl Drop for TokioTaskScheduler {
    fn drop(&mut self) {
        for handle in self.handles.values().flatten() {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Repeating(Duration),
    Once(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualEntry {
    pub task: ScheduledTask,
    pub cadence: Cadence,
    pub cancelled: bool,
}

/// Records schedules without running anything; tests fire tasks by hand.
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct ManualTaskScheduler {
    entries: Arc<Mutex<Vec<ManualEntry>>>,
}

impl ManualTaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ManualEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Tasks scheduled and not cancelled
    pub fn live(&self) -> Vec<ScheduledTask> {
        self.entries()
            .into_iter()
            .filter(|e| !e.cancelled)
            .map(|e| e.task)
            .collect()
    }

    /// Most recently scheduled task of `kind`, cancelled or not
    pub fn latest(&self, kind: TaskKind) -> Option<ScheduledTask> {
        self.entries()
            .into_iter()
            .rev()
            .find(|e| e.task.kind == kind)
            .map(|e| e.task)
    }

    fn push(&self, task: ScheduledTask, cadence: Cadence) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ManualEntry {
                task,
                cadence,
                cancelled: false,
            });
    }
}

impl TaskScheduler for ManualTaskScheduler {
    fn schedule_repeating(&mut self, task: ScheduledTask, every: Duration) {
        self.push(task, Cadence::Repeating(every));
    }

    fn schedule_once(&mut self, task: ScheduledTask, after: Duration) {
        self.push(task, Cadence::Once(after));
    }

    fn cancel(&mut self, epoch: u64) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for entry in entries.iter_mut().filter(|e| e.task.epoch == epoch) {
            entry.cancelled = true;
        }
    }
}
