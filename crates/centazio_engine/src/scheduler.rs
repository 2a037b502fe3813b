//! Cron scheduler.
//!
//! Functions are grouped by cron expression. Each group gets one task that
//! sleeps until the next fire time, runs its functions one after another
//! and only then computes the next fire time, so a group never overlaps
//! itself. Change triggers emitted by a run are queued and delivered by a
//! separate notification task to every function that listens for them.

use crate::error::{EngineError, EngineResult};
use crate::function::{Function, FunctionRunResult, FunctionRunner};
use crate::trigger::{FunctionTrigger, ObjectChangeTrigger};
use cron::Schedule;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

struct CronGroup {
    expression: String,
    schedule: Schedule,
    functions: Vec<Arc<Function>>,
    running: tokio::sync::Mutex<()>,
}

/// Drives functions on their cron schedules and on change triggers.
pub struct Scheduler {
    runner: Arc<FunctionRunner>,
    functions: Vec<Arc<Function>>,
    groups: Vec<Arc<CronGroup>>,
    notify_tx: mpsc::UnboundedSender<ObjectChangeTrigger>,
    notify_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<ObjectChangeTrigger>>>,
}

impl Scheduler {
    /// Creates a scheduler for `functions`.
    ///
    /// Fails if any operation carries an unparseable cron expression.
    pub fn new(runner: Arc<FunctionRunner>, functions: Vec<Arc<Function>>) -> EngineResult<Self> {
        let mut by_cron: BTreeMap<String, Vec<Arc<Function>>> = BTreeMap::new();
        for function in &functions {
            for expression in function.cron_expressions() {
                by_cron.entry(expression).or_default().push(Arc::clone(function));
            }
        }

        let mut groups = Vec::with_capacity(by_cron.len());
        for (expression, functions) in by_cron {
            let schedule = Schedule::from_str(&expression)
                .map_err(|e| EngineError::invalid_cron(&expression, e))?;
            groups.push(Arc::new(CronGroup {
                expression,
                schedule,
                functions,
                running: tokio::sync::Mutex::new(()),
            }));
        }

        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Ok(Self {
            runner,
            functions,
            groups,
            notify_tx,
            notify_rx: parking_lot::Mutex::new(Some(notify_rx)),
        })
    }

    /// Distinct cron expressions, one per timer task.
    pub fn cron_groups(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.expression.as_str()).collect()
    }

    /// Runs the group for `cron` immediately, waiting for any tick of the
    /// same group already in progress.
    pub async fn run_group_now(&self, cron: &str) -> EngineResult<Vec<FunctionRunResult>> {
        let group = self
            .groups
            .iter()
            .find(|g| g.expression == cron)
            .ok_or_else(|| EngineError::invalid_cron(cron, "no function is scheduled on it"))?;
        Ok(self.run_group(group).await)
    }

    /// Runs every function listening for `trigger` and returns their results.
    ///
    /// Triggers emitted by these runs are returned in the results, not
    /// delivered. A listener that a cron group is running right now is
    /// skipped as already running.
    pub async fn notify(&self, trigger: ObjectChangeTrigger) -> Vec<FunctionRunResult> {
        let triggers = [FunctionTrigger::ObjectChange(trigger.clone())];
        let mut results = Vec::new();
        for function in self.functions.iter().filter(|f| f.listens_to(&trigger)) {
            match self.runner.run(function, &triggers).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(function = function.name(), %trigger, error = %e, "triggered run failed")
                }
            }
        }
        results
    }

    /// Queues `trigger` for the notification task.
    pub fn publish(&self, trigger: ObjectChangeTrigger) -> EngineResult<()> {
        self.notify_tx
            .send(trigger)
            .map_err(|_| EngineError::SchedulerClosed)
    }

    /// Spawns one timer task per cron group plus the notification task.
    pub fn start(self: &Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(self.groups.len() + 1);

        for group in &self.groups {
            let scheduler = Arc::clone(self);
            let group = Arc::clone(group);
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                scheduler.timer_loop(group, shutdown).await;
            }));
        }

        match self.notify_rx.lock().take() {
            Some(rx) => {
                let scheduler = Arc::clone(self);
                tasks.push(tokio::spawn(async move {
                    scheduler.notification_loop(rx, shutdown_rx).await;
                }));
            }
            None => tracing::warn!("scheduler already started, change triggers go to the first instance"),
        }

        tracing::info!(groups = self.groups.len(), "scheduler started");
        SchedulerHandle { shutdown_tx, tasks }
    }

    async fn run_group(&self, group: &CronGroup) -> Vec<FunctionRunResult> {
        let _running = group.running.lock().await;
        let triggers = [FunctionTrigger::timer(group.expression.clone())];
        let mut results = Vec::with_capacity(group.functions.len());
        for function in &group.functions {
            match self.runner.run(function, &triggers).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(function = function.name(), cron = %group.expression, error = %e, "scheduled run failed")
                }
            }
        }
        results
    }

    async fn timer_loop(&self, group: Arc<CronGroup>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = self.runner.context().now();
            let Some(next) = group.schedule.after(&now).next() else {
                tracing::warn!(cron = %group.expression, "cron schedule has no future fire time");
                break;
            };
            let wait = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            tracing::debug!(cron = %group.expression, "cron group firing");
            let results = self.run_group(&group).await;
            for trigger in results.iter().flat_map(FunctionRunResult::change_triggers) {
                if self.publish(trigger).is_err() {
                    break;
                }
            }
        }
        tracing::debug!(cron = %group.expression, "timer task stopped");
    }

    async fn notification_loop(
        &self,
        mut rx: mpsc::UnboundedReceiver<ObjectChangeTrigger>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                maybe = rx.recv() => {
                    let Some(trigger) = maybe else { break };
                    tracing::debug!(%trigger, "delivering change trigger");
                    for result in self.notify(trigger).await {
                        for next in result.change_triggers() {
                            if self.publish(next).is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        }
        tracing::debug!("notification task stopped");
    }
}

/// Handle to a started scheduler.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signals shutdown and waits for every task.
    ///
    /// A group in the middle of a tick finishes it first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        tracing::info!("scheduler stopped");
    }
}
