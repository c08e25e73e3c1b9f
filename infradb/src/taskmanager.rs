// SPDX-License-Identifier: Apache-2.0

//! The task manager drives objects to their goal state.
//!
//! A single worker consumes a FIFO queue of tasks. Each task names one
//! object at one resource version and the remaining pipeline of subscribers
//! to contact. The worker notifies one subscriber at a time and waits for
//! the correlated status update: success advances the pipeline, an error
//! re-enqueues the remaining pipeline after the component's backoff timer,
//! and a timer at the replay threshold escalates to a global replay. The
//! worker never performs back-end I/O itself.

use crate::error::InfraResult;
use crate::eventbus::{ObjectData, Subscriber};
use crate::objects::common::{generate_version, CompStatus, Component, REPLAY_THRESHOLD};
use crate::objects::ObjectType;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long to wait for a subscriber's status update before requeueing.
const STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// One unit of convergence work: an object at a version snapshot and the
/// subscribers still to be contacted, in priority order.
#[derive(Debug)]
pub struct Task {
    pub kind: ObjectType,
    pub name: String,
    pub resource_version: String,
    pub subs: Vec<Arc<Subscriber>>,
}

/// Status report correlated back to an in-flight task.
#[derive(Debug)]
pub struct TaskStatus {
    pub kind: ObjectType,
    pub name: String,
    pub notification_id: String,
    /// the object moved (or vanished) under the task; stop working on it
    pub drop_task: bool,
    pub component: Component,
}

enum WorkItem {
    Task(Task),
    Replay { component: String },
}

/// The facade side the worker needs: a stale-task check and the global
/// replay procedure. Implemented by `InfraDb`.
#[async_trait::async_trait]
pub trait ReplayDriver: Send + Sync {
    /// Current resource version of the object, if it still exists.
    fn live_version(&self, kind: ObjectType, name: &str) -> InfraResult<Option<String>>;
    /// Rebuild back-end state from persisted intent.
    async fn replay(&self, component: &str);
}

pub struct TaskManager {
    work_tx: mpsc::UnboundedSender<WorkItem>,
    work_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkItem>>>,
    status_tx: mpsc::UnboundedSender<TaskStatus>,
    status_rx: Mutex<Option<mpsc::UnboundedReceiver<TaskStatus>>>,
    driver: OnceLock<Arc<dyn ReplayDriver>>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskManager {
    pub fn new() -> Self {
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        Self {
            work_tx,
            work_rx: Mutex::new(Some(work_rx)),
            status_tx,
            status_rx: Mutex::new(Some(status_rx)),
            driver: OnceLock::new(),
        }
    }

    /// Install the facade-side driver. Must happen before `start`.
    pub fn set_driver(&self, driver: Arc<dyn ReplayDriver>) {
        if self.driver.set(driver).is_err() {
            warn!("Replay driver was already installed");
        }
    }

    /// Enqueue a convergence task for one object.
    pub fn create_task(
        &self,
        kind: ObjectType,
        name: &str,
        resource_version: &str,
        subs: Vec<Arc<Subscriber>>,
    ) {
        debug!("Enqueueing task for {kind} '{name}' over {} subscriber(s)", subs.len());
        let task = Task {
            kind,
            name: name.to_string(),
            resource_version: resource_version.to_string(),
            subs,
        };
        if self.work_tx.send(WorkItem::Task(task)).is_err() {
            error!("Task queue is gone; task for '{name}' lost");
        }
    }

    /// Called by the facade whenever a subscriber reports component status.
    pub fn status_updated(&self, status: TaskStatus) {
        if self.status_tx.send(status).is_err() {
            error!("Status channel is gone");
        }
    }

    /// Spawn the worker loop. Call once, after `set_driver`.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        let mut work_rx = manager
            .work_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .expect("task manager started twice");
        let mut status_rx = manager
            .status_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .expect("task manager started twice");
        tokio::spawn(async move {
            info!("Task manager started");
            while let Some(item) = work_rx.recv().await {
                match item {
                    WorkItem::Task(task) => {
                        manager.process_task(&mut status_rx, task).await;
                    }
                    WorkItem::Replay { component } => {
                        if let Some(driver) = manager.driver.get() {
                            driver.replay(&component).await;
                        } else {
                            error!("Replay requested but no driver is installed");
                        }
                    }
                }
            }
            info!("Task manager stopped");
        })
    }

    async fn process_task(
        &self,
        status_rx: &mut mpsc::UnboundedReceiver<TaskStatus>,
        task: Task,
    ) {
        // a task carries a version snapshot; if the object moved since, a
        // newer task is already queued and this one is dead
        if let Some(driver) = self.driver.get() {
            match driver.live_version(task.kind, &task.name) {
                Ok(Some(version)) if version == task.resource_version => {}
                Ok(_) => {
                    debug!(
                        "Dropping stale task for {} '{}' at version {}",
                        task.kind, task.name, task.resource_version
                    );
                    return;
                }
                Err(e) => {
                    warn!("Could not check task freshness for '{}': {e}", task.name);
                }
            }
        }

        for (index, sub) in task.subs.iter().enumerate() {
            let notification_id = generate_version();
            debug!(
                "Notifying subscriber '{}' about {} '{}' (notification {notification_id})",
                sub.name, task.kind, task.name
            );
            sub.notify(ObjectData {
                name: task.name.clone(),
                resource_version: task.resource_version.clone(),
                notification_id: notification_id.clone(),
            })
            .await;

            match self.await_status(status_rx, &task, &notification_id).await {
                StepOutcome::Success => {}
                StepOutcome::Drop => {
                    debug!("Dropping task for {} '{}'", task.kind, task.name);
                    return;
                }
                StepOutcome::Replay { component } => {
                    info!(
                        "Component '{component}' of '{}' crossed the replay threshold",
                        task.name
                    );
                    let _ = self.work_tx.send(WorkItem::Replay { component });
                    return;
                }
                StepOutcome::Retry { after } => {
                    self.requeue(&task, index, after);
                    return;
                }
                StepOutcome::Timeout => {
                    warn!(
                        "Subscriber '{}' did not report status for '{}' in time; requeueing",
                        sub.name, task.name
                    );
                    self.requeue(&task, index, Duration::ZERO);
                    return;
                }
            }
        }
        debug!("Task for {} '{}' ran its whole pipeline", task.kind, task.name);
    }

    /// Wait for the status update carrying `notification_id`, skipping
    /// reports that belong to earlier, abandoned notifications.
    async fn await_status(
        &self,
        status_rx: &mut mpsc::UnboundedReceiver<TaskStatus>,
        task: &Task,
        notification_id: &str,
    ) -> StepOutcome {
        loop {
            let status = match tokio::time::timeout(STEP_TIMEOUT, status_rx.recv()).await {
                Ok(Some(status)) => status,
                Ok(None) => return StepOutcome::Drop,
                Err(_) => return StepOutcome::Timeout,
            };
            if status.notification_id != notification_id
                || status.name != task.name
                || status.kind != task.kind
            {
                debug!(
                    "Ignoring stale status report for {} '{}' (notification {})",
                    status.kind, status.name, status.notification_id
                );
                continue;
            }
            if status.drop_task {
                return StepOutcome::Drop;
            }
            return match status.component.status {
                CompStatus::Success => StepOutcome::Success,
                _ if status.component.timer >= REPLAY_THRESHOLD => StepOutcome::Replay {
                    component: status.component.name,
                },
                _ => StepOutcome::Retry {
                    after: status.component.timer,
                },
            };
        }
    }

    /// Re-enqueue the unfinished tail of a task's pipeline after a delay.
    fn requeue(&self, task: &Task, from: usize, after: Duration) {
        let retry = Task {
            kind: task.kind,
            name: task.name.clone(),
            resource_version: task.resource_version.clone(),
            subs: task.subs[from..].to_vec(),
        };
        debug!(
            "Requeueing task for {} '{}' over {} subscriber(s) in {after:?}",
            retry.kind,
            retry.name,
            retry.subs.len()
        );
        let work_tx = self.work_tx.clone();
        tokio::spawn(async move {
            if !after.is_zero() {
                tokio::time::sleep(after).await;
            }
            let _ = work_tx.send(WorkItem::Task(retry));
        });
    }
}

enum StepOutcome {
    Success,
    Drop,
    Retry { after: Duration },
    Replay { component: String },
    Timeout,
}
