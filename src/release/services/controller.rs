//! Dependency reconciliation controller.
//!
//! One watch stream on dependency-declaring resources feeds three queues:
//!
//! - reconcile: a resource was added or its output config changed; scan every
//!   resource for dependents and queue them for reload.
//! - reload: upgrade a dependent whose injected config values changed. A busy
//!   release is retried after a fixed delay; any other failure is logged and
//!   dropped until something queues the release again.
//! - publish: a resource was added, deleted, or its spec changed; publish a
//!   change event.
//!
//! Every queue coalesces pending keys, so a dependent of several resources
//! that change together is reloaded once.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ReleaseReloader, ReleaseServiceError};
use crate::config::ControllerSettings;
use crate::release::{
    domain::{
        RELEASE_CONFIG_TOPIC, ReleaseConfig, ReleaseConfigDeltaEvent, ReleaseKey,
        config_values_differ,
    },
    ports::{
        EventPublisher, EventPublisherError, ReleaseConfigEvent, ReleaseConfigSource,
        ReleaseConfigSourceError,
    },
};
use crate::workqueue::WorkQueue;

/// Errors returned by controller handlers.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Resource lookup failed.
    #[error(transparent)]
    Source(#[from] ReleaseConfigSourceError),

    /// Release lookup or mutation failed.
    #[error(transparent)]
    Release(#[from] ReleaseServiceError),

    /// Publishing failed.
    #[error(transparent)]
    Publish(#[from] EventPublisherError),

    /// The event could not be encoded.
    #[error("failed to encode release config event: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for controller handlers.
pub type ControllerResult<T> = Result<T, ControllerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Reconcile,
    Reload,
    Publish,
}

/// Watches dependency-declaring resources and drives reloads of dependents
/// and change-event publishing.
pub struct DependencyReconciliationController<R, U, P>
where
    R: ReleaseConfigSource,
    U: ReleaseReloader,
    P: EventPublisher,
{
    configs: Arc<R>,
    releases: Arc<U>,
    publisher: Arc<P>,
    settings: ControllerSettings,
    reconcile: WorkQueue<ReleaseKey>,
    reload: WorkQueue<ReleaseKey>,
    publish: WorkQueue<ReleaseKey>,
}

fn resource_key(config: &ReleaseConfig) -> Option<ReleaseKey> {
    config
        .key()
        .inspect_err(|err| {
            warn!(
                namespace = %config.namespace,
                name = %config.name,
                error = %err,
                "ignoring release config with malformed identity"
            );
        })
        .ok()
}

impl<R, U, P> DependencyReconciliationController<R, U, P>
where
    R: ReleaseConfigSource + 'static,
    U: ReleaseReloader + 'static,
    P: EventPublisher + 'static,
{
    /// Creates a controller with empty queues.
    #[must_use]
    pub fn new(
        configs: Arc<R>,
        releases: Arc<U>,
        publisher: Arc<P>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            configs,
            releases,
            publisher,
            settings,
            reconcile: WorkQueue::new(),
            reload: WorkQueue::new(),
            publish: WorkQueue::new(),
        }
    }

    /// Returns the reconcile queue.
    #[must_use]
    pub const fn reconcile_queue(&self) -> &WorkQueue<ReleaseKey> {
        &self.reconcile
    }

    /// Returns the reload-dependents queue.
    #[must_use]
    pub const fn reload_queue(&self) -> &WorkQueue<ReleaseKey> {
        &self.reload
    }

    /// Returns the publish-event queue.
    #[must_use]
    pub const fn publish_queue(&self) -> &WorkQueue<ReleaseKey> {
        &self.publish
    }

    const fn queue(&self, kind: QueueKind) -> &WorkQueue<ReleaseKey> {
        match kind {
            QueueKind::Reconcile => &self.reconcile,
            QueueKind::Reload => &self.reload,
            QueueKind::Publish => &self.publish,
        }
    }

    /// Routes one watch event to the queues.
    ///
    /// An update reaches the reconcile queue only when the output config
    /// content changed (`None` and `{}` are equal), and the publish queue only
    /// when the spec changed.
    pub fn handle_event(&self, event: &ReleaseConfigEvent) {
        match event {
            ReleaseConfigEvent::Added(config) => {
                if let Some(key) = resource_key(config) {
                    self.reconcile.add(key.clone());
                    self.publish.add(key);
                }
            }
            ReleaseConfigEvent::Updated { old, new } => {
                let Some(key) = resource_key(new) else {
                    return;
                };
                if config_values_differ(
                    old.spec.output_config.as_ref(),
                    new.spec.output_config.as_ref(),
                ) {
                    self.reconcile.add(key.clone());
                }
                if old.spec != new.spec {
                    self.publish.add(key);
                }
            }
            ReleaseConfigEvent::Deleted(config) => {
                if let Some(key) = resource_key(config) {
                    self.publish.add(key);
                }
            }
        }
    }

    /// Queues every resource that depends on `key` for reload.
    ///
    /// Scans all resources; malformed dependency edges are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Source`] when the resources cannot be listed.
    pub async fn sync_release_config(&self, key: &ReleaseKey) -> ControllerResult<()> {
        let configs = self.configs.list_release_configs().await?;
        for config in &configs {
            for (alias, dependency) in config.resolved_dependencies() {
                match dependency {
                    Ok(target) if target == *key => {
                        if let Some(dependent) = resource_key(config) {
                            debug!(dependency = %key, dependent = %dependent, "queueing dependent for reload");
                            self.reload.add(dependent);
                        }
                    }
                    Ok(_) => {}
                    Err(err) => warn!(
                        namespace = %config.namespace,
                        name = %config.name,
                        alias,
                        error = %err,
                        "skipping malformed dependency edge"
                    ),
                }
            }
        }
        Ok(())
    }

    /// Reloads one dependent, scheduling a delayed retry when it is busy.
    pub async fn reload_dependent(&self, key: &ReleaseKey) {
        match self.releases.reload_release(key).await {
            Ok(()) => debug!(release = %key, "dependent reloaded"),
            Err(err) if err.is_busy() => {
                let delay = self.settings.retry_reload_delay();
                warn!(release = %key, error = %err, ?delay, "release is busy, retrying reload later");
                self.reload.add_after(key.clone(), delay);
            }
            Err(err) => {
                error!(release = %key, error = %err, "failed to reload dependent, dropping");
            }
        }
    }

    /// Publishes the current state of one resource.
    ///
    /// A missing resource is published as a delete. A resource whose release
    /// is not cached is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError`] when lookup, encoding, or publishing fails.
    pub async fn publish_release_config(&self, key: &ReleaseKey) -> ControllerResult<()> {
        let event = match self.configs.get_release_config(key).await? {
            None => ReleaseConfigDeltaEvent::deleted(key),
            Some(config) => {
                if !self.releases.release_exists(key).await? {
                    warn!(release = %key, "release not found, skipping release config event");
                    return Ok(());
                }
                ReleaseConfigDeltaEvent::create_or_update(&config)
            }
        };
        let message = serde_json::to_string(&event)?;
        self.publisher
            .publish(RELEASE_CONFIG_TOPIC, &message)
            .await?;
        debug!(release = %key, kind = ?event.event_type, "published release config event");
        Ok(())
    }

    async fn process(&self, kind: QueueKind, key: &ReleaseKey) {
        match kind {
            QueueKind::Reconcile => {
                if let Err(err) = self.sync_release_config(key).await {
                    error!(release = %key, error = %err, "failed to reconcile dependents");
                }
            }
            QueueKind::Reload => self.reload_dependent(key).await,
            QueueKind::Publish => {
                if let Err(err) = self.publish_release_config(key).await {
                    error!(release = %key, error = %err, "failed to publish release config event");
                }
            }
        }
    }

    fn spawn_workers(self: &Arc<Self>, workers: &mut JoinSet<()>, kind: QueueKind, count: usize) {
        for _ in 0..count.max(1) {
            let controller = Arc::clone(self);
            workers.spawn(async move {
                let queue = controller.queue(kind).clone();
                while let Some(key) = queue.get().await {
                    controller.process(kind, &key).await;
                    queue.done(&key);
                }
            });
        }
    }

    /// Routes every current resource as an addition and returns how many
    /// were replayed.
    ///
    /// Used at startup and after the watch stream dropped events. Pending
    /// keys coalesce, so replaying a resource that is already queued is free.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Source`] when the resources cannot be listed.
    pub async fn replay_all(&self) -> ControllerResult<usize> {
        let configs = self.configs.list_release_configs().await?;
        let replayed = configs.len();
        for config in configs {
            self.handle_event(&ReleaseConfigEvent::Added(config));
        }
        Ok(replayed)
    }

    /// Runs the controller until `cancel` fires.
    ///
    /// Existing resources are replayed as additions before watching, and
    /// again whenever the watch lags behind. On
    /// cancellation the queues stop accepting work and workers finish their
    /// current item.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut events = self.configs.subscribe();
        let mut workers = JoinSet::new();
        self.spawn_workers(&mut workers, QueueKind::Reconcile, self.settings.reconcile_workers);
        self.spawn_workers(&mut workers, QueueKind::Reload, self.settings.reload_workers);
        self.spawn_workers(&mut workers, QueueKind::Publish, self.settings.publish_workers);
        info!("dependency reconciliation controller started");

        if let Err(err) = self.replay_all().await {
            warn!(error = %err, "failed to list release configs at startup");
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => self.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "release config watch lagged, replaying every resource");
                        if let Err(err) = self.replay_all().await {
                            error!(error = %err, "failed to replay release configs after lag");
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.reconcile.shut_down();
        self.reload.shut_down();
        self.publish.shut_down();
        while workers.join_next().await.is_some() {}
        info!("dependency reconciliation controller stopped");
    }
}
