//! Event forwarder: provider lifecycle callbacks to published event subjects.
//!
//! Callbacks run inside the provider's domain call, so they only encode the
//! event and enqueue publish tasks. A single background worker drains the
//! queue in FIFO order, which keeps "primary then derived" ordering for the
//! subjects produced by one event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use cent_core::codec::{self, CodecError};
use cent_core::subject::events;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::publisher::EventPublisher;
use crate::provider::{DomainEvent, DomainProvider, EventKind};
use crate::service::config::ServerConfig;
use crate::service::worker::{BackgroundRunnable, BackgroundWorker, SubmitError, WorkerHandle};

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

/// Picks an extra subject for an event, if its transition calls for one.
pub type DeriveFn = fn(&DomainEvent) -> Option<&'static str>;

/// One domain event kind and the subject(s) it is published on.
#[derive(Debug, Clone, Copy)]
pub struct EventMapping {
    pub kind: EventKind,
    pub subject: &'static str,
    pub derive: Option<DeriveFn>,
}

impl EventMapping {
    const fn plain(kind: EventKind, subject: &'static str) -> Self {
        Self {
            kind,
            subject,
            derive: None,
        }
    }

    const fn derived(kind: EventKind, subject: &'static str, derive: DeriveFn) -> Self {
        Self {
            kind,
            subject,
            derive: Some(derive),
        }
    }

    /// Subjects for `event` in publication order: primary first, then derived.
    #[must_use]
    pub fn subjects_for(&self, event: &DomainEvent) -> Vec<&'static str> {
        let mut subjects = vec![self.subject];
        if let Some(extra) = self.derive.and_then(|derive| derive(event)) {
            subjects.push(extra);
        }
        subjects
    }

    /// Encodes `event` once and pairs the body with each of its subjects.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the event body cannot be encoded.
    pub fn tasks_for(&self, event: &DomainEvent) -> Result<Vec<PublishTask>, CodecError> {
        let payload = encode_body(event)?;
        Ok(self
            .subjects_for(event)
            .into_iter()
            .map(|subject| PublishTask {
                subject,
                payload: payload.clone(),
            })
            .collect())
    }
}

fn activated(_: &DomainEvent) -> Option<&'static str> {
    Some(events::SUBSCRIPTION_ACTIVATED)
}

fn deactivated(_: &DomainEvent) -> Option<&'static str> {
    Some(events::SUBSCRIPTION_DEACTIVATED)
}

fn active_transition(event: &DomainEvent) -> Option<&'static str> {
    match event {
        DomainEvent::SubscriptionUpdated { previous, current } => {
            match (previous.active, current.active) {
                (false, true) => Some(events::SUBSCRIPTION_ACTIVATED),
                (true, false) => Some(events::SUBSCRIPTION_DEACTIVATED),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Encodes the body published for `event`: the current snapshot, no wrapper.
///
/// # Errors
///
/// Returns [`CodecError`] if the snapshot cannot be serialized.
pub fn encode_body(event: &DomainEvent) -> Result<Bytes, CodecError> {
    fn enc<T: Serialize>(value: &T) -> Result<Bytes, CodecError> {
        codec::encode(value).map(Bytes::from)
    }
    match event {
        DomainEvent::CustomerAdded(c) | DomainEvent::CustomerRemoved(c) => enc(c),
        DomainEvent::CustomerUpdated { current, .. } => enc(current),
        DomainEvent::PlanAdded(p) | DomainEvent::PlanRemoved(p) => enc(p),
        DomainEvent::PlanUpdated { current, .. } => enc(current),
        DomainEvent::PriceAdded(p) | DomainEvent::PriceRemoved(p) => enc(p),
        DomainEvent::PriceUpdated { current, .. } => enc(current),
        DomainEvent::SubscriptionAdded(s) | DomainEvent::SubscriptionRemoved(s) => enc(s),
        DomainEvent::SubscriptionUpdated { current, .. } => enc(current),
        DomainEvent::SubscriptionUserAdded(u) | DomainEvent::SubscriptionUserRemoved(u) => enc(u),
    }
}

// ---------------------------------------------------------------------------
// Publish worker
// ---------------------------------------------------------------------------

/// One queued publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTask {
    pub subject: &'static str,
    pub payload: Bytes,
}

/// Counters shared between the callbacks and the publish worker.
#[derive(Debug, Default)]
pub struct ForwarderStats {
    published: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl ForwarderStats {
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Events lost before publication: queue full, worker stopped or unencodable.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct PublishRunnable {
    publisher: Arc<dyn EventPublisher>,
    stats: Arc<ForwarderStats>,
    last_logged: (u64, u64, u64),
}

impl PublishRunnable {
    fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.stats.published(),
            self.stats.failed(),
            self.stats.dropped(),
        )
    }
}

#[async_trait]
impl BackgroundRunnable for PublishRunnable {
    type Task = PublishTask;

    async fn run(&mut self, task: PublishTask) {
        match self.publisher.publish(task.subject, task.payload).await {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                debug!(subject = task.subject, "event published");
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(subject = task.subject, error = %e, "event publish failed");
            }
        }
    }

    async fn on_tick(&mut self) {
        let now = self.snapshot();
        if now != self.last_logged {
            let (published, failed, dropped) = now;
            info!(published, failed, dropped, "event forwarder stats");
            self.last_logged = now;
        }
    }

    async fn shutdown(&mut self) {
        let (published, failed, dropped) = self.snapshot();
        info!(published, failed, dropped, "event forwarder stopped");
    }
}

// ---------------------------------------------------------------------------
// EventForwarder
// ---------------------------------------------------------------------------

/// Bridges provider callbacks to an [`EventPublisher`].
pub struct EventForwarder {
    worker: BackgroundWorker<PublishRunnable>,
    stats: Arc<ForwarderStats>,
}

impl std::fmt::Debug for EventForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventForwarder")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl EventForwarder {
    /// Every event kind with its subject and derivation rule.
    #[must_use]
    pub fn mappings() -> Vec<EventMapping> {
        use EventKind as K;
        vec![
            EventMapping::plain(K::CustomerAdded, events::CUSTOMER_ADDED),
            EventMapping::plain(K::CustomerRemoved, events::CUSTOMER_REMOVED),
            EventMapping::plain(K::CustomerUpdated, events::CUSTOMER_UPDATED),
            EventMapping::plain(K::PlanAdded, events::PLAN_ADDED),
            EventMapping::plain(K::PlanRemoved, events::PLAN_REMOVED),
            EventMapping::plain(K::PlanUpdated, events::PLAN_UPDATED),
            EventMapping::plain(K::PriceAdded, events::PRICE_ADDED),
            EventMapping::plain(K::PriceRemoved, events::PRICE_REMOVED),
            EventMapping::plain(K::PriceUpdated, events::PRICE_UPDATED),
            EventMapping::derived(K::SubscriptionAdded, events::SUBSCRIPTION_ADDED, activated),
            EventMapping::derived(
                K::SubscriptionRemoved,
                events::SUBSCRIPTION_REMOVED,
                deactivated,
            ),
            EventMapping::derived(
                K::SubscriptionUpdated,
                events::SUBSCRIPTION_UPDATED,
                active_transition,
            ),
            EventMapping::plain(K::SubscriptionUserAdded, events::SUBSCRIPTION_USER_ADDED),
            EventMapping::plain(K::SubscriptionUserRemoved, events::SUBSCRIPTION_USER_REMOVED),
        ]
    }

    /// Publish tasks for `event`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the event body cannot be encoded.
    pub fn route(event: &DomainEvent) -> Result<Vec<PublishTask>, CodecError> {
        let kind = event.kind();
        match Self::mappings().into_iter().find(|m| m.kind == kind) {
            Some(mapping) => mapping.tasks_for(event),
            None => Ok(Vec::new()),
        }
    }

    /// Starts the publish worker.
    #[must_use]
    pub fn start(publisher: Arc<dyn EventPublisher>, config: &ServerConfig) -> Self {
        let stats = Arc::new(ForwarderStats::default());
        let runnable = PublishRunnable {
            publisher,
            stats: Arc::clone(&stats),
            last_logged: (0, 0, 0),
        };
        let worker = BackgroundWorker::start(
            runnable,
            config.event_queue_capacity,
            config.event_stats_interval,
        );
        Self { worker, stats }
    }

    /// Registers one callback per mapping with `provider`.
    pub fn attach(&self, provider: &dyn DomainProvider) {
        for mapping in Self::mappings() {
            let queue = self.worker.handle();
            let stats = Arc::clone(&self.stats);
            provider.on_event(
                mapping.kind,
                Arc::new(move |event: &DomainEvent| enqueue(&mapping, &queue, &stats, event)),
            );
        }
        debug!(kinds = EventKind::ALL.len(), "event forwarder attached");
    }

    #[must_use]
    pub fn stats(&self) -> Arc<ForwarderStats> {
        Arc::clone(&self.stats)
    }

    /// Publishes everything already queued, then stops the worker.
    pub async fn stop(&mut self) {
        self.worker.stop().await;
    }
}

fn enqueue(
    mapping: &EventMapping,
    queue: &WorkerHandle<PublishTask>,
    stats: &ForwarderStats,
    event: &DomainEvent,
) {
    let tasks = match mapping.tasks_for(event) {
        Ok(tasks) => tasks,
        Err(e) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            error!(subject = mapping.subject, error = %e, "event body unserializable");
            return;
        }
    };

    // A derived subject is never published without its primary.
    let total = tasks.len();
    for (submitted, task) in tasks.into_iter().enumerate() {
        let subject = task.subject;
        if let Err(e) = queue.try_submit(task) {
            let skipped = (total - submitted) as u64;
            stats.dropped.fetch_add(skipped, Ordering::Relaxed);
            match e {
                SubmitError::Full => warn!(subject, skipped, "event queue full, event dropped"),
                SubmitError::Stopped => {
                    warn!(subject, skipped, "event forwarder stopped, event dropped");
                }
            }
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
