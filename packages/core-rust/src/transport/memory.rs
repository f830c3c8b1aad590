//! In-process transport with NATS-like delivery semantics.
//!
//! - Plain subscribers on a subject each receive every message (fan-out).
//! - Each queue group on a subject receives every message once, delivered to
//!   one randomly chosen live member.
//! - Requests use a unique `_INBOX.<uuid>` reply subject and fail fast with
//!   `NoResponders` when nobody listens on the request subject.
//!
//! Subjects are matched exactly; wildcards are not supported.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{Message, Subscription, Transport, TransportError};

/// Default per-subscription channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

const INBOX_PREFIX: &str = "_INBOX.";

#[derive(Debug)]
struct Member {
    id: u64,
    tx: mpsc::Sender<Message>,
}

#[derive(Debug, Default)]
struct SubjectEntry {
    plain: Vec<Member>,
    groups: HashMap<String, Vec<Member>>,
}

impl SubjectEntry {
    fn is_empty(&self) -> bool {
        self.plain.is_empty() && self.groups.values().all(Vec::is_empty)
    }
}

#[derive(Debug)]
struct Bus {
    subjects: DashMap<String, SubjectEntry>,
    inboxes: DashMap<String, oneshot::Sender<Message>>,
    next_member_id: AtomicU64,
    capacity: usize,
}

impl Bus {
    /// Delivers `msg` and returns how many receivers accepted it.
    fn deliver(&self, msg: &Message) -> usize {
        if let Some((_, waiter)) = self.inboxes.remove(&msg.subject) {
            return usize::from(waiter.send(msg.clone()).is_ok());
        }

        let Some(entry) = self.subjects.get(&msg.subject) else {
            return 0;
        };

        let mut delivered = 0;
        for member in &entry.plain {
            if offer(member, msg) {
                delivered += 1;
            }
        }

        for (group, members) in &entry.groups {
            let live: Vec<&Member> = members.iter().filter(|m| !m.tx.is_closed()).collect();
            if live.is_empty() {
                continue;
            }
            let start = rand::rng().random_range(0..live.len());
            let accepted = (0..live.len())
                .map(|i| live[(start + i) % live.len()])
                .any(|member| member.tx.try_send(msg.clone()).is_ok());
            if accepted {
                delivered += 1;
            } else {
                warn!(subject = %msg.subject, group = %group, "every queue member is full, message dropped");
            }
        }

        delivered
    }

    fn remove_member(&self, subject: &str, group: Option<&str>, id: u64) {
        let mut now_empty = false;
        if let Some(mut entry) = self.subjects.get_mut(subject) {
            match group {
                Some(group) => {
                    if let Some(members) = entry.groups.get_mut(group) {
                        members.retain(|m| m.id != id);
                        if members.is_empty() {
                            entry.groups.remove(group);
                        }
                    }
                }
                None => entry.plain.retain(|m| m.id != id),
            }
            now_empty = entry.is_empty();
        }
        if now_empty {
            self.subjects.remove_if(subject, |_, entry| entry.is_empty());
        }
    }
}

fn offer(member: &Member, msg: &Message) -> bool {
    match member.tx.try_send(msg.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(subject = %msg.subject, "slow consumer, message dropped");
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Process-local publish/subscribe bus.
///
/// Cheap to clone; clones share the same bus, so several server instances and
/// clients built from clones of one transport see each other's traffic.
#[derive(Debug, Clone)]
pub struct InMemoryTransport {
    bus: Arc<Bus>,
}

impl InMemoryTransport {
    /// Creates a bus with [`DEFAULT_CAPACITY`] per subscription.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus whose subscriptions buffer up to `capacity` messages.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bus: Arc::new(Bus {
                subjects: DashMap::new(),
                inboxes: DashMap::new(),
                next_member_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Number of live subscriptions (plain and queue) on `subject`.
    #[must_use]
    pub fn subscriber_count(&self, subject: &str) -> usize {
        self.bus.subjects.get(subject).map_or(0, |entry| {
            entry.plain.len() + entry.groups.values().map(Vec::len).sum::<usize>()
        })
    }

    /// Number of requests still waiting for a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.bus.inboxes.len()
    }

    fn add_member(&self, subject: &str, group: Option<&str>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.bus.capacity);
        let id = self.bus.next_member_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut entry = self.bus.subjects.entry(subject.to_string()).or_default();
            let member = Member { id, tx };
            match group {
                Some(group) => entry.groups.entry(group.to_string()).or_default().push(member),
                None => entry.plain.push(member),
            }
        }
        debug!(subject = subject, group = ?group, member = id, "subscribed");

        let bus: Weak<Bus> = Arc::downgrade(&self.bus);
        let owned_subject = subject.to_string();
        let owned_group = group.map(str::to_string);
        Subscription::new(subject, rx).on_drop(move || {
            if let Some(bus) = bus.upgrade() {
                bus.remove_member(&owned_subject, owned_group.as_deref(), id);
            }
        })
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), TransportError> {
        let msg = Message {
            subject: subject.to_string(),
            reply: None,
            payload,
        };
        let receivers = self.bus.deliver(&msg);
        debug!(subject = subject, receivers = receivers, "published");
        Ok(())
    }

    async fn publish_with_reply(
        &self,
        subject: &str,
        reply: &str,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        let msg = Message {
            subject: subject.to_string(),
            reply: Some(reply.to_string()),
            payload,
        };
        self.bus.deliver(&msg);
        Ok(())
    }

    async fn request(
        &self,
        subject: &str,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<Message, TransportError> {
        let inbox = format!("{INBOX_PREFIX}{}", uuid::Uuid::new_v4().simple());
        let (tx, rx) = oneshot::channel();
        self.bus.inboxes.insert(inbox.clone(), tx);

        let msg = Message {
            subject: subject.to_string(),
            reply: Some(inbox.clone()),
            payload,
        };
        if self.bus.deliver(&msg) == 0 {
            self.bus.inboxes.remove(&inbox);
            return Err(TransportError::NoResponders {
                subject: subject.to_string(),
            });
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_elapsed) => {
                // A late reply finds no inbox and is dropped.
                self.bus.inboxes.remove(&inbox);
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = timeout.as_millis() as u64;
                Err(TransportError::Timeout {
                    subject: subject.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    async fn subscribe(&self, subject: &str) -> Result<Subscription, TransportError> {
        Ok(self.add_member(subject, None))
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
    ) -> Result<Subscription, TransportError> {
        Ok(self.add_member(subject, Some(group)))
    }
}
