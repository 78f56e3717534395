//! Notification Bus
//!
//! A typed publish/subscribe mechanism with a fixed set of topics. It is the
//! seam that lets resource ownership and scene structure react to each
//! other's lifecycle events without a hard dependency cycle: neither the
//! resource manager nor the scene graph calls into the other, both only see
//! [`Message`] values.
//!
//! Subscribers are shared `Arc<Mutex<dyn Subscriber>>` values; the bus holds
//! only `Weak` references, so subscribing creates no ownership cycle and a
//! dropped subscriber is pruned lazily. `publish` is synchronous on the
//! calling thread and iterates over a snapshot of the subscriber list, so a
//! `notify` handler may publish, subscribe, or unsubscribe re-entrantly
//! without corrupting the set.
//!
//! Publishing discipline: mutating operations on a shared component return
//! their lifecycle message instead of publishing while their own lock is
//! held; the owning layer publishes after unlocking. A subscriber whose lock
//! is held further up the current call stack is skipped: by construction it
//! is the publisher, and its own bookkeeping was applied inline before the
//! message was handed out.

use std::sync::{Arc, Weak};

use glam::Mat4;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::registry::ResourceId;
use crate::resources::mesh::InstanceId;

/// Fixed enumeration of message channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Resource-lifecycle events: deletions, remaps.
    Resources,
    /// Scene-originated events: instance updates and releases.
    Scene,
}

const TOPIC_COUNT: usize = 2;

impl Topic {
    #[inline]
    fn index(self) -> usize {
        match self {
            Topic::Resources => 0,
            Topic::Scene => 1,
        }
    }
}

/// A resource-lifecycle event. Payloads are fixed at construction time and
/// immutable once published.
#[derive(Debug, Clone)]
pub enum Message {
    /// A model and the meshes its template referenced were destroyed.
    ModelDeleted {
        model: ResourceId,
        meshes: FxHashSet<ResourceId>,
    },
    /// A material left the dense array. Holders of `removed_index` fall back
    /// to the default material; holders of `transfer_index` (present exactly
    /// when a compaction swap occurred) rewrite to `removed_index`.
    MaterialDeleted {
        removed_index: u32,
        transfer_index: Option<u32>,
    },
    /// A texture left the bindless-handle array; same fallback/rewrite rule,
    /// against the per-slot default texture indices.
    TextureDeleted {
        removed_index: u32,
        transfer_index: Option<u32>,
    },
    /// A scene node pushed fresh per-instance data for its mesh slot.
    MeshInstanceUpdate {
        mesh: ResourceId,
        object: ResourceId,
        instance: InstanceId,
        material_index: u32,
        transform: Mat4,
    },
    /// A scene node released its mesh instance slot.
    RemoveMeshInstance {
        mesh: ResourceId,
        instance: InstanceId,
    },
    /// An imported asset's material table was remapped; non-overridden
    /// instances of `mesh` adopt the new index.
    MaterialRemap {
        mesh: ResourceId,
        new_material_index: u32,
    },
}

/// Receives published messages. Implementors match exhaustively and ignore
/// the variants they do not care about.
pub trait Subscriber {
    fn notify(&mut self, message: &Message);
}

/// Shared subscriber handle as stored by callers.
pub type SharedSubscriber = Arc<Mutex<dyn Subscriber>>;

type WeakSubscriber = Weak<Mutex<dyn Subscriber>>;

struct BusInner {
    topics: Mutex<[Vec<WeakSubscriber>; TOPIC_COUNT]>,
}

/// Cheaply clonable handle to the shared bus.
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

fn same_subscriber(weak: &WeakSubscriber, subscriber: &SharedSubscriber) -> bool {
    // Compare data pointers only; vtable pointers are not stable enough for
    // identity across crates.
    std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(subscriber))
}

impl NotificationBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                topics: Mutex::new([Vec::new(), Vec::new()]),
            }),
        }
    }

    /// Adds `subscriber` to `topic`. Idempotent.
    pub fn subscribe(&self, topic: Topic, subscriber: &SharedSubscriber) {
        let mut topics = self.inner.topics.lock();
        let list = &mut topics[topic.index()];
        if !list.iter().any(|weak| same_subscriber(weak, subscriber)) {
            list.push(Arc::downgrade(subscriber));
        }
    }

    /// Removes `subscriber` from `topic`. Idempotent.
    pub fn unsubscribe(&self, topic: Topic, subscriber: &SharedSubscriber) {
        let mut topics = self.inner.topics.lock();
        topics[topic.index()].retain(|weak| !same_subscriber(weak, subscriber));
    }

    /// Synchronously delivers `message` to every current subscriber of
    /// `topic`, in unspecified order.
    pub fn publish(&self, topic: Topic, message: &Message) {
        // Snapshot under the lock, deliver outside it: handlers may publish
        // or (un)subscribe re-entrantly.
        let snapshot: Vec<WeakSubscriber> = {
            let mut topics = self.inner.topics.lock();
            let list = &mut topics[topic.index()];
            list.retain(|weak| weak.strong_count() > 0);
            list.clone()
        };

        for weak in snapshot {
            let Some(subscriber) = weak.upgrade() else {
                continue;
            };
            match subscriber.try_lock() {
                Some(mut guard) => guard.notify(message),
                None => {
                    // Held further up this call stack: the publisher itself.
                    log::trace!("skipping re-entrant notify for {message:?}");
                }
            }
        }
    }

    /// Current live subscriber count for a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.topics.lock()[topic.index()]
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
