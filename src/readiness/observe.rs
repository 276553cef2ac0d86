//! Structural change notifications from the host document.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Kind of node added to the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Script,
    Element,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedNode {
    pub kind: NodeKind,
    /// Tag name or script source, for logging only.
    pub name: String,
}

impl AddedNode {
    pub fn script(src: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Script,
            name: src.into(),
        }
    }

    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Element,
            name: tag.into(),
        }
    }
}

/// One batch of structural additions, delivered together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub added: Vec<AddedNode>,
}

impl ChangeBatch {
    pub fn new(added: Vec<AddedNode>) -> Self {
        Self { added }
    }

    pub fn adds_script(&self) -> bool {
        self.added.iter().any(|n| n.kind == NodeKind::Script)
    }
}

pub type ChangeCallback = Arc<dyn Fn(&ChangeBatch) + Send + Sync>;

/// Live registration with a [`ChangeSource`]. Dropping it also unsubscribes.
pub trait Subscription: Send {
    fn dispose(self: Box<Self>);
}

/// Something that reports structural additions to a mutable host document.
pub trait ChangeSource: Send + Sync {
    fn observe(&self, callback: ChangeCallback) -> Box<dyn Subscription>;
}

type Subscribers = Arc<Mutex<BTreeMap<u64, ChangeCallback>>>;

/// In-memory document change feed.
///
/// Host code calls [`DocumentFeed::publish`] for each batch of added nodes;
/// every live subscriber is invoked synchronously in subscription order.
#[derive(Clone, Default)]
pub struct DocumentFeed {
    subscribers: Subscribers,
    next_id: Arc<AtomicU64>,
}

impl DocumentFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, batch: &ChangeBatch) {
        // snapshot so callbacks may subscribe or dispose without deadlocking
        let callbacks: Vec<ChangeCallback> = match self.subscribers.lock() {
            Ok(subs) => subs.values().cloned().collect(),
            Err(_) => return,
        };
        for cb in callbacks {
            cb(batch);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl fmt::Debug for DocumentFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentFeed")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ChangeSource for DocumentFeed {
    fn observe(&self, callback: ChangeCallback) -> Box<dyn Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.insert(id, callback);
        }
        Box::new(FeedSubscription {
            id,
            subscribers: Arc::clone(&self.subscribers),
        })
    }
}

struct FeedSubscription {
    id: u64,
    subscribers: Subscribers,
}

impl Subscription for FeedSubscription {
    fn dispose(self: Box<Self>) {
        // removal happens in Drop
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.remove(&self.id);
        }
    }
}
