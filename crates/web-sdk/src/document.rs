//! Live document — the element tree behind a lock plus the document-level
//! click-listener registry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::dom::{DomTree, ElementId};

/// A click observed at the document root.
#[derive(Debug, Clone)]
pub struct ClickEvent {
    pub target: ElementId,
    pub timestamp: DateTime<Utc>,
}

/// Handle returned by [`Document::add_click_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A document-level click handler. Handlers may be asynchronous; the returned
/// future owns everything it needs.
pub trait ClickListener: Send + Sync {
    fn on_click(&self, event: ClickEvent) -> BoxFuture<'static, ()>;
}

impl<F> ClickListener for F
where
    F: Fn(ClickEvent) -> BoxFuture<'static, ()> + Send + Sync,
{
    fn on_click(&self, event: ClickEvent) -> BoxFuture<'static, ()> {
        self(event)
    }
}

pub struct Document {
    tree: RwLock<DomTree>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ClickListener>)>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("elements", &self.tree.read().len())
            .field("click_listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DomTree::default())
    }
}

impl Document {
    pub fn new(tree: DomTree) -> Self {
        Self {
            tree: RwLock::new(tree),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Runs `f` against the current tree.
    pub fn read<R>(&self, f: impl FnOnce(&DomTree) -> R) -> R {
        f(&self.tree.read())
    }

    /// Mutates the tree, e.g. to render elements after the engine started.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> R {
        f(&mut self.tree.write())
    }

    pub fn add_click_listener(&self, listener: Arc<dyn ClickListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        debug!(listener = id.0, "Click listener attached");
        id
    }

    /// Returns `false` if the listener was not registered.
    pub fn remove_click_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        let removed = listeners.len() != before;
        if removed {
            debug!(listener = id.0, "Click listener removed");
        }
        removed
    }

    pub fn click_listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Delivers a click on `target` to every registered listener and resolves
    /// once all of their handlers have completed.
    pub async fn dispatch_click(&self, target: ElementId) {
        let event = ClickEvent {
            target,
            timestamp: Utc::now(),
        };
        let pending: Vec<BoxFuture<'static, ()>> = {
            let listeners = self.listeners.lock();
            listeners
                .iter()
                .map(|(_, l)| l.on_click(event.clone()))
                .collect()
        };
        debug!(target = ?target, listeners = pending.len(), "Dispatching click");
        join_all(pending).await;
    }
}
