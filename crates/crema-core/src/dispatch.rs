//! Event dispatch table.
//!
//! Each [`EventKind`] maps to one handler. [`Dispatcher::standard`] wires the
//! worker's own handlers; entries can be replaced to wrap or stub them.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};
use crate::notifications::{ClickOutcome, NotificationClick};
use crate::push::{NotificationDescriptor, PushMessage};
use crate::request::WorkerRequest;
use crate::strategy::FetchResult;
use crate::worker::{ActivateReport, InstallReport, OfflineWorker, SyncOutcome};

/// An event delivered to a worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(WorkerRequest),
    Push(PushMessage),
    NotificationClick(NotificationClick),
    Sync { tag: String },
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install => EventKind::Install,
            WorkerEvent::Activate => EventKind::Activate,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Push(_) => EventKind::Push,
            WorkerEvent::NotificationClick(_) => EventKind::NotificationClick,
            WorkerEvent::Sync { .. } => EventKind::Sync,
        }
    }
}

/// Event type used as the dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Push,
    NotificationClick,
    Sync,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::Install,
        EventKind::Activate,
        EventKind::Fetch,
        EventKind::Push,
        EventKind::NotificationClick,
        EventKind::Sync,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Push => "push",
            EventKind::NotificationClick => "notificationclick",
            EventKind::Sync => "sync",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(FetchResult),
    NotificationShown(NotificationDescriptor),
    Clicked(ClickOutcome),
    Synced(SyncOutcome),
}

/// Boxed future returned by a handler. It owns everything it needs so the
/// host can run it past the caller's lifetime.
pub type HandlerFuture = BoxFuture<'static, Result<EventOutcome>>;

/// A registered handler.
pub type EventHandler = Arc<dyn Fn(Arc<OfflineWorker>, WorkerEvent) -> HandlerFuture + Send + Sync>;

/// Event kind → handler table.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, EventHandler>,
}

impl Dispatcher {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with the worker's handler for every event kind.
    pub fn standard() -> Self {
        let mut dispatcher = Self::new();
        for kind in EventKind::ALL {
            dispatcher.register(kind, Arc::new(standard_handler));
        }
        dispatcher
    }

    /// Register a handler, returning the one it replaces.
    pub fn register(&mut self, kind: EventKind, handler: EventHandler) -> Option<EventHandler> {
        self.handlers.insert(kind, handler)
    }

    /// Remove the handler for `kind`.
    pub fn unregister(&mut self, kind: EventKind) -> Option<EventHandler> {
        self.handlers.remove(&kind)
    }

    pub fn has(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Start the handler registered for the event's kind.
    pub fn dispatch(&self, worker: Arc<OfflineWorker>, event: WorkerEvent) -> HandlerFuture {
        let kind = event.kind();
        match self.handlers.get(&kind) {
            Some(handler) => handler(worker, event),
            None => Box::pin(async move { Err(WorkerError::NoHandler(kind.to_string())) }),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.handlers.keys().map(EventKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("Dispatcher").field("handlers", &kinds).finish()
    }
}

fn standard_handler(worker: Arc<OfflineWorker>, event: WorkerEvent) -> HandlerFuture {
    Box::pin(async move {
        match event {
            WorkerEvent::Install => worker.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => worker.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => worker.handle_fetch(&request).await.map(EventOutcome::Fetched),
            WorkerEvent::Push(message) => worker
                .handle_push(&message)
                .await
                .map(EventOutcome::NotificationShown),
            WorkerEvent::NotificationClick(click) => worker
                .handle_notification_click(&click)
                .await
                .map(EventOutcome::Clicked),
            WorkerEvent::Sync { tag } => worker.handle_sync(&tag).await.map(EventOutcome::Synced),
        }
    })
}
