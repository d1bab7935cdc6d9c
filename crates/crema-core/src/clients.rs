//! Client windows controlled by the worker.

use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

/// An open page of the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowClient {
    pub id: String,
    pub url: Url,
    pub focused: bool,
    /// Whether the active worker controls this window.
    pub controlled: bool,
}

/// Window management capability of the runtime.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// All window clients, in the order they were opened.
    async fn match_all(&self) -> Result<Vec<WindowClient>>;

    /// Bring a window to the foreground.
    async fn focus(&self, id: &str) -> Result<WindowClient>;

    /// Open a new window at `url`.
    async fn open_window(&self, url: &Url) -> Result<WindowClient>;

    /// Take control of every open window. Returns how many are controlled.
    async fn claim(&self) -> Result<usize>;
}

/// In-process window registry.
#[derive(Debug, Default)]
pub struct MemoryClientRegistry {
    windows: Mutex<Vec<WindowClient>>,
}

impl MemoryClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a window opened by the user.
    pub fn attach(&self, url: Url) -> WindowClient {
        let client = WindowClient {
            id: Uuid::new_v4().to_string(),
            url,
            focused: false,
            controlled: false,
        };
        self.lock().push(client.clone());
        debug!("Attached client {} at {}", client.id, client.url);
        client
    }

    /// Forget a closed window. Returns `false` if it was unknown.
    pub fn detach(&self, id: &str) -> bool {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|w| w.id != id);
        windows.len() != before
    }

    pub fn snapshot(&self) -> Vec<WindowClient> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<WindowClient>> {
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ClientRegistry for MemoryClientRegistry {
    async fn match_all(&self) -> Result<Vec<WindowClient>> {
        Ok(self.snapshot())
    }

    async fn focus(&self, id: &str) -> Result<WindowClient> {
        let mut windows = self.lock();
        let index = windows
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| WorkerError::Client {
                message: format!("no window with id {}", id),
            })?;
        for (i, window) in windows.iter_mut().enumerate() {
            window.focused = i == index;
        }
        Ok(windows[index].clone())
    }

    async fn open_window(&self, url: &Url) -> Result<WindowClient> {
        let mut windows = self.lock();
        for window in windows.iter_mut() {
            window.focused = false;
        }
        let client = WindowClient {
            id: Uuid::new_v4().to_string(),
            url: url.clone(),
            focused: true,
            controlled: true,
        };
        windows.push(client.clone());
        info!("Opened window {} at {}", client.id, client.url);
        Ok(client)
    }

    async fn claim(&self) -> Result<usize> {
        let mut windows = self.lock();
        for window in windows.iter_mut() {
            window.controlled = true;
        }
        Ok(windows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_focus_moves_focus() {
        let registry = MemoryClientRegistry::new();
        let a = registry.attach(url("https://portal.example/"));
        let b = registry.attach(url("https://portal.example/schedule"));

        registry.focus(&a.id).await.unwrap();
        let focused = registry.focus(&b.id).await.unwrap();
        assert!(focused.focused);

        let windows = registry.match_all().await.unwrap();
        assert_eq!(windows.iter().filter(|w| w.focused).count(), 1);
        assert_eq!(windows[1].id, b.id);
    }

    #[tokio::test]
    async fn test_focus_unknown_window_fails() {
        let registry = MemoryClientRegistry::new();
        let err = registry.focus("missing").await.unwrap_err();
        assert!(matches!(err, WorkerError::Client { .. }));
    }

    #[tokio::test]
    async fn test_open_window_and_claim() {
        let registry = MemoryClientRegistry::new();
        registry.attach(url("https://portal.example/"));
        let opened = registry.open_window(&url("https://portal.example/inbox")).await.unwrap();
        assert!(opened.focused);

        assert_eq!(registry.claim().await.unwrap(), 2);
        assert!(registry.snapshot().iter().all(|w| w.controlled));
    }

    #[test]
    fn test_detach() {
        let registry = MemoryClientRegistry::new();
        let a = registry.attach(url("https://portal.example/"));
        assert!(registry.detach(&a.id));
        assert!(!registry.detach(&a.id));
        assert!(registry.snapshot().is_empty());
    }
}
