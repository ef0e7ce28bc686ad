//! Feeds app lifecycle events into a [`SessionLock`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::session::SessionLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppLifecycleEvent {
    Background,
    Foreground,
}

/// Spawns a task that applies each event to `lock` in order. The task ends
/// when every sender is dropped.
pub fn spawn_lifecycle_monitor(
    lock: Arc<SessionLock>,
    mut events: mpsc::Receiver<AppLifecycleEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("lifecycle monitor started");
        while let Some(event) = events.recv().await {
            match event {
                AppLifecycleEvent::Background => lock.on_background(),
                AppLifecycleEvent::Foreground => {
                    lock.on_foreground();
                }
            }
        }
        debug!("lifecycle event source closed; monitor stopped");
    })
}
