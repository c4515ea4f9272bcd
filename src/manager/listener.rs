use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::StopError;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet, panic_message};
use crate::teardown::Stoppable;

/// Forwards bus events to the subscriber set until stopped.
pub(crate) struct EventListener {
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    grace: Duration,
}

impl EventListener {
    /// Spawns the listener task. Must be called inside a tokio runtime.
    pub(crate) fn start(bus: &Bus, subscribers: Vec<Arc<dyn Subscribe>>, grace: Duration) -> Self {
        let set = SubscriberSet::new(subscribers, bus.clone());
        let mut rx = bus.subscribe();
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => set.emit(Arc::new(ev)),
                                Err(TryRecvError::Lagged(_)) => continue,
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                    res = rx.recv() => match res {
                        Ok(ev) => set.emit(Arc::new(ev)),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event listener lagged; events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            set.shutdown().await;
        });

        Self {
            token,
            handle: Mutex::new(Some(handle)),
            grace,
        }
    }

    /// Cancels the listener without waiting.
    pub(crate) fn abort(&self) {
        self.token.cancel();
    }
}

#[async_trait]
impl Stoppable for EventListener {
    fn name(&self) -> &str {
        "events"
    }

    async fn stop(&self) -> Result<(), StopError> {
        self.token.cancel();
        let Some(handle) = self.handle.lock().take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.grace, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_panic() => Err(StopError::Panicked {
                info: panic_message(&*e.into_panic()),
            }),
            Ok(Err(e)) => Err(StopError::Failed {
                reason: e.to_string(),
            }),
            Err(_elapsed) => Err(StopError::GraceExceeded {
                grace: self.grace,
                stuck: vec!["events".to_string()],
            }),
        }
    }
}
