//! Engine facade: wires the transport, tip store and polling loop together
//! and hands out a cloneable handle for readers.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::Result;
use crate::live_ai::LiveAiSwitch;
use crate::poller::PollingLoop;
use crate::tips::{TipGenerator, TipStore};
use crate::transport::{TelemetryTransport, Transport};
use crate::types::ReadModel;

pub struct Engine;

impl Engine {
    /// Build the configured transport and start polling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &Config, generator: Arc<dyn TipGenerator>) -> Result<EngineHandle> {
        let transport = Transport::from_config(&config.telemetry)?;
        Ok(Self::start_with_transport(transport, config, generator))
    }

    /// Start polling over a caller-supplied transport.
    pub fn start_with_transport<T>(
        transport: T,
        config: &Config,
        generator: Arc<dyn TipGenerator>,
    ) -> EngineHandle
    where
        T: TelemetryTransport + 'static,
    {
        let store = Arc::new(TipStore::open(config.tips.store_path()));
        let live_ai = LiveAiSwitch::new(Arc::clone(&store), generator, config.tips.policy);

        let (poller, model) = PollingLoop::new(transport, &config.polling, store, live_ai.clone());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poller.run(cancel.clone()));

        EngineHandle {
            model,
            live_ai,
            cancel,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

/// Reader-side handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    model: watch::Receiver<Arc<ReadModel>>,
    live_ai: LiveAiSwitch,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EngineHandle {
    /// The most recently published read model.
    pub fn read_model(&self) -> Arc<ReadModel> {
        Arc::clone(&self.model.borrow())
    }

    /// A receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ReadModel>> {
        self.model.clone()
    }

    pub fn live_ai_enabled(&self) -> bool {
        self.live_ai.is_enabled()
    }

    /// Flip the live-AI flag for the given song; returns the new value.
    pub async fn toggle_live_ai(&self, song: &str, artist: &str) -> bool {
        self.live_ai.toggle(song, artist).await
    }

    /// Token that stops the polling loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signal the loop to stop without waiting for it.
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }

    /// Stop the loop and wait until it has released the transport.
    ///
    /// Safe to call from several handles; only the first one waits.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Polling task ended abnormally");
            }
        }
    }
}
