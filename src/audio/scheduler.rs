use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use super::{player::PlaybackSequencer, transport::CompletionCallback};

/// Work handed from callbacks and timers back to the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A clip ended. `error` is set when it ended because of a failure.
    TrackFinished {
        guild_id: GuildId,
        epoch: u64,
        error: Option<String>,
    },
    /// A radio backoff elapsed.
    RadioRetry { guild_id: GuildId, epoch: u64 },
}

/// Thread-safe submission port into the async runtime.
///
/// The voice driver runs its event handlers on its own tasks/threads; they
/// only push a [`SessionEvent`] here and return. The dispatcher task picks the
/// event up and runs the sequencer logic.
#[derive(Clone)]
pub struct CompletionBridge {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl CompletionBridge {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Non-blocking; safe to call from any thread.
    pub fn submit(&self, event: SessionEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("⚠️ Dispatcher gone, dropping event: {:?}", e.0);
        }
    }

    /// Builds the callback handed to `VoiceTransport::play`.
    pub fn completion_callback(&self, guild_id: GuildId, epoch: u64) -> CompletionCallback {
        let bridge = self.clone();
        Box::new(move |error| {
            bridge.submit(SessionEvent::TrackFinished {
                guild_id,
                epoch,
                error,
            })
        })
    }

    /// Submits a `RadioRetry` once `delay` has elapsed.
    pub fn schedule_radio_retry(&self, guild_id: GuildId, epoch: u64, delay: Duration) {
        let bridge = self.clone();
        debug!("⏳ Guild {}: radio retry in {:?}", guild_id, delay);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bridge.submit(SessionEvent::RadioRetry { guild_id, epoch });
        });
    }
}

/// Drains the bridge, running each event on its own task. Events for the same
/// guild still run one after another because they serialize on the session
/// lock.
pub fn spawn_dispatcher(
    sequencer: Arc<PlaybackSequencer>,
    mut rx: mpsc::UnboundedReceiver<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let sequencer = sequencer.clone();
            tokio::spawn(async move {
                sequencer.handle_event(event).await;
            });
        }
        debug!("🛑 Session event dispatcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn callback_can_fire_from_a_plain_thread() {
        let (bridge, mut rx) = CompletionBridge::new();
        let callback = bridge.completion_callback(GuildId::new(7), 3);

        std::thread::spawn(move || callback(Some("decode error".into())))
            .join()
            .unwrap();

        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::TrackFinished {
                guild_id: GuildId::new(7),
                epoch: 3,
                error: Some("decode error".into()),
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn radio_retry_waits_for_its_delay() {
        let (bridge, mut rx) = CompletionBridge::new();
        bridge.schedule_radio_retry(GuildId::new(1), 9, Duration::from_secs(2));

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(rx.try_recv().is_err());

        assert_eq!(
            rx.recv().await,
            Some(SessionEvent::RadioRetry {
                guild_id: GuildId::new(1),
                epoch: 9,
            })
        );
    }
}
