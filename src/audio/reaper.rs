use serenity::model::id::GuildId;
use std::{sync::Arc, time::Duration};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::{
    now_playing::{SessionChange, SessionObserver, TeardownReason},
    session::{SessionState, SessionStore},
    transport::VoiceGateway,
};

/// Disconnects sessions nobody is listening to.
///
/// Two triggers share one teardown: a periodic sweep against an idle
/// threshold, and an immediate one when the voice channel loses its last
/// human.
pub struct IdleReaper {
    sessions: Arc<SessionStore>,
    gateway: Arc<dyn VoiceGateway>,
    observer: Arc<dyn SessionObserver>,
    idle_timeout: Duration,
    sweep_interval: Duration,
}

impl IdleReaper {
    pub fn new(
        sessions: Arc<SessionStore>,
        gateway: Arc<dyn VoiceGateway>,
        observer: Arc<dyn SessionObserver>,
        idle_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            sessions,
            gateway,
            observer,
            idle_timeout,
            sweep_interval,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = time::interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Primer tick es inmediato
        ticker.tick().await;

        info!(
            "🧹 Idle reaper started (threshold {:?}, every {:?})",
            self.idle_timeout, self.sweep_interval
        );

        loop {
            ticker.tick().await;
            let reaped = self.sweep().await;
            if !reaped.is_empty() {
                debug!("🧹 Reaped {} idle session(s)", reaped.len());
            }
        }
    }

    /// One pass over every connected guild, never waiting on a session lock.
    /// Returns the guilds torn down.
    pub async fn sweep(&self) -> Vec<GuildId> {
        let mut reaped = Vec::new();
        let now = Instant::now();

        for guild_id in self.gateway.connected_guilds() {
            let Some(transport) = self.gateway.transport(guild_id) else {
                continue;
            };
            let session = self.sessions.get_or_create(guild_id);
            // A locked session is mid-transition, so not idle.
            let Ok(mut state) = session.try_lock() else {
                debug!("Guild {}: session busy, skipped by idle sweep", guild_id);
                continue;
            };

            if transport.is_active().await {
                state.touch(now);
                continue;
            }

            match state.last_activity {
                // Connected but never stamped: start the clock now.
                None => state.touch(now),
                Some(last) if now.saturating_duration_since(last) >= self.idle_timeout => {
                    self.teardown_locked(&mut state, TeardownReason::Inactivity).await;
                    reaped.push(guild_id);
                }
                Some(_) => {}
            }
        }

        reaped
    }

    /// Event path: tears down at once when no human is left with the bot.
    pub async fn on_participant_left(&self, guild_id: GuildId, humans_remaining: usize) -> bool {
        if humans_remaining > 0 || self.gateway.transport(guild_id).is_none() {
            return false;
        }

        info!("🚪 Guild {}: voice channel is empty", guild_id);
        self.teardown(guild_id, TeardownReason::ChannelEmpty).await;
        true
    }

    pub async fn teardown(&self, guild_id: GuildId, reason: TeardownReason) {
        let session = self.sessions.get_or_create(guild_id);
        let mut state = session.lock().await;
        self.teardown_locked(&mut state, reason).await;
    }

    async fn teardown_locked(&self, state: &mut SessionState, reason: TeardownReason) {
        let guild_id = state.guild_id;

        // Anything already in flight for this session is now stale.
        state.bump_epoch();
        state.radio_enabled = false;
        state.radio_next = None;
        state.radio_failures = 0;
        state.last_activity = None;
        state.queue.clear();
        state.set_idle();

        if let Some(transport) = self.gateway.transport(guild_id) {
            if transport.is_active().await {
                transport.stop().await;
            }
        }
        self.gateway.disconnect(guild_id).await;

        info!("👋 Guild {}: session torn down ({})", guild_id, reason);
        self.observer.notify(guild_id, SessionChange::TornDown(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::QueuedTrack,
        session::PlaybackState,
        testing::{FakeGateway, RecordingObserver},
    };
    use crate::sources::TrackInfo;
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(3);
    const THIRTY_MINUTES: Duration = Duration::from_secs(30 * 60);

    struct Fixture {
        reaper: IdleReaper,
        sessions: Arc<SessionStore>,
        gateway: Arc<FakeGateway>,
        observer: Arc<RecordingObserver>,
    }

    fn fixture() -> Fixture {
        let sessions = Arc::new(SessionStore::new(10, 10));
        let gateway = Arc::new(FakeGateway::default());
        let observer = Arc::new(RecordingObserver::default());
        let reaper = IdleReaper::new(
            sessions.clone(),
            gateway.clone(),
            observer.clone(),
            THIRTY_MINUTES,
            Duration::from_secs(60),
        );
        Fixture {
            reaper,
            sessions,
            gateway,
            observer,
        }
    }

    async fn busy_session(f: &Fixture) {
        let session = f.sessions.get_or_create(GUILD);
        let mut state = session.lock().await;
        state.radio_enabled = true;
        state.radio_next = Some(TrackInfo::new("next", Some("next.mp3".into())));
        state
            .queue
            .enqueue(QueuedTrack::new(TrackInfo::new("q", None), None, None))
            .unwrap();
        state.start_track(TrackInfo::new("now", None), true, None, Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_tears_down_after_threshold() {
        let f = fixture();
        f.gateway.connect_fake(GUILD);
        busy_session(&f).await;

        time::advance(THIRTY_MINUTES - Duration::from_secs(1)).await;
        assert!(f.reaper.sweep().await.is_empty());

        time::advance(Duration::from_secs(1)).await;
        assert_eq!(f.reaper.sweep().await, vec![GUILD]);

        let snapshot = f.sessions.snapshot(GUILD).await.unwrap();
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(!snapshot.radio_enabled);
        assert!(snapshot.radio_next.is_none());
        assert!(snapshot.queue.is_empty());
        assert_eq!(f.gateway.disconnected(), vec![GUILD]);
        assert_eq!(
            f.observer.changes_for(GUILD),
            vec![SessionChange::TornDown(TeardownReason::Inactivity)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn active_playback_refreshes_activity() {
        let f = fixture();
        f.gateway.connect_fake(GUILD).set_active(true);
        busy_session(&f).await;

        time::advance(THIRTY_MINUTES * 2).await;
        assert!(f.reaper.sweep().await.is_empty());

        let last = f.sessions.get(GUILD).unwrap().lock().await.last_activity;
        assert_eq!(last, Some(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_skips_a_busy_guild_and_reaps_the_rest() {
        let f = fixture();
        let other = GuildId::new(4);
        f.gateway.connect_fake(GUILD);
        f.gateway.connect_fake(other);
        busy_session(&f).await;
        f.sessions.get_or_create(other).lock().await.touch(Instant::now());

        time::advance(THIRTY_MINUTES).await;
        let held = f.sessions.get(GUILD).unwrap().lock_owned().await;
        assert_eq!(f.reaper.sweep().await, vec![other]);

        drop(held);
        assert_eq!(f.reaper.sweep().await, vec![GUILD]);
    }

    #[tokio::test(start_paused = true)]
    async fn unstamped_session_gets_a_full_grace_period() {
        let f = fixture();
        f.gateway.connect_fake(GUILD);

        assert!(f.reaper.sweep().await.is_empty());
        time::advance(THIRTY_MINUTES / 2).await;
        assert!(f.reaper.sweep().await.is_empty());
        time::advance(THIRTY_MINUTES / 2).await;
        assert_eq!(f.reaper.sweep().await, vec![GUILD]);
    }

    #[tokio::test(start_paused = true)]
    async fn last_human_leaving_tears_down_immediately() {
        let f = fixture();
        f.gateway.connect_fake(GUILD).set_active(true);
        busy_session(&f).await;

        assert!(!f.reaper.on_participant_left(GUILD, 1).await);
        assert!(f.gateway.disconnected().is_empty());

        assert!(f.reaper.on_participant_left(GUILD, 0).await);
        assert_eq!(f.gateway.disconnected(), vec![GUILD]);
        assert_eq!(
            f.observer.changes_for(GUILD),
            vec![SessionChange::TornDown(TeardownReason::ChannelEmpty)]
        );

        // Not connected anymore: nothing left to tear down.
        assert!(!f.reaper.on_participant_left(GUILD, 0).await);
    }

    #[tokio::test]
    async fn teardown_invalidates_in_flight_work() {
        let f = fixture();
        let transport = f.gateway.connect_fake(GUILD);
        transport.set_active(true);
        busy_session(&f).await;
        let before = f.sessions.get(GUILD).unwrap().lock().await.epoch;

        f.reaper.teardown(GUILD, TeardownReason::Requested).await;

        let state = f.sessions.get(GUILD).unwrap();
        let state = state.lock().await;
        assert!(state.epoch > before);
        assert!(state.last_activity.is_none());
        assert_eq!(state.previous().map(|t| t.title.as_str()), Some("now"));
    }
}
