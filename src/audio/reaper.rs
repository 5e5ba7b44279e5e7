use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::manager::SessionManager;

/// Periodically disconnects sessions idling on a voice connection.
///
/// A session is reaped when it is `Idle`, still connected and has an empty
/// queue at the moment of the sweep. The check runs under the session lock, so
/// a `play` that lands concurrently either wins and keeps the session alive,
/// or finds it `Disconnected` and starts over on a fresh one.
pub struct InactivityReaper {
    manager: Arc<SessionManager>,
    period: Duration,
}

impl InactivityReaper {
    pub fn new(manager: Arc<SessionManager>, period: Duration) -> Self {
        Self { manager, period }
    }

    /// One pass over every session. Returns how many were stopped.
    pub async fn sweep(&self) -> usize {
        let mut reaped = 0;

        for session in self.manager.sessions() {
            if session.stop_if_idle().await {
                self.manager.remove_session(&session);
                info!(guild_id = %session.guild_id(), "💤 Sesión inactiva desconectada");
                reaped += 1;
            }
        }

        if reaped > 0 {
            debug!("🧹 Barrido completado: {} sesiones cerradas", reaped);
        }
        reaped
    }

    /// Runs sweeps every period until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
            info!("⏱️ Reaper de inactividad cada {:?}", self.period);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("🛑 Reaper de inactividad detenido");
                        break;
                    }
                    _ = interval.tick() => {
                        self.sweep().await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        session::SessionState,
        testing::{guild, wait_until, Harness},
    };
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    async fn idle_session(h: &Harness, n: u64) {
        let session = h.manager.get_or_create(guild(n));
        session.play(h.request("a")).await.unwrap();
        h.sink.finish(guild(n));
        wait_until(|| session.state() == SessionState::Idle).await;
    }

    #[tokio::test]
    async fn test_sweep_reaps_only_idle_connected_sessions() {
        let h = Harness::new();
        idle_session(&h, 1).await;

        let busy = h.manager.get_or_create(guild(2));
        busy.play(h.request("b")).await.unwrap();

        // Never connected, nothing to reap
        h.manager.get_or_create(guild(3));

        let reaper = InactivityReaper::new(h.manager.clone(), Duration::from_secs(60));
        assert_eq!(reaper.sweep().await, 1);

        assert!(h.manager.get(guild(1)).is_none());
        assert!(h.manager.get(guild(2)).is_some());
        assert!(h.manager.get(guild(3)).is_some());
        assert_eq!(h.transport.leaves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweep_spares_idle_session_with_queue() {
        let h = Harness::new();
        idle_session(&h, 1).await;
        h.manager
            .get(guild(1))
            .unwrap()
            .enqueue("later".into(), crate::audio::testing::text_channel())
            .await
            .unwrap();

        let reaper = InactivityReaper::new(h.manager.clone(), Duration::from_secs(60));
        assert_eq!(reaper.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_play_after_reap_reconnects() {
        let h = Harness::new();
        idle_session(&h, 1).await;
        InactivityReaper::new(h.manager.clone(), Duration::from_secs(60))
            .sweep()
            .await;

        h.manager.play(guild(1), h.request("again")).await.unwrap();

        assert_eq!(
            h.manager.get(guild(1)).unwrap().state(),
            SessionState::Playing
        );
        assert_eq!(h.transport.joins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_reaper_sweeps_each_period_until_cancelled() {
        let h = Harness::new();
        idle_session(&h, 1).await;

        let shutdown = CancellationToken::new();
        let handle =
            InactivityReaper::new(h.manager.clone(), Duration::from_secs(60)).spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(h.manager.get(guild(1)).is_some());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(h.manager.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
