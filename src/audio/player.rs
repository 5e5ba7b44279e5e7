use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{File, HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, info, warn};

use super::{AudioSink, OnComplete, PlaybackEnd, VoiceConnection};
use crate::sources::StreamRef;

struct ActiveTrack {
    id: u64,
    handle: TrackHandle,
    paused: bool,
}

/// [`AudioSink`] playing through the songbird call of each guild
pub struct SongbirdSink {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    tracks: Arc<DashMap<GuildId, ActiveTrack>>,
    next_id: AtomicU64,
    volume: f32,
}

impl SongbirdSink {
    pub fn new(songbird: Arc<Songbird>, volume: f32) -> Self {
        Self {
            songbird,
            http: reqwest::Client::new(),
            tracks: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            volume: volume.clamp(0.0, 2.0),
        }
    }

    fn input_for(&self, stream: &StreamRef) -> Input {
        match stream {
            StreamRef::Url(url) => HttpRequest::new(self.http.clone(), url.clone()).into(),
            StreamRef::File(path) => File::new(path.clone()).into(),
        }
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(
        &self,
        connection: &VoiceConnection,
        stream: &StreamRef,
        on_complete: OnComplete,
    ) -> Result<()> {
        let call = self
            .songbird
            .get(connection.guild_id)
            .ok_or_else(|| anyhow!("No hay conexión de voz para guild {}", connection.guild_id))?;

        let input = self.input_for(stream);
        let handle = {
            let mut call = call.lock().await;
            call.play_input(input)
        };

        if let Err(e) = handle.set_volume(self.volume) {
            warn!("⚠️ No se pudo ajustar el volumen: {}", e);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tracks.insert(
            connection.guild_id,
            ActiveTrack {
                id,
                handle: handle.clone(),
                paused: false,
            },
        );

        let notifier = TrackEndNotifier {
            guild_id: connection.guild_id,
            track_id: id,
            tracks: self.tracks.clone(),
            on_complete: Arc::new(Mutex::new(Some(on_complete))),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = handle.add_event(Event::Track(event), notifier.clone()) {
                self.tracks.remove_if(&connection.guild_id, |_, track| track.id == id);
                if let Err(stop_err) = handle.stop() {
                    debug!("Track ya detenido: {}", stop_err);
                }
                return Err(anyhow!("Error al agregar event handler: {}", e));
            }
        }

        debug!("🎵 Track enviado a songbird: {}", stream);
        Ok(())
    }

    fn pause(&self, connection: &VoiceConnection) -> Result<()> {
        let mut track = self
            .tracks
            .get_mut(&connection.guild_id)
            .ok_or_else(|| anyhow!("No hay track activo"))?;
        track.handle.pause()?;
        track.paused = true;
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    fn resume(&self, connection: &VoiceConnection) -> Result<()> {
        let mut track = self
            .tracks
            .get_mut(&connection.guild_id)
            .ok_or_else(|| anyhow!("No hay track activo"))?;
        track.handle.play()?;
        track.paused = false;
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    fn stop(&self, connection: &VoiceConnection) {
        if let Some((_, track)) = self.tracks.remove(&connection.guild_id) {
            if let Err(e) = track.handle.stop() {
                debug!("Track ya detenido: {}", e);
            }
        }
    }

    fn is_playing(&self, connection: &VoiceConnection) -> bool {
        self.tracks
            .get(&connection.guild_id)
            .is_some_and(|track| !track.paused)
    }

    fn is_paused(&self, connection: &VoiceConnection) -> bool {
        self.tracks
            .get(&connection.guild_id)
            .is_some_and(|track| track.paused)
    }
}

fn playback_end(mode: &PlayMode) -> PlaybackEnd {
    match mode {
        PlayMode::End => PlaybackEnd::Finished,
        PlayMode::Errored(_) => PlaybackEnd::Errored,
        _ => PlaybackEnd::Stopped,
    }
}

/// Relays the end of a songbird track to its completion hook, once
#[derive(Clone)]
struct TrackEndNotifier {
    guild_id: GuildId,
    track_id: u64,
    tracks: Arc<DashMap<GuildId, ActiveTrack>>,
    on_complete: Arc<Mutex<Option<OnComplete>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let end = match ctx {
            EventContext::Track(states) => states
                .first()
                .map(|(state, _)| playback_end(&state.playing))
                .unwrap_or(PlaybackEnd::Finished),
            _ => PlaybackEnd::Finished,
        };

        if let PlaybackEnd::Errored = end {
            warn!("❌ Track falló en guild {}", self.guild_id);
        }

        self.tracks
            .remove_if(&self.guild_id, |_, track| track.id == self.track_id);

        let callback = self.on_complete.lock().take();
        if let Some(callback) = callback {
            callback(end);
        }

        Some(Event::Cancel)
    }
}
