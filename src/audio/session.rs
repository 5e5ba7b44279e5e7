//! Per-guild playback state machine.
//!
//! ```text
//! Idle → Connecting → Resolving → Playing ⇄ Paused
//!   ↑                     │  ↑        │
//!   └──── (empty queue) ──┘  └─ next ─┘        any → Disconnected
//! ```
//!
//! Each command takes the session lock only long enough to read the state and
//! decide a transition. Joining, resolving and audio submission run with the
//! lock released; their results are applied under the lock again and
//! discarded if the session was stopped in the meantime.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::VecDeque,
    sync::{Arc, Weak},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    gate::DownloadGate, AudioSink, NowPlaying, OnComplete, PlaybackEnd, Transport,
    VoiceConnection,
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::{ResolverRegistry, TrackSource},
};

/// Collaborators shared by every session
pub struct SessionContext {
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn AudioSink>,
    pub registry: Arc<ResolverRegistry>,
    pub gate: DownloadGate,
    pub max_queue_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Resolving,
    Playing,
    Paused,
    Disconnected,
}

impl SessionState {
    /// A track is owned by the sink
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Playing | SessionState::Paused)
    }
}

/// Unresolved request waiting in the queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub request: String,
    pub text_channel: ChannelId,
    pub queued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(request: impl Into<String>, text_channel: ChannelId) -> Self {
        Self {
            request: request.into(),
            text_channel,
            queued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub request: String,
    pub text_channel: ChannelId,
    /// Voice channel of the requester, if any
    pub voice_channel: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started { title: String },
    Queued { position: usize },
    /// The session was stopped while the request was in flight
    Discarded,
}

enum SessionEvent {
    /// Resolve and play an entry popped from the queue
    Start(QueueEntry),
    TrackEnded { play_id: u64, end: PlaybackEnd },
}

/// Track owned by the sink and the channel it was announced in
struct CurrentTrack {
    track: TrackSource,
    text_channel: ChannelId,
}

struct SessionInner {
    state: SessionState,
    voice: Option<VoiceConnection>,
    queue: VecDeque<QueueEntry>,
    current: Option<CurrentTrack>,
    /// Identifies the playback whose completion is expected next
    play_id: u64,
    /// Skip requested while the next track was still being joined or resolved
    skip_pending: bool,
}

impl SessionInner {
    /// Idle on an open voice connection with nothing queued
    fn is_reapable(&self) -> bool {
        self.state == SessionState::Idle && self.voice.is_some() && self.queue.is_empty()
    }
}

enum PlayStep {
    Join(ChannelId),
    Resolve,
    Enqueue(PlaybackResult<usize>),
    Reject(PlaybackError),
}

pub struct GuildSession {
    guild_id: GuildId,
    inner: Mutex<SessionInner>,
    ctx: Arc<SessionContext>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl GuildSession {
    /// Creates the session and its event worker. Requires a tokio runtime.
    pub fn spawn(guild_id: GuildId, ctx: Arc<SessionContext>) -> Arc<Self> {
        let (events, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            guild_id,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                voice: None,
                queue: VecDeque::new(),
                current: None,
                play_id: 0,
                skip_pending: false,
            }),
            ctx,
            events,
        });

        tokio::spawn(run_events(Arc::downgrade(&session), rx));
        debug!(guild_id = %guild_id, "🆕 Sesión creada");
        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn queued_requests(&self) -> Vec<String> {
        self.inner
            .lock()
            .queue
            .iter()
            .map(|entry| entry.request.clone())
            .collect()
    }

    pub fn current_title(&self) -> Option<String> {
        self.inner
            .lock()
            .current
            .as_ref()
            .map(|current| current.track.title().to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().voice.is_some()
    }

    /// Plays the request now if idle, otherwise appends it to the queue.
    ///
    /// Failures are reported to the request's text channel before returning.
    pub async fn play(self: &Arc<Self>, request: PlayRequest) -> PlaybackResult<PlayOutcome> {
        let entry = QueueEntry::new(request.request, request.text_channel);

        let step = {
            let mut inner = self.inner.lock();
            match inner.state {
                SessionState::Disconnected => return Err(PlaybackError::SessionClosed),
                SessionState::Idle => match (inner.voice, request.voice_channel) {
                    (Some(_), _) => {
                        self.transition(&mut inner, SessionState::Resolving);
                        PlayStep::Resolve
                    }
                    (None, Some(channel_id)) => {
                        self.transition(&mut inner, SessionState::Connecting);
                        PlayStep::Join(channel_id)
                    }
                    (None, None) => PlayStep::Reject(PlaybackError::NotInVoiceChannel),
                },
                _ => PlayStep::Enqueue(self.push_entry(&mut inner, entry.clone())),
            }
        };

        match step {
            PlayStep::Reject(err) => {
                self.report(entry.text_channel, &err).await;
                Err(err)
            }
            PlayStep::Enqueue(result) => self
                .acknowledge_queued(&entry, result)
                .await
                .map(|position| PlayOutcome::Queued { position }),
            PlayStep::Join(channel_id) => {
                if !self.connect(channel_id, &entry).await? {
                    return Ok(PlayOutcome::Discarded);
                }
                self.drive(entry).await
            }
            PlayStep::Resolve => self.drive(entry).await,
        }
    }

    /// Appends to the queue without attempting playback.
    pub async fn enqueue(&self, request: String, text_channel: ChannelId) -> PlaybackResult<usize> {
        let entry = QueueEntry::new(request, text_channel);
        let result = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Disconnected {
                return Err(PlaybackError::SessionClosed);
            }
            self.push_entry(&mut inner, entry.clone())
        };
        self.acknowledge_queued(&entry, result).await
    }

    pub fn pause(&self) -> PlaybackResult<()> {
        let mut inner = self.inner.lock();
        match (inner.state, inner.voice) {
            (SessionState::Playing, Some(connection)) => {
                self.ctx.sink.pause(&connection).map_err(|e| {
                    warn!(guild_id = %self.guild_id, "⚠️ No se pudo pausar: {}", e);
                    PlaybackError::InvalidTransition("Nothing is playing right now.")
                })?;
                self.transition(&mut inner, SessionState::Paused);
                Ok(())
            }
            (SessionState::Paused, _) => {
                Err(PlaybackError::InvalidTransition("Playback is already paused."))
            }
            _ => Err(PlaybackError::InvalidTransition("Nothing is playing right now.")),
        }
    }

    pub fn resume(&self) -> PlaybackResult<()> {
        let mut inner = self.inner.lock();
        match (inner.state, inner.voice) {
            (SessionState::Paused, Some(connection)) => {
                self.ctx.sink.resume(&connection).map_err(|e| {
                    warn!(guild_id = %self.guild_id, "⚠️ No se pudo reanudar: {}", e);
                    PlaybackError::InvalidTransition("Nothing is paused right now.")
                })?;
                self.transition(&mut inner, SessionState::Playing);
                Ok(())
            }
            (SessionState::Playing, _) => {
                Err(PlaybackError::InvalidTransition("Playback is already running."))
            }
            _ => Err(PlaybackError::InvalidTransition("Nothing is paused right now.")),
        }
    }

    /// Stops the current track; its completion advances the queue.
    ///
    /// While the next track is still being joined or resolved the skip is
    /// remembered and applied once the result arrives.
    pub fn skip(&self) -> PlaybackResult<()> {
        let connection = {
            let mut inner = self.inner.lock();
            match (inner.state, inner.voice) {
                (SessionState::Connecting | SessionState::Resolving, _) => {
                    inner.skip_pending = true;
                    info!(guild_id = %self.guild_id, "⏭️ Salto pendiente hasta terminar la resolución");
                    return Ok(());
                }
                (state, Some(connection)) if state.is_active() => connection,
                _ => return Err(PlaybackError::InvalidTransition("Nothing is playing right now.")),
            }
        };

        info!(guild_id = %self.guild_id, "⏭️ Saltando track actual");
        self.ctx.sink.stop(&connection);
        Ok(())
    }

    /// Drops every queued request. Returns how many were removed.
    pub fn clear_queue(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.queue.len();
        inner.queue.clear();
        info!(guild_id = %self.guild_id, "🗑️ Cola limpiada ({} entradas)", removed);
        removed
    }

    /// Tears the session down from any state. Returns false if it was
    /// already disconnected.
    pub async fn stop(&self) -> bool {
        self.shutdown_if(|_| true).await
    }

    /// Stops the session only if it is still reapable when the lock is taken.
    pub async fn stop_if_idle(&self) -> bool {
        self.shutdown_if(SessionInner::is_reapable).await
    }

    async fn shutdown_if(&self, predicate: impl FnOnce(&SessionInner) -> bool) -> bool {
        let (was_active, voice, current) = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Disconnected || !predicate(&*inner) {
                return false;
            }
            let was_active = inner.state.is_active();
            self.transition(&mut inner, SessionState::Disconnected);
            inner.queue.clear();
            inner.skip_pending = false;
            inner.play_id += 1;
            (was_active, inner.voice.take(), inner.current.take())
        };

        if let (true, Some(connection)) = (was_active, voice) {
            self.ctx.sink.stop(&connection);
        }
        if let Some(current) = current {
            release_track(current.track);
        }
        if let Some(connection) = voice {
            self.leave(&connection).await;
        }

        info!(guild_id = %self.guild_id, "⏹️ Sesión detenida");
        true
    }

    /// Returns `Ok(false)` when the session was stopped while joining.
    async fn connect(&self, channel_id: ChannelId, entry: &QueueEntry) -> PlaybackResult<bool> {
        let joined = self.ctx.transport.join(self.guild_id, channel_id).await;

        let stale = {
            let mut inner = self.inner.lock();
            let still_connecting = inner.state == SessionState::Connecting;
            match &joined {
                Ok(connection) if still_connecting => {
                    inner.voice = Some(*connection);
                    self.transition(&mut inner, SessionState::Resolving);
                    None
                }
                Ok(connection) => Some(*connection),
                Err(_) => {
                    if still_connecting {
                        inner.skip_pending = false;
                        self.transition(&mut inner, SessionState::Idle);
                    }
                    None
                }
            }
        };

        match joined {
            Ok(_) => match stale {
                None => {
                    info!(guild_id = %self.guild_id, "🔊 Conectado al canal de voz {}", channel_id);
                    Ok(true)
                }
                Some(connection) => {
                    debug!(guild_id = %self.guild_id, "🚪 Conexión obsoleta, saliendo");
                    self.leave(&connection).await;
                    Ok(false)
                }
            },
            Err(err) => {
                warn!(guild_id = %self.guild_id, "❌ {}", err);
                self.report(entry.text_channel, &err).await;
                Err(err)
            }
        }
    }

    /// Resolves `entry` under the download gate and starts playback.
    /// Expects the session to be `Resolving`.
    async fn drive(self: &Arc<Self>, entry: QueueEntry) -> PlaybackResult<PlayOutcome> {
        let resolved = {
            let _permit = self.ctx.gate.acquire().await;
            if self.state() == SessionState::Disconnected {
                debug!(guild_id = %self.guild_id, "Sesión detenida antes de resolver");
                return Ok(PlayOutcome::Discarded);
            }
            self.ctx.registry.resolve(&entry.request).await
        };

        match resolved {
            Ok(track) => self.start_playback(&entry, track).await,
            Err(_) if self.state() == SessionState::Disconnected => Ok(PlayOutcome::Discarded),
            Err(err) => {
                warn!(guild_id = %self.guild_id, "❌ {}", err);
                self.report(entry.text_channel, &err).await;
                self.advance();
                Err(err)
            }
        }
    }

    async fn start_playback(
        &self,
        entry: &QueueEntry,
        track: TrackSource,
    ) -> PlaybackResult<PlayOutcome> {
        let now_playing = NowPlaying {
            title: track.title().to_string(),
            thumbnail: track.thumbnail().map(str::to_owned),
        };
        let stream = track.stream().clone();

        let claimed = {
            let mut inner = self.inner.lock();
            match (inner.state, inner.voice) {
                (SessionState::Resolving, Some(_)) if inner.skip_pending => {
                    info!(guild_id = %self.guild_id, "⏭️ Salto pendiente aplicado: {}", track.title());
                    self.advance_locked(&mut inner);
                    Err(track)
                }
                (SessionState::Resolving, Some(connection)) => {
                    inner.play_id += 1;
                    inner.current = Some(CurrentTrack {
                        track,
                        text_channel: entry.text_channel,
                    });
                    self.transition(&mut inner, SessionState::Playing);
                    Ok((connection, inner.play_id))
                }
                _ => Err(track),
            }
        };

        let (connection, play_id) = match claimed {
            Ok(claim) => claim,
            Err(track) => {
                debug!(guild_id = %self.guild_id, "Resultado descartado: {}", track.title());
                release_track(track);
                return Ok(PlayOutcome::Discarded);
            }
        };

        let events = self.events.clone();
        let on_complete: OnComplete = Box::new(move |end| {
            let _ = events.send(SessionEvent::TrackEnded { play_id, end });
        });

        if let Err(e) = self.ctx.sink.play(&connection, &stream, on_complete).await {
            warn!(guild_id = %self.guild_id, "❌ No se pudo iniciar {}: {}", stream, e);
            let abandoned = {
                let mut inner = self.inner.lock();
                if inner.play_id == play_id && inner.state.is_active() {
                    inner.play_id += 1;
                    inner.current.take()
                } else {
                    None
                }
            };
            if let Some(current) = abandoned {
                release_track(current.track);
                let err = PlaybackError::SourceUnavailable(entry.request.clone());
                self.report(entry.text_channel, &err).await;
                self.advance();
                return Err(err);
            }
            return Ok(PlayOutcome::Discarded);
        }

        if self.state() == SessionState::Disconnected {
            self.ctx.sink.stop(&connection);
            return Ok(PlayOutcome::Discarded);
        }

        info!(guild_id = %self.guild_id, "▶️ Reproduciendo: {}", now_playing.title);
        if let Err(e) = self
            .ctx
            .transport
            .send_now_playing(entry.text_channel, &now_playing)
            .await
        {
            warn!(guild_id = %self.guild_id, "⚠️ Error al enviar now playing: {}", e);
        }

        Ok(PlayOutcome::Started {
            title: now_playing.title,
        })
    }

    async fn on_track_end(&self, play_id: u64, end: PlaybackEnd) {
        let finished = {
            let mut inner = self.inner.lock();
            if inner.play_id != play_id || !inner.state.is_active() {
                debug!(guild_id = %self.guild_id, "Fin de track obsoleto ignorado");
                return;
            }
            debug!(guild_id = %self.guild_id, "🎵 Track terminó: {:?}", end);
            let finished = inner.current.take();
            self.advance_locked(&mut inner);
            finished
        };

        let Some(current) = finished else {
            return;
        };
        if end == PlaybackEnd::Errored {
            // The track was already announced, so the failure gets its own message
            let err = PlaybackError::SourceUnavailable(current.track.title().to_string());
            warn!(guild_id = %self.guild_id, "❌ Error durante la reproducción: {}", err);
            self.report(current.text_channel, &err).await;
        }
        release_track(current.track);
    }

    fn advance(&self) {
        let mut inner = self.inner.lock();
        self.advance_locked(&mut inner);
    }

    /// Pops the next entry into `Resolving`, or settles in `Idle`.
    fn advance_locked(&self, inner: &mut SessionInner) {
        if inner.state == SessionState::Disconnected {
            return;
        }
        inner.skip_pending = false;

        match inner.queue.pop_front() {
            Some(next) => {
                let waited = Utc::now().signed_duration_since(next.queued_at);
                debug!(
                    guild_id = %self.guild_id,
                    "📤 Siguiente en cola tras {}s: {}",
                    waited.num_seconds(),
                    next.request
                );
                self.transition(inner, SessionState::Resolving);
                if self.events.send(SessionEvent::Start(next)).is_err() {
                    warn!(guild_id = %self.guild_id, "⚠️ Worker de sesión no disponible");
                    self.transition(inner, SessionState::Idle);
                }
            }
            None => self.transition(inner, SessionState::Idle),
        }
    }

    fn push_entry(&self, inner: &mut SessionInner, entry: QueueEntry) -> PlaybackResult<usize> {
        if inner.queue.len() >= self.ctx.max_queue_size {
            return Err(PlaybackError::InvalidTransition("The queue is full."));
        }
        inner.queue.push_back(entry);
        Ok(inner.queue.len())
    }

    async fn acknowledge_queued(
        &self,
        entry: &QueueEntry,
        result: PlaybackResult<usize>,
    ) -> PlaybackResult<usize> {
        match result {
            Ok(position) => {
                info!(guild_id = %self.guild_id, "➕ Agregado a la cola (#{}): {}", position, entry.request);
                self.notify(entry.text_channel, &format!("📝 Added to queue: {}", entry.request))
                    .await;
                Ok(position)
            }
            Err(err) => {
                self.report(entry.text_channel, &err).await;
                Err(err)
            }
        }
    }

    fn transition(&self, inner: &mut SessionInner, next: SessionState) {
        debug!(guild_id = %self.guild_id, from = ?inner.state, to = ?next, "🔀 Transición");
        inner.state = next;
    }

    async fn leave(&self, connection: &VoiceConnection) {
        if let Err(e) = self.ctx.transport.leave(connection).await {
            warn!(guild_id = %self.guild_id, "⚠️ Error al salir del canal de voz: {}", e);
        }
    }

    async fn notify(&self, channel_id: ChannelId, content: &str) {
        if let Err(e) = self.ctx.transport.send_message(channel_id, content).await {
            warn!(guild_id = %self.guild_id, "⚠️ Error al enviar mensaje: {}", e);
        }
    }

    async fn report(&self, channel_id: ChannelId, err: &PlaybackError) {
        if let Some(message) = err.user_message() {
            self.notify(channel_id, &message).await;
        }
    }
}

fn release_track(mut track: TrackSource) {
    if let Err(e) = track.release_local_file() {
        warn!("⚠️ {}", e);
    }
}

/// Consumes completion and queue-advance events for one session. Ends once
/// the session has been dropped.
async fn run_events(session: Weak<GuildSession>, mut rx: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(session) = session.upgrade() else {
            break;
        };

        match event {
            SessionEvent::TrackEnded { play_id, end } => session.on_track_end(play_id, end).await,
            SessionEvent::Start(entry) => {
                if let Err(e) = session.drive(entry).await {
                    debug!(guild_id = %session.guild_id, "Entrada de cola fallida: {}", e);
                }
            }
        }
    }
}
