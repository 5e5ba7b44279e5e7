//! In-memory doubles for the platform capabilities.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Semaphore;

use super::{
    gate::DownloadGate,
    manager::SessionManager,
    session::{PlayRequest, SessionContext},
    AudioSink, NowPlaying, OnComplete, PlaybackEnd, Transport, VoiceConnection,
};
use crate::{
    error::{PlaybackError, PlaybackResult},
    sources::{Resolver, ResolverRegistry, SourceType, StreamRef, TrackSource},
};

pub fn guild(id: u64) -> GuildId {
    GuildId::new(id)
}

pub fn text_channel() -> ChannelId {
    ChannelId::new(10)
}

pub fn voice_channel() -> ChannelId {
    ChannelId::new(20)
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Blocks callers while engaged until the test lets them through one by one.
pub struct Hold {
    engaged: AtomicBool,
    permits: Semaphore,
}

impl Hold {
    pub fn engage(&self) {
        self.engaged.store(true, Ordering::SeqCst);
    }

    pub fn release_one(&self) {
        self.permits.add_permits(1);
    }

    async fn pass(&self) {
        if self.engaged.load(Ordering::SeqCst) {
            self.permits
                .acquire()
                .await
                .expect("hold semaphore is never closed")
                .forget();
        }
    }
}

impl Default for Hold {
    fn default() -> Self {
        Self {
            engaged: AtomicBool::new(false),
            permits: Semaphore::new(0),
        }
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub joins: AtomicUsize,
    pub leaves: AtomicUsize,
    pub join_hold: Hold,
    fail_joins: AtomicBool,
    messages: Mutex<Vec<(ChannelId, String)>>,
    now_playing: Mutex<Vec<NowPlaying>>,
}

impl FakeTransport {
    pub fn fail_joins(&self) {
        self.fail_joins.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn now_playing_titles(&self) -> Vec<String> {
        self.now_playing.lock().iter().map(|n| n.title.clone()).collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlaybackResult<VoiceConnection> {
        self.join_hold.pass().await;
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(PlaybackError::VoiceJoinFailed("missing permissions".into()));
        }
        self.joins.fetch_add(1, Ordering::SeqCst);
        Ok(VoiceConnection {
            guild_id,
            channel_id,
        })
    }

    async fn leave(&self, _connection: &VoiceConnection) -> Result<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        self.messages.lock().push((channel_id, content.to_string()));
        Ok(())
    }

    async fn send_now_playing(&self, _channel_id: ChannelId, track: &NowPlaying) -> Result<()> {
        self.now_playing.lock().push(track.clone());
        Ok(())
    }
}

struct ActiveTrack {
    paused: bool,
    on_complete: OnComplete,
}

/// Sink that "plays" until the test finishes or stops the track.
#[derive(Default)]
pub struct FakeSink {
    /// Times a track was started while another one was still active
    pub overlaps: AtomicUsize,
    active: Mutex<HashMap<GuildId, ActiveTrack>>,
    played: Mutex<Vec<StreamRef>>,
}

impl FakeSink {
    pub fn played(&self) -> Vec<StreamRef> {
        self.played.lock().clone()
    }

    /// Ends the active track naturally. Returns false if nothing was playing.
    pub fn finish(&self, guild_id: GuildId) -> bool {
        self.end(guild_id, PlaybackEnd::Finished)
    }

    /// Ends the active track with a playback error.
    pub fn fail(&self, guild_id: GuildId) -> bool {
        self.end(guild_id, PlaybackEnd::Errored)
    }

    fn end(&self, guild_id: GuildId, end: PlaybackEnd) -> bool {
        let track = self.active.lock().remove(&guild_id);
        match track {
            Some(track) => {
                (track.on_complete)(end);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(
        &self,
        connection: &VoiceConnection,
        stream: &StreamRef,
        on_complete: OnComplete,
    ) -> Result<()> {
        let mut active = self.active.lock();
        if active.contains_key(&connection.guild_id) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.played.lock().push(stream.clone());
        active.insert(
            connection.guild_id,
            ActiveTrack {
                paused: false,
                on_complete,
            },
        );
        Ok(())
    }

    fn pause(&self, connection: &VoiceConnection) -> Result<()> {
        match self.active.lock().get_mut(&connection.guild_id) {
            Some(track) if !track.paused => {
                track.paused = true;
                Ok(())
            }
            _ => bail!("nothing to pause"),
        }
    }

    fn resume(&self, connection: &VoiceConnection) -> Result<()> {
        match self.active.lock().get_mut(&connection.guild_id) {
            Some(track) if track.paused => {
                track.paused = false;
                Ok(())
            }
            _ => bail!("nothing to resume"),
        }
    }

    fn stop(&self, connection: &VoiceConnection) {
        self.end(connection.guild_id, PlaybackEnd::Stopped);
    }

    fn is_playing(&self, connection: &VoiceConnection) -> bool {
        self.active
            .lock()
            .get(&connection.guild_id)
            .is_some_and(|t| !t.paused)
    }

    fn is_paused(&self, connection: &VoiceConnection) -> bool {
        self.active
            .lock()
            .get(&connection.guild_id)
            .is_some_and(|t| t.paused)
    }
}

#[derive(Clone)]
enum Script {
    Download,
    Fail(PlaybackError),
}

/// Resolver whose outcome per request is scripted by the test. Unscripted
/// requests resolve to a remote stream titled after the request.
pub struct ScriptedResolver {
    pub hold: Hold,
    pub max_in_flight: AtomicUsize,
    in_flight: AtomicUsize,
    delay: Mutex<Duration>,
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    download_dir: tempfile::TempDir,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self {
            hold: Hold::default(),
            max_in_flight: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            download_dir: tempfile::tempdir().expect("scratch download dir"),
        }
    }

    pub fn fail(&self, request: &str, error: PlaybackError) {
        self.scripts
            .lock()
            .insert(request.to_string(), Script::Fail(error));
    }

    pub fn download(&self, request: &str) {
        self.scripts
            .lock()
            .insert(request.to_string(), Script::Download);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn download_path(&self, request: &str) -> PathBuf {
        self.download_dir.path().join(format!("{}.mp3", request))
    }

    pub fn stream_of(request: &str) -> StreamRef {
        StreamRef::Url(format!("https://stream.test/{}", request))
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    fn matches(&self, _request: &str) -> bool {
        true
    }

    async fn resolve(&self, request: &str) -> PlaybackResult<TrackSource> {
        self.calls.lock().push(request.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.hold.pass().await;

        let script = self.scripts.lock().get(request).cloned();
        let result = match script {
            None => Ok(TrackSource::from_stream_url(
                request.to_string(),
                format!("https://stream.test/{}", request),
                SourceType::YouTube,
            )
            .expect("non-empty stream url")),
            Some(Script::Download) => {
                let path = self.download_path(request);
                std::fs::write(&path, b"audio").expect("write scratch download");
                Ok(TrackSource::from_download(
                    request.to_string(),
                    path,
                    SourceType::Spotify,
                ))
            }
            Some(Script::Fail(error)) => Err(error),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Session manager wired to fresh fakes
pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub transport: Arc<FakeTransport>,
    pub sink: Arc<FakeSink>,
    pub resolver: Arc<ScriptedResolver>,
}

impl Harness {
    pub fn new() -> Self {
        let transport = Arc::new(FakeTransport::default());
        let sink = Arc::new(FakeSink::default());
        let resolver = Arc::new(ScriptedResolver::new());

        let ctx = SessionContext {
            transport: transport.clone(),
            sink: sink.clone(),
            registry: Arc::new(ResolverRegistry::new(vec![
                resolver.clone() as Arc<dyn Resolver>
            ])),
            gate: DownloadGate::new(),
            max_queue_size: 100,
        };

        Self {
            manager: Arc::new(SessionManager::new(ctx)),
            transport,
            sink,
            resolver,
        }
    }

    pub fn request(&self, request: &str) -> PlayRequest {
        PlayRequest {
            request: request.to_string(),
            text_channel: text_channel(),
            voice_channel: Some(voice_channel()),
        }
    }
}
