//! Session audio mixer
//!
//! One mixer owns at most one audio context at a time and plays two logical
//! channels into it: looping background music and one-shot narration. Every
//! operation tolerates a missing or closed context.

use super::backend::{AudioBackend, ContextState, RenderDriver};
use super::buffer::AudioBuffer;
use super::codec::{decode_compressed_blocking, decode_raw_pcm};
use super::graph::{MixGraph, SharedGraph, VoiceEnd, VoiceId};
use super::resampler::prepare_for_context;
use crate::config::NARRATION_SAMPLE_RATE;
use crate::{ReverieError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Logical playback channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    Narration,
    Music,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKind::Narration => write!(f, "narration"),
            ChannelKind::Music => write!(f, "music"),
        }
    }
}

/// Handle to a playing channel
///
/// The handle does not keep the context alive. Once the voice has ended or the
/// context is gone, gain changes are silently ignored.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    kind: ChannelKind,
    voice: Option<VoiceId>,
    graph: Weak<Mutex<MixGraph>>,
}

impl ChannelHandle {
    /// A handle with nothing behind it
    pub fn inert(kind: ChannelKind) -> Self {
        Self {
            kind,
            voice: None,
            graph: Weak::new(),
        }
    }

    fn live(kind: ChannelKind, voice: VoiceId, graph: &SharedGraph) -> Self {
        Self {
            kind,
            voice: Some(voice),
            graph: Arc::downgrade(graph),
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn is_inert(&self) -> bool {
        self.voice.is_none()
    }

    /// Whether the voice is still in the graph
    pub fn is_active(&self) -> bool {
        match (self.voice, self.graph.upgrade()) {
            (Some(id), Some(graph)) => graph.lock().is_active(id),
            _ => false,
        }
    }

    /// Current gain, `None` when nothing is playing
    pub fn gain(&self) -> Option<f32> {
        let id = self.voice?;
        let graph = self.graph.upgrade()?;
        let gain = graph.lock().gain(id);
        gain
    }

    /// Set the gain immediately
    pub fn set_gain(&self, value: f32) {
        if let (Some(id), Some(graph)) = (self.voice, self.graph.upgrade()) {
            if !graph.lock().set_gain(id, value) {
                debug!("Ignoring gain change on finished {} channel", self.kind);
            }
        }
    }
}

struct AudioContext {
    driver: Box<dyn RenderDriver>,
    graph: SharedGraph,
    state: ContextState,
}

/// Mixer for one meditation session
pub struct AudioMixer {
    backend: Arc<dyn AudioBackend>,
    context: Mutex<Option<AudioContext>>,
    blocked: AtomicBool,
    narration: Mutex<Option<ChannelHandle>>,
    music: Mutex<Option<ChannelHandle>>,
    narration_sample_rate: u32,
}

impl AudioMixer {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            context: Mutex::new(None),
            blocked: AtomicBool::new(false),
            narration: Mutex::new(None),
            music: Mutex::new(None),
            narration_sample_rate: NARRATION_SAMPLE_RATE,
        }
    }

    pub fn with_narration_sample_rate(mut self, sample_rate: u32) -> Self {
        self.narration_sample_rate = sample_rate;
        self
    }

    /// Create the audio context if there is none or the last one was closed
    ///
    /// A start refused by autoplay policy leaves the context open but
    /// suspended; [`AudioMixer::is_blocked`] reports it until `resume`.
    pub fn open(&self) -> Result<()> {
        let mut context = self.context.lock();
        if context
            .as_ref()
            .is_some_and(|ctx| ctx.state != ContextState::Closed)
        {
            return Ok(());
        }

        let mut driver = self.backend.open()?;
        let graph = driver.graph();

        let state = match driver.start() {
            Ok(()) => ContextState::Running,
            Err(ReverieError::AutoplayBlocked) => {
                warn!("Audio start blocked until user interaction");
                self.blocked.store(true, Ordering::SeqCst);
                ContextState::Suspended
            }
            Err(e) => {
                driver.close();
                return Err(e);
            }
        };

        info!(
            "Opened {} audio context at {} Hz ({})",
            self.backend.name(),
            graph.lock().sample_rate(),
            state
        );

        *context = Some(AudioContext {
            driver,
            graph,
            state,
        });
        Ok(())
    }

    pub fn state(&self) -> ContextState {
        self.context
            .lock()
            .as_ref()
            .map(|ctx| ctx.state)
            .unwrap_or(ContextState::Closed)
    }

    /// Whether autoplay policy is holding the context suspended
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    fn current_graph(&self) -> Option<SharedGraph> {
        self.context
            .lock()
            .as_ref()
            .filter(|ctx| ctx.state != ContextState::Closed)
            .map(|ctx| Arc::clone(&ctx.graph))
    }

    /// Whether `graph` still belongs to the open context
    fn is_current(&self, graph: &SharedGraph) -> bool {
        self.current_graph()
            .is_some_and(|current| Arc::ptr_eq(&current, graph))
    }

    /// Number of voices in the open context
    pub fn active_voices(&self) -> usize {
        self.current_graph()
            .map(|graph| graph.lock().active_voices())
            .unwrap_or(0)
    }

    /// Decode compressed music and loop it at `initial_gain`
    ///
    /// Empty input, a missing context or a decode failure all yield an inert
    /// handle. A decode that finishes after the context was closed is dropped.
    pub async fn play_music(&self, bytes: Vec<u8>, initial_gain: f32) -> ChannelHandle {
        if bytes.is_empty() {
            return ChannelHandle::inert(ChannelKind::Music);
        }
        let Some(graph) = self.current_graph() else {
            debug!("No open audio context, music not started");
            return ChannelHandle::inert(ChannelKind::Music);
        };

        let output_rate = graph.lock().sample_rate();
        let decoded = tokio::task::spawn_blocking(move || {
            let buffer = decode_compressed_blocking(bytes)?;
            prepare_for_context(&buffer, output_rate)
        })
        .await
        .map_err(|e| ReverieError::AudioProcessing(format!("Decoder task failed: {}", e)))
        .and_then(|result| result);

        let buffer = match decoded {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Background music unavailable: {}", e);
                return ChannelHandle::inert(ChannelKind::Music);
            }
        };

        if !self.is_current(&graph) {
            debug!("Context closed during music decode, discarding");
            return ChannelHandle::inert(ChannelKind::Music);
        }

        let id = graph.lock().add_voice(buffer.samples.into(), initial_gain, true);
        let handle = ChannelHandle::live(ChannelKind::Music, id, &graph);
        *self.music.lock() = Some(handle.clone());
        info!("Background music started at gain {:.2}", initial_gain);
        handle
    }

    /// Play raw PCM narration once; resolves when it ends
    ///
    /// Never fails: decode errors are logged and the future resolves at once.
    /// Narration is skipped while the context is blocked by autoplay policy.
    pub async fn play_narration(&self, bytes: Vec<u8>, gain: f32) {
        if bytes.is_empty() {
            return;
        }
        match self.start_narration(&bytes, gain) {
            Ok(Some(done)) => {
                let reason = done.await.unwrap_or(VoiceEnd::Stopped);
                debug!("Narration ended: {:?}", reason);
            }
            Ok(None) => {}
            Err(e) => warn!("Narration skipped: {}", e),
        }
        *self.narration.lock() = None;
    }

    fn start_narration(
        &self,
        bytes: &[u8],
        gain: f32,
    ) -> Result<Option<oneshot::Receiver<VoiceEnd>>> {
        let Some(graph) = self.current_graph() else {
            debug!("No open audio context, narration not started");
            return Ok(None);
        };
        if self.is_blocked() {
            warn!("Audio blocked, narration shown as text only");
            return Ok(None);
        }

        let decoded = decode_raw_pcm(bytes, self.narration_sample_rate, 1)?;
        let output_rate = graph.lock().sample_rate();
        let buffer: AudioBuffer = prepare_for_context(&decoded, output_rate)?;
        info!(
            "Narration started: {:.1}s at gain {:.2}",
            decoded.duration().as_secs_f32(),
            gain
        );

        let mut locked = graph.lock();
        let id = locked.add_voice(buffer.samples.into(), gain, false);
        let done = locked.on_end(id);
        drop(locked);

        *self.narration.lock() = Some(ChannelHandle::live(ChannelKind::Narration, id, &graph));
        Ok(done)
    }

    /// Handle of the narration currently playing
    pub fn narration_channel(&self) -> Option<ChannelHandle> {
        self.narration.lock().clone()
    }

    pub fn music_channel(&self) -> Option<ChannelHandle> {
        self.music.lock().clone()
    }

    /// Ramp `handle` to silence over `duration`, then stop it
    ///
    /// The ramp is scheduled before this returns; the future only waits for
    /// the voice to end, so dropping it does not cancel the fade.
    pub fn fade_out(&self, handle: &ChannelHandle, duration: Duration) -> impl Future<Output = ()> {
        let done = match (handle.voice, handle.graph.upgrade()) {
            (Some(id), Some(graph)) => {
                let mut graph = graph.lock();
                graph.ramp_gain(id, 0.0, duration);
                graph.stop_after(id, duration);
                graph.on_end(id)
            }
            _ => None,
        };
        if done.is_some() {
            debug!("Fading out {} over {:?}", handle.kind, duration);
        }
        async move {
            if let Some(done) = done {
                let _ = done.await;
            }
        }
    }

    pub fn suspend(&self) -> Result<()> {
        let mut context = self.context.lock();
        if let Some(ctx) = context.as_mut() {
            if ctx.state == ContextState::Running {
                ctx.driver.suspend()?;
                ctx.state = ContextState::Suspended;
                debug!("Audio context suspended");
            }
        }
        Ok(())
    }

    /// Resume a suspended context; also the user-interaction path that lifts
    /// an autoplay block.
    pub fn resume(&self) -> Result<()> {
        let mut context = self.context.lock();
        if let Some(ctx) = context.as_mut() {
            if ctx.state == ContextState::Suspended {
                ctx.driver.resume()?;
                ctx.state = ContextState::Running;
                if self.blocked.swap(false, Ordering::SeqCst) {
                    info!("Audio unblocked");
                }
                debug!("Audio context resumed");
            }
        }
        Ok(())
    }

    /// Stop every voice and release the context; idempotent
    pub fn close(&self) {
        let context = self.context.lock().take();
        if let Some(mut ctx) = context {
            ctx.graph.lock().stop_all();
            ctx.driver.close();
            info!("Audio context closed");
        }
        self.narration.lock().take();
        self.music.lock().take();
        self.blocked.store(false, Ordering::SeqCst);
    }
}

impl Drop for AudioMixer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::OfflineBackend;
    use std::io::Cursor;

    fn offline() -> Arc<dyn AudioBackend> {
        Arc::new(OfflineBackend::new(24000, Duration::from_millis(20)))
    }

    fn pcm_bytes(frames: usize) -> Vec<u8> {
        (0..frames)
            .flat_map(|i| (((i % 64) as i16 - 32) * 256).to_le_bytes())
            .collect()
    }

    fn wav_bytes(frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                writer.write_sample(((i % 100) as i16) * 50).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_is_idempotent_and_reopens_after_close() {
        let mixer = AudioMixer::new(offline());
        assert_eq!(mixer.state(), ContextState::Closed);

        mixer.open().unwrap();
        mixer.open().unwrap();
        assert_eq!(mixer.state(), ContextState::Running);

        mixer.close();
        mixer.close();
        assert_eq!(mixer.state(), ContextState::Closed);

        mixer.open().unwrap();
        assert_eq!(mixer.state(), ContextState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_backend_fails_open() {
        let mixer = AudioMixer::new(Arc::new(OfflineBackend::unavailable()));
        assert!(matches!(
            mixer.open(),
            Err(ReverieError::PlaybackUnsupported(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_music_is_inert() {
        let mixer = AudioMixer::new(offline());
        mixer.open().unwrap();
        let handle = mixer.play_music(Vec::new(), 0.5).await;
        assert!(handle.is_inert());
        handle.set_gain(1.0);
        assert_eq!(handle.gain(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_music_is_inert() {
        let mixer = AudioMixer::new(offline());
        mixer.open().unwrap();
        let handle = mixer.play_music(vec![1, 2, 3, 4, 5], 0.5).await;
        assert!(handle.is_inert());
        assert_eq!(mixer.active_voices(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_music_loops_and_gain_is_adjustable() {
        let mixer = AudioMixer::new(offline());
        mixer.open().unwrap();
        let handle = mixer.play_music(wav_bytes(2400), 0.5).await;
        assert!(!handle.is_inert());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(handle.is_active());

        handle.set_gain(0.3);
        assert!((handle.gain().unwrap() - 0.3).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_narration_resolves_on_natural_end() {
        let mixer = AudioMixer::new(offline());
        mixer.open().unwrap();

        let start = tokio::time::Instant::now();
        mixer.play_narration(pcm_bytes(24000), 1.0).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(950), "{:?}", elapsed);
        assert!(elapsed <= Duration::from_millis(1100), "{:?}", elapsed);
        assert!(mixer.narration_channel().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_narration_decode_failure_resolves() {
        let mixer = AudioMixer::new(offline());
        mixer.open().unwrap();
        mixer.play_narration(vec![1, 2, 3], 1.0).await;
        assert_eq!(mixer.active_voices(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fade_out_ends_music() {
        let mixer = AudioMixer::new(offline());
        mixer.open().unwrap();
        let handle = mixer.play_music(wav_bytes(2400), 0.8).await;

        let start = tokio::time::Instant::now();
        mixer.fade_out(&handle, Duration::from_millis(1500)).await;
        assert!(start.elapsed() >= Duration::from_millis(1450));
        assert!(!handle.is_active());
        // Gain changes after the fade are ignored
        handle.set_gain(1.0);
        assert_eq!(handle.gain(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_everything() {
        let mixer = AudioMixer::new(offline());
        mixer.open().unwrap();
        let handle = mixer.play_music(wav_bytes(2400), 0.5).await;
        assert_eq!(mixer.active_voices(), 1);

        mixer.close();
        assert_eq!(mixer.active_voices(), 0);
        handle.set_gain(0.9);
        assert!(!handle.is_active());
        assert!(mixer.music_channel().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspend_freezes_narration() {
        let mixer = Arc::new(AudioMixer::new(offline()));
        mixer.open().unwrap();

        let playing = Arc::clone(&mixer);
        let narration = tokio::spawn(async move {
            playing.play_narration(pcm_bytes(24000), 1.0).await;
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        mixer.suspend().unwrap();
        assert_eq!(mixer.state(), ContextState::Suspended);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!narration.is_finished());

        mixer.resume().unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(narration.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_autoplay_block_is_reported_and_lifted() {
        let backend = OfflineBackend::new(24000, Duration::from_millis(20)).with_autoplay_blocked();
        let mixer = AudioMixer::new(Arc::new(backend));
        mixer.open().unwrap();
        assert!(mixer.is_blocked());
        assert_eq!(mixer.state(), ContextState::Suspended);

        mixer.resume().unwrap();
        assert!(!mixer.is_blocked());
        assert_eq!(mixer.state(), ContextState::Running);
    }
}
