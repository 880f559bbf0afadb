//! Phase sequencer for a meditation session
//!
//! Runs breathing, meditation and conclusion in order on a tokio task, drives
//! the mixer through them and samples progress on a second task. Close is
//! cooperative: a flag guards every state mutation and every wait also races
//! a close signal.

use super::phase::MeditationPhase;
use super::state::{MeditationSession, SessionEvent, SharedSession};
use super::timer::PhaseClock;
use crate::audio::{base64_to_bytes, AudioBackend, AudioMixer, ChannelHandle, ChannelKind};
use crate::config::MeditationConfig;
use crate::session::GeneratedArtifact;
use crate::{ReverieError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 1024;

type CloseCallback = Box<dyn FnOnce() + Send + 'static>;

/// What a session plays, taken from the artifact at start
struct SessionPlan {
    analysis: String,
    narration: Vec<u8>,
    music: Vec<u8>,
    meditation_length: Duration,
}

impl SessionPlan {
    fn from_artifact(artifact: &GeneratedArtifact, config: &MeditationConfig) -> Self {
        Self {
            analysis: artifact.analysis.clone(),
            narration: decode_payload("narration", &artifact.analysis_audio_data),
            music: decode_payload("music", &artifact.background_music_data),
            meditation_length: config.estimate_meditation(&artifact.analysis),
        }
    }
}

fn decode_payload(name: &str, data: &str) -> Vec<u8> {
    base64_to_bytes(data).unwrap_or_else(|e| {
        warn!("Ignoring {} payload: {}", name, e);
        Vec::new()
    })
}

/// Plays one meditation session
///
/// A sequencer runs at most one session. `close` may be called at any time
/// from any thread; the close callback fires exactly once, whether the
/// session was closed or ran to completion.
pub struct PhaseSequencer {
    inner: Arc<Inner>,
}

struct Inner {
    config: MeditationConfig,
    mixer: AudioMixer,
    session: SharedSession,
    snapshot_tx: watch::Sender<MeditationSession>,
    event_tx: Sender<SessionEvent>,
    event_rx: Receiver<SessionEvent>,
    started: AtomicBool,
    closing: AtomicBool,
    close_tx: watch::Sender<bool>,
    pause_tx: watch::Sender<bool>,
    clock: Mutex<PhaseClock>,
    sampler: Mutex<Option<JoinHandle<()>>>,
    music: Mutex<ChannelHandle>,
    on_close: Mutex<Option<CloseCallback>>,
}

impl PhaseSequencer {
    pub fn new(config: MeditationConfig, backend: Arc<dyn AudioBackend>) -> Self {
        let session = MeditationSession::new(String::new(), config.narration_gain, config.music_gain);
        let (snapshot_tx, _) = watch::channel(session.clone());
        let (event_tx, event_rx) = bounded(EVENT_CAPACITY);
        let (close_tx, _) = watch::channel(false);
        let (pause_tx, _) = watch::channel(false);
        let mixer = AudioMixer::new(backend).with_narration_sample_rate(config.narration_sample_rate);

        Self {
            inner: Arc::new(Inner {
                config,
                mixer,
                session: SharedSession::new(session),
                snapshot_tx,
                event_tx,
                event_rx,
                started: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                close_tx,
                pause_tx,
                clock: Mutex::new(PhaseClock::start(Instant::now(), false)),
                sampler: Mutex::new(None),
                music: Mutex::new(ChannelHandle::inert(ChannelKind::Music)),
                on_close: Mutex::new(None),
            }),
        }
    }

    /// Start playing `artifact`; `on_close` runs once when the session ends
    ///
    /// Fails with `PlaybackUnsupported` before any state is published when
    /// no audio context can be opened. A second start is refused with
    /// `SessionAlreadyActive` and changes nothing.
    pub fn start<F>(&self, artifact: &GeneratedArtifact, on_close: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let inner = &self.inner;
        if inner.closing.load(Ordering::SeqCst) || inner.started.swap(true, Ordering::SeqCst) {
            warn!("Ignoring start: session already active");
            return Err(ReverieError::SessionAlreadyActive);
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                inner.started.store(false, Ordering::SeqCst);
                return Err(ReverieError::Config(format!(
                    "Meditation sessions need a tokio runtime: {}",
                    e
                )));
            }
        };

        if let Err(e) = inner.mixer.open() {
            inner.started.store(false, Ordering::SeqCst);
            warn!("Cannot start meditation: {}", e);
            return Err(e);
        }

        let plan = SessionPlan::from_artifact(artifact, &inner.config);
        let blocked = inner.mixer.is_blocked();
        inner.update(|s| {
            s.affirmation = artifact.affirmation.clone();
            s.audio_blocked = blocked;
        });
        *inner.on_close.lock() = Some(Box::new(on_close));

        info!(
            "Starting meditation for '{}' (narration {} bytes, music {} bytes, meditation {:?})",
            artifact.scenario_title,
            plan.narration.len(),
            plan.music.len(),
            plan.meditation_length
        );
        if blocked {
            inner.emit(SessionEvent::AudioBlocked);
        }

        runtime.spawn(run_session(Arc::clone(inner), plan));
        Ok(())
    }

    pub fn pause(&self) {
        let inner = &self.inner;
        if !inner.started.load(Ordering::SeqCst) {
            return;
        }
        let changed = inner.update(|s| {
            if s.paused {
                return false;
            }
            s.paused = true;
            inner.clock.lock().pause(Instant::now());
            true
        });
        if changed != Some(true) {
            return;
        }

        if let Err(e) = inner.mixer.suspend() {
            warn!("Failed to suspend audio: {}", e);
        }
        inner.pause_tx.send_replace(true);
        inner.emit(SessionEvent::Paused);
        info!("Session paused at {:.1}%", inner.session.progress());
    }

    pub fn resume(&self) {
        let inner = &self.inner;
        if !inner.started.load(Ordering::SeqCst) {
            return;
        }
        let changed = inner.update(|s| {
            if !s.paused {
                return false;
            }
            s.paused = false;
            inner.clock.lock().resume(Instant::now());
            true
        });
        if changed != Some(true) {
            return;
        }

        inner.resume_audio();
        inner.pause_tx.send_replace(false);
        inner.emit(SessionEvent::Resumed);
        info!("Session resumed at {:.1}%", inner.session.progress());
    }

    pub fn toggle_pause(&self) {
        if self.inner.session.is_paused() {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// User interaction while audio is blocked; a no-op otherwise
    pub fn unlock_audio(&self) {
        if self.inner.session.is_paused() {
            return;
        }
        self.inner.resume_audio();
    }

    /// Close the session; idempotent
    pub fn close(&self) {
        self.inner.shutdown(false);
    }

    pub fn set_narration_gain(&self, value: f32) {
        let value = value.clamp(0.0, 1.0);
        if self.inner.update(|s| s.narration_gain = value).is_some() {
            if let Some(narration) = self.inner.mixer.narration_channel() {
                narration.set_gain(value);
            }
        }
    }

    pub fn set_music_gain(&self, value: f32) {
        let value = value.clamp(0.0, 1.0);
        if self.inner.update(|s| s.music_gain = value).is_some() {
            self.inner.apply_music_gain();
        }
    }

    pub fn snapshot(&self) -> MeditationSession {
        self.inner.session.snapshot()
    }

    pub fn session(&self) -> SharedSession {
        self.inner.session.clone()
    }

    /// Receiver of every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<MeditationSession> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn events(&self) -> Receiver<SessionEvent> {
        self.inner.event_rx.clone()
    }

    pub fn mixer(&self) -> &AudioMixer {
        &self.inner.mixer
    }

    pub fn music_channel(&self) -> ChannelHandle {
        self.inner.music.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &MeditationConfig {
        &self.inner.config
    }
}

async fn run_session(inner: Arc<Inner>, plan: SessionPlan) {
    if inner.play_phases(plan).await {
        info!("Meditation session complete");
        inner.shutdown(true);
    } else {
        debug!("Meditation task stopped by close");
    }
}

impl Inner {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Mutate the session unless closing; publishes a snapshot
    fn update<R>(&self, f: impl FnOnce(&mut MeditationSession) -> R) -> Option<R> {
        let (result, snapshot) = {
            let mut session = self.session.write();
            if self.is_closing() {
                return None;
            }
            let result = f(&mut session);
            (result, session.clone())
        };
        self.snapshot_tx.send_replace(snapshot);
        Some(result)
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(TrySendError::Full(event)) = self.event_tx.try_send(event) {
            debug!("Event queue full, dropping {:?}", event);
        }
    }

    /// Returns false once the session is closing
    async fn play_phases(self: &Arc<Self>, plan: SessionPlan) -> bool {
        let config = &self.config;

        if !self.enter_phase(MeditationPhase::Breathing, config.breathing()) {
            return false;
        }
        let music_gain = self.session.read().music_gain;
        let music = self.mixer.play_music(plan.music, music_gain).await;
        if self.is_closing() {
            return false;
        }
        *self.music.lock() = music;
        // Gain may have changed while decoding
        self.apply_music_gain();
        if !self.wait_active(config.breathing()).await
            || !self.complete_phase(MeditationPhase::Breathing)
        {
            return false;
        }

        if !self.enter_phase(MeditationPhase::Meditation, plan.meditation_length) {
            return false;
        }
        self.apply_music_gain();
        if !plan.narration.is_empty() {
            let analysis = plan.analysis;
            if self.update(|s| s.start_narration(analysis)).is_none() {
                return false;
            }
            self.emit(SessionEvent::NarrationStarted);

            let gain = self.session.read().narration_gain;
            let mut close_rx = self.close_tx.subscribe();
            tokio::select! {
                _ = self.mixer.play_narration(plan.narration, gain) => {}
                _ = close_rx.wait_for(|closed| *closed) => return false,
            }

            if self.update(|s| s.finish_narration()).is_none() {
                return false;
            }
            self.emit(SessionEvent::NarrationFinished);
        }
        if !self.wait_active(plan.meditation_length).await
            || !self.complete_phase(MeditationPhase::Meditation)
        {
            return false;
        }

        if self.is_closing() {
            return false;
        }
        let music = self.music.lock().clone();
        // Scheduled on the audio clock; the phase does not wait for it
        drop(self.mixer.fade_out(&music, config.music_fade()));
        if !self.enter_phase(MeditationPhase::Conclusion, config.conclusion()) {
            return false;
        }
        self.wait_active(config.conclusion()).await
            && self.complete_phase(MeditationPhase::Conclusion)
    }

    fn enter_phase(self: &Arc<Self>, phase: MeditationPhase, duration: Duration) -> bool {
        self.stop_sampler();
        let entered = self.update(|s| {
            s.enter_phase(phase);
            *self.clock.lock() = PhaseClock::start(Instant::now(), s.paused);
        });
        if entered.is_none() {
            return false;
        }

        info!("Entering {} phase for {:?}", phase, duration);
        self.emit(SessionEvent::PhaseChanged(phase));
        self.emit(SessionEvent::Progress {
            phase,
            value: phase.start_progress(),
        });

        let inner = Arc::clone(self);
        let sampler = tokio::spawn(async move { inner.sample_progress(phase, duration).await });
        *self.sampler.lock() = Some(sampler);
        true
    }

    fn complete_phase(&self, phase: MeditationPhase) -> bool {
        self.stop_sampler();
        let end = phase.end_progress();
        if self.update(|s| s.advance_progress(end)).is_none() {
            return false;
        }
        self.emit(SessionEvent::Progress { phase, value: end });
        true
    }

    fn stop_sampler(&self) {
        if let Some(sampler) = self.sampler.lock().take() {
            sampler.abort();
        }
    }

    async fn sample_progress(&self, phase: MeditationPhase, duration: Duration) {
        let mut ticker = tokio::time::interval(self.config.progress_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let value = {
                let session = self.session.read();
                if session.phase != phase {
                    break;
                }
                if session.paused {
                    continue;
                }
                let elapsed = self.clock.lock().elapsed(Instant::now());
                phase.progress_at(elapsed, duration)
            };

            let advanced = self.update(|s| s.phase == phase && s.advance_progress(value));
            match advanced {
                None => break,
                Some(true) => self.emit(SessionEvent::Progress { phase, value }),
                Some(false) => {}
            }
            if value >= phase.end_progress() {
                break;
            }
        }
    }

    /// Wait until `duration` of un-paused time has passed in this phase
    async fn wait_active(&self, duration: Duration) -> bool {
        let mut close_rx = self.close_tx.subscribe();
        let mut pause_rx = self.pause_tx.subscribe();

        loop {
            if self.is_closing() {
                return false;
            }
            if *pause_rx.borrow_and_update() {
                tokio::select! {
                    _ = close_rx.wait_for(|closed| *closed) => return false,
                    _ = pause_rx.changed() => continue,
                }
            }

            let elapsed = self.clock.lock().elapsed(Instant::now());
            let remaining = duration.saturating_sub(elapsed);
            if remaining.is_zero() {
                return true;
            }
            tokio::select! {
                _ = close_rx.wait_for(|closed| *closed) => return false,
                _ = pause_rx.changed() => {}
                _ = tokio::time::sleep(remaining) => {}
            }
        }
    }

    /// Configured music gain, ducked while the meditation phase runs
    fn apply_music_gain(&self) {
        let gain = {
            let session = self.session.read();
            match session.phase {
                MeditationPhase::Breathing => session.music_gain,
                MeditationPhase::Meditation => session.music_gain * self.config.music_duck_factor,
                // Fading or gone
                MeditationPhase::Conclusion | MeditationPhase::Done => return,
            }
        };
        self.music.lock().set_gain(gain);
    }

    fn resume_audio(&self) {
        let was_blocked = self.mixer.is_blocked();
        match self.mixer.resume() {
            Ok(()) if was_blocked => {
                if self.update(|s| s.audio_blocked = false).is_some() {
                    self.emit(SessionEvent::AudioUnblocked);
                }
            }
            Ok(()) => {}
            Err(e) => warn!("Failed to resume audio: {}", e),
        }
    }

    /// Single exit path for close and natural completion
    fn shutdown(&self, completed: bool) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close_tx.send_replace(true);
        self.stop_sampler();
        self.mixer.close();
        *self.music.lock() = ChannelHandle::inert(ChannelKind::Music);

        let snapshot = {
            let mut session = self.session.write();
            session.finish(completed);
            session.clone()
        };
        self.snapshot_tx.send_replace(snapshot);
        self.emit(SessionEvent::PhaseChanged(MeditationPhase::Done));
        self.emit(SessionEvent::Closed);

        if completed {
            info!("Meditation finished");
        } else {
            info!("Meditation closed");
        }

        let callback = self.on_close.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}
