//! Mix graph rendered by every playback context
//!
//! A graph holds the voices of one session. Each voice is a mono buffer at the
//! context sample rate with its own gain parameter. Gain ramps and scheduled
//! stops are expressed in rendered frames, so they follow the audio clock and
//! freeze while the context is suspended.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Graph shared between the mixer and the render driver
pub type SharedGraph = Arc<Mutex<MixGraph>>;

/// Identifier of a playing voice
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VoiceId(u64);

/// Why a voice left the graph
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceEnd {
    /// Non-looping buffer played to its last frame
    Completed,
    /// Stopped explicitly, by a scheduled stop, or by closing the context
    Stopped,
}

#[derive(Clone, Copy, Debug)]
struct Ramp {
    from: f32,
    to: f32,
    start_frame: u64,
    end_frame: u64,
}

#[derive(Clone, Copy, Debug)]
struct GainParam {
    value: f32,
    ramp: Option<Ramp>,
}

impl GainParam {
    fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    /// Gain at `frame`, settling the ramp once it has run out
    fn at(&mut self, frame: u64) -> f32 {
        if let Some(ramp) = self.ramp {
            if frame >= ramp.end_frame {
                self.value = ramp.to;
                self.ramp = None;
            } else {
                let span = (ramp.end_frame - ramp.start_frame) as f32;
                let t = frame.saturating_sub(ramp.start_frame) as f32 / span;
                return ramp.from + (ramp.to - ramp.from) * t;
            }
        }
        self.value
    }
}

struct Voice {
    samples: Arc<[f32]>,
    position: usize,
    looping: bool,
    gain: GainParam,
    stop_at: Option<u64>,
    waiters: Vec<oneshot::Sender<VoiceEnd>>,
}

impl Voice {
    fn finish(self, reason: VoiceEnd) {
        for waiter in self.waiters {
            let _ = waiter.send(reason);
        }
    }
}

pub struct MixGraph {
    sample_rate: u32,
    channels: u16,
    frame_clock: u64,
    next_id: u64,
    voices: BTreeMap<VoiceId, Voice>,
    scratch: Vec<f32>,
}

impl MixGraph {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            frame_clock: 0,
            next_id: 0,
            voices: BTreeMap::new(),
            scratch: Vec::new(),
        }
    }

    pub fn shared(sample_rate: u32, channels: u16) -> SharedGraph {
        Arc::new(Mutex::new(Self::new(sample_rate, channels)))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Frames rendered so far
    pub fn current_frame(&self) -> u64 {
        self.frame_clock
    }

    /// Audio clock in seconds
    pub fn current_time(&self) -> f64 {
        self.frame_clock as f64 / self.sample_rate as f64
    }

    fn frames_for(&self, duration: Duration) -> u64 {
        (duration.as_secs_f64() * self.sample_rate as f64).round() as u64
    }

    /// Start a voice. `samples` must be mono at the graph sample rate.
    pub fn add_voice(&mut self, samples: Arc<[f32]>, gain: f32, looping: bool) -> VoiceId {
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        self.voices.insert(
            id,
            Voice {
                samples,
                position: 0,
                looping,
                gain: GainParam::new(gain),
                stop_at: None,
                waiters: Vec::new(),
            },
        );
        id
    }

    /// Receiver resolved when the voice leaves the graph; `None` if it
    /// already has.
    pub fn on_end(&mut self, id: VoiceId) -> Option<oneshot::Receiver<VoiceEnd>> {
        let voice = self.voices.get_mut(&id)?;
        let (tx, rx) = oneshot::channel();
        voice.waiters.push(tx);
        Some(rx)
    }

    pub fn is_active(&self, id: VoiceId) -> bool {
        self.voices.contains_key(&id)
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Current gain of a voice at the audio clock
    pub fn gain(&mut self, id: VoiceId) -> Option<f32> {
        let frame = self.frame_clock;
        self.voices.get_mut(&id).map(|v| v.gain.at(frame))
    }

    /// Set gain immediately, cancelling any ramp
    pub fn set_gain(&mut self, id: VoiceId, value: f32) -> bool {
        match self.voices.get_mut(&id) {
            Some(voice) => {
                voice.gain = GainParam::new(value.max(0.0));
                true
            }
            None => false,
        }
    }

    /// Ramp linearly from the current gain to `target` over `duration` of audio time
    pub fn ramp_gain(&mut self, id: VoiceId, target: f32, duration: Duration) -> bool {
        let start_frame = self.frame_clock;
        let end_frame = start_frame + self.frames_for(duration);
        match self.voices.get_mut(&id) {
            Some(voice) => {
                let from = voice.gain.at(start_frame);
                voice.gain.ramp = if end_frame > start_frame {
                    Some(Ramp {
                        from,
                        to: target,
                        start_frame,
                        end_frame,
                    })
                } else {
                    voice.gain.value = target;
                    None
                };
                true
            }
            None => false,
        }
    }

    /// Stop the voice once `delay` of audio time has been rendered
    pub fn stop_after(&mut self, id: VoiceId, delay: Duration) -> bool {
        let at = self.frame_clock + self.frames_for(delay);
        match self.voices.get_mut(&id) {
            Some(voice) => {
                voice.stop_at = Some(at);
                true
            }
            None => false,
        }
    }

    pub fn stop(&mut self, id: VoiceId) -> bool {
        match self.voices.remove(&id) {
            Some(voice) => {
                voice.finish(VoiceEnd::Stopped);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (_, voice) in std::mem::take(&mut self.voices) {
            voice.finish(VoiceEnd::Stopped);
        }
    }

    /// Render interleaved frames into `out` and advance the audio clock
    pub fn render(&mut self, out: &mut [f32]) {
        let channels = self.channels as usize;
        let frames = out.len() / channels;
        let start = self.frame_clock;

        self.scratch.clear();
        self.scratch.resize(frames, 0.0);

        let mut ended = Vec::new();
        for (id, voice) in self.voices.iter_mut() {
            for (offset, slot) in self.scratch.iter_mut().enumerate() {
                let frame = start + offset as u64;
                if voice.stop_at.is_some_and(|at| frame >= at) {
                    ended.push((*id, VoiceEnd::Stopped));
                    break;
                }
                if voice.position >= voice.samples.len() {
                    if voice.looping && !voice.samples.is_empty() {
                        voice.position = 0;
                    } else {
                        ended.push((*id, VoiceEnd::Completed));
                        break;
                    }
                }
                *slot += voice.samples[voice.position] * voice.gain.at(frame);
                voice.position += 1;
            }

            // A buffer that ran out exactly on the block edge ends here
            let frame = start + frames as u64;
            let finished = voice.position >= voice.samples.len() && !voice.looping;
            let stopped = voice.stop_at.is_some_and(|at| frame >= at);
            if (finished || stopped) && !ended.iter().any(|(e, _)| e == id) {
                let reason = if stopped { VoiceEnd::Stopped } else { VoiceEnd::Completed };
                ended.push((*id, reason));
            }
        }

        for (frame_idx, sample) in self.scratch.iter().enumerate() {
            let value = sample.clamp(-1.0, 1.0);
            for c in 0..channels {
                out[frame_idx * channels + c] = value;
            }
        }
        for slot in out.iter_mut().skip(frames * channels) {
            *slot = 0.0;
        }

        self.frame_clock += frames as u64;

        for (id, reason) in ended {
            if let Some(voice) = self.voices.remove(&id) {
                voice.finish(reason);
            }
        }
    }
}
