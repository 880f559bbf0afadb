//! Playback backends
//!
//! A backend opens a render driver, the platform side of an audio context.
//! Drivers pull frames from the session's [`MixGraph`] while running; a
//! suspended driver renders nothing, so the audio clock stops with it.

use super::graph::{MixGraph, SharedGraph};
use crate::{ReverieError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Lifecycle of an audio context
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Suspended,
    #[default]
    Closed,
}

impl std::fmt::Display for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextState::Running => write!(f, "Running"),
            ContextState::Suspended => write!(f, "Suspended"),
            ContextState::Closed => write!(f, "Closed"),
        }
    }
}

/// Platform side of one audio context
pub trait RenderDriver: Send {
    /// Graph this driver renders
    fn graph(&self) -> SharedGraph;

    /// First start, without a user gesture. May fail with `AutoplayBlocked`.
    fn start(&mut self) -> Result<()>;

    /// Resume after suspend or after a blocked start (user interaction)
    fn resume(&mut self) -> Result<()>;

    fn suspend(&mut self) -> Result<()>;

    /// Release the platform resources; safe to call more than once
    fn close(&mut self);
}

/// Capability that opens audio contexts
pub trait AudioBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Open a context in the suspended state. Fails with
    /// `PlaybackUnsupported` when the platform has no audio output.
    fn open(&self) -> Result<Box<dyn RenderDriver>>;
}

/// Backend that renders on the tokio clock instead of a sound card
///
/// Used for headless playback and in tests. Rendered output can be captured
/// for inspection.
#[derive(Clone)]
pub struct OfflineBackend {
    sample_rate: u32,
    channels: u16,
    block: Duration,
    available: bool,
    autoplay_blocked: bool,
    capture: Option<Arc<Mutex<Vec<f32>>>>,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32, block: Duration) -> Self {
        Self {
            sample_rate,
            channels: 1,
            block,
            available: true,
            autoplay_blocked: false,
            capture: None,
        }
    }

    /// A backend with no playback capability
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(24000, Duration::from_millis(20))
        }
    }

    /// Refuse the first start until `resume` is called
    pub fn with_autoplay_blocked(mut self) -> Self {
        self.autoplay_blocked = true;
        self
    }

    /// Keep every rendered frame; returns the shared capture buffer
    pub fn with_capture(mut self) -> (Self, Arc<Mutex<Vec<f32>>>) {
        let capture = Arc::new(Mutex::new(Vec::new()));
        self.capture = Some(Arc::clone(&capture));
        (self, capture)
    }
}

impl AudioBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    fn open(&self) -> Result<Box<dyn RenderDriver>> {
        if !self.available {
            return Err(ReverieError::PlaybackUnsupported(
                "Offline backend configured without playback".into(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ReverieError::PlaybackUnsupported(format!("No async runtime for offline rendering: {}", e))
        })?;

        let graph = MixGraph::shared(self.sample_rate, self.channels);
        let running = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let block_frames =
            ((self.sample_rate as f64 * self.block.as_secs_f64()).round() as usize).max(1);
        let block_len = block_frames * self.channels as usize;

        let task_graph = Arc::clone(&graph);
        let task_running = Arc::clone(&running);
        let task_closed = Arc::clone(&closed);
        let capture = self.capture.clone();
        let block = self.block;

        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(block);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut out = vec![0.0f32; block_len];

            loop {
                ticker.tick().await;
                if task_closed.load(Ordering::SeqCst) {
                    break;
                }
                if !task_running.load(Ordering::SeqCst) {
                    continue;
                }
                task_graph.lock().render(&mut out);
                if let Some(capture) = &capture {
                    capture.lock().extend_from_slice(&out);
                }
            }
            debug!("Offline render task stopped");
        });

        info!(
            "Opened offline audio context: {} Hz, {:?} blocks",
            self.sample_rate, self.block
        );

        Ok(Box::new(OfflineDriver {
            graph,
            running,
            closed,
            autoplay_blocked: self.autoplay_blocked,
        }))
    }
}

struct OfflineDriver {
    graph: SharedGraph,
    running: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    autoplay_blocked: bool,
}

impl RenderDriver for OfflineDriver {
    fn graph(&self) -> SharedGraph {
        Arc::clone(&self.graph)
    }

    fn start(&mut self) -> Result<()> {
        if self.autoplay_blocked {
            return Err(ReverieError::AutoplayBlocked);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ReverieError::AudioDevice("Context is closed".into()));
        }
        self.autoplay_blocked = false;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Drop for OfflineDriver {
    fn drop(&mut self) {
        self.close();
    }
}
