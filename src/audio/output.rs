use super::backend::{AudioBackend, RenderDriver};
use super::graph::{MixGraph, SharedGraph};
use crate::{ReverieError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

enum StreamCommand {
    Play(Sender<Result<()>>),
    Pause(Sender<Result<()>>),
    Close,
}

/// Backend playing through the default output device
///
/// cpal streams cannot leave the thread that built them, so each context owns
/// a dedicated output thread driven over a command channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceBackend;

impl DeviceBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for DeviceBackend {
    fn name(&self) -> &str {
        "device"
    }

    fn open(&self) -> Result<Box<dyn RenderDriver>> {
        let (ready_tx, ready_rx) = bounded::<Result<SharedGraph>>(1);
        let (command_tx, command_rx) = bounded::<StreamCommand>(8);

        let thread = std::thread::Builder::new()
            .name("reverie-output".into())
            .spawn(move || run_output_thread(ready_tx, command_rx))
            .map_err(|e| ReverieError::AudioDevice(format!("Failed to spawn output thread: {}", e)))?;

        let graph = ready_rx
            .recv()
            .map_err(|_| ReverieError::AudioDevice("Output thread exited during setup".into()))??;

        Ok(Box::new(DeviceDriver {
            graph,
            command_tx,
            thread: Some(thread),
        }))
    }
}

fn run_output_thread(ready_tx: Sender<Result<SharedGraph>>, command_rx: Receiver<StreamCommand>) {
    let host = cpal::default_host();

    let device = match host.default_output_device() {
        Some(device) => device,
        None => {
            let _ = ready_tx.send(Err(ReverieError::PlaybackUnsupported(
                "No output device available".into(),
            )));
            return;
        }
    };

    info!(
        "Using output device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let config: cpal::StreamConfig = match device.default_output_config() {
        Ok(config) => config.into(),
        Err(e) => {
            let _ = ready_tx.send(Err(ReverieError::PlaybackUnsupported(format!(
                "Failed to get output config: {}",
                e
            ))));
            return;
        }
    };

    let graph = MixGraph::shared(config.sample_rate.0, config.channels);
    let render_graph = Arc::clone(&graph);

    let err_fn = |err| {
        error!("Audio output stream error: {}", err);
    };

    let stream = match device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            render_graph.lock().render(data);
        },
        err_fn,
        None,
    ) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(ReverieError::AudioDevice(format!(
                "Failed to build output stream: {}",
                e
            ))));
            return;
        }
    };

    // Some hosts start streams on creation; contexts open suspended
    if let Err(e) = stream.pause() {
        debug!("Output stream could not be paused at creation: {}", e);
    }

    if ready_tx.send(Ok(graph)).is_err() {
        return;
    }

    info!(
        "Opened output stream: {} Hz, {} channels",
        config.sample_rate.0, config.channels
    );

    while let Ok(command) = command_rx.recv() {
        match command {
            StreamCommand::Play(reply) => {
                let result = stream.play().map_err(|e| {
                    ReverieError::AudioDevice(format!("Failed to start output stream: {}", e))
                });
                let _ = reply.send(result);
            }
            StreamCommand::Pause(reply) => {
                let result = stream.pause().map_err(|e| {
                    ReverieError::AudioDevice(format!("Failed to pause output stream: {}", e))
                });
                let _ = reply.send(result);
            }
            StreamCommand::Close => break,
        }
    }

    drop(stream);
    info!("Closed output stream");
}

struct DeviceDriver {
    graph: SharedGraph,
    command_tx: Sender<StreamCommand>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceDriver {
    fn request(&self, make: fn(Sender<Result<()>>) -> StreamCommand) -> Result<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.command_tx
            .send(make(reply_tx))
            .map_err(|_| ReverieError::AudioDevice("Output thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| ReverieError::AudioDevice("Output thread did not reply".into()))?
    }
}

impl RenderDriver for DeviceDriver {
    fn graph(&self) -> SharedGraph {
        Arc::clone(&self.graph)
    }

    fn start(&mut self) -> Result<()> {
        self.request(StreamCommand::Play).map_err(|e| {
            warn!("Output stream refused to start: {}", e);
            ReverieError::AutoplayBlocked
        })
    }

    fn resume(&mut self) -> Result<()> {
        self.request(StreamCommand::Play)
    }

    fn suspend(&mut self) -> Result<()> {
        self.request(StreamCommand::Pause)
    }

    fn close(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.command_tx.send(StreamCommand::Close);
            if thread.join().is_err() {
                error!("Output thread panicked");
            }
        }
    }
}

impl Drop for DeviceDriver {
    fn drop(&mut self) {
        self.close();
    }
}
