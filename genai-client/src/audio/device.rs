//! Playback on the default output device.
//!
//! `cpal::Stream` is not `Send`, so each playback gets a dedicated thread
//! that builds, owns and finally drops the stream.

use super::decode::AudioSession;
use super::playback::{AudioOutput, FinishedCallback, PlaybackHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use studio_core::error::AppError;
use tracing::{error, info};

#[derive(Debug, Clone, Default)]
pub struct DeviceOutput;

struct DeviceHandle {
    stop: Option<mpsc::Sender<()>>,
}

impl PlaybackHandle for DeviceHandle {
    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl AudioOutput for DeviceOutput {
    fn start(
        &self,
        session: Arc<AudioSession>,
        on_finished: FinishedCallback,
    ) -> Result<Box<dyn PlaybackHandle>, AppError> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        std::thread::Builder::new()
            .name("audio-playback".to_string())
            .spawn(move || match open_stream(&session) {
                Ok((stream, finished)) => {
                    let _ = ready_tx.send(Ok(()));
                    loop {
                        match stop_rx.recv_timeout(Duration::from_millis(10)) {
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                            Err(RecvTimeoutError::Timeout) => {
                                if finished.load(Ordering::Acquire) {
                                    drop(stream);
                                    on_finished();
                                    return;
                                }
                            }
                        }
                    }
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| AppError::PlaybackError(format!("failed to spawn playback thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| AppError::PlaybackError("playback thread exited".to_string()))??;

        Ok(Box::new(DeviceHandle {
            stop: Some(stop_tx),
        }))
    }
}

fn open_stream(session: &Arc<AudioSession>) -> Result<(cpal::Stream, Arc<AtomicBool>), AppError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AppError::PlaybackError("No output device available".to_string()))?;

    info!("Audio Output Device: {}", device.name().unwrap_or_default());

    let config = device
        .default_output_config()
        .map_err(|e| AppError::PlaybackError(e.to_string()))?;

    let finished = Arc::new(AtomicBool::new(false));
    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => build::<f32>(&device, &config.into(), session, &finished)?,
        cpal::SampleFormat::I16 => build::<i16>(&device, &config.into(), session, &finished)?,
        other => {
            return Err(AppError::PlaybackError(format!(
                "Unsupported sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AppError::PlaybackError(e.to_string()))?;

    Ok((stream, finished))
}

fn build<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    session: &Arc<AudioSession>,
    finished: &Arc<AtomicBool>,
) -> Result<cpal::Stream, AppError>
where
    T: SizedSample + FromSample<f32>,
{
    let session = session.clone();
    let finished = finished.clone();
    let out_channels = config.channels as usize;
    // Nearest-sample resampling to the device rate.
    let step = session.sample_rate as f64 / config.sample_rate.0 as f64;
    let mut position = 0f64;

    let err_fn = |err| error!("an error occurred on output stream: {}", err);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(out_channels) {
                    let index = position as usize;
                    position += step;
                    for (channel, sample) in frame.iter_mut().enumerate() {
                        let source = &session.channels[channel.min(session.channels.len() - 1)];
                        let value = source.get(index).copied().unwrap_or(0.0);
                        *sample = T::from_sample(value);
                    }
                    if index >= session.frames() {
                        finished.store(true, Ordering::Release);
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AppError::PlaybackError(e.to_string()))
}
