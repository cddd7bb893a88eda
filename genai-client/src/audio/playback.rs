//! Single-slot playback pipeline.
//!
//! The pipeline owns at most one active playback. Starting a new one swaps
//! the slot under a lock: the previous handle is stopped and dropped before
//! the new source starts.

use super::decode::{decode, AudioSession, DEFAULT_CHANNEL_COUNT, DEFAULT_SAMPLE_RATE};
use std::sync::{Arc, Mutex, MutexGuard};
use studio_core::error::AppError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Called once when a source plays to the end.
pub type FinishedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Owns a running audio source.
pub trait PlaybackHandle: Send {
    /// Halt immediately. Must be a no-op on an already stopped or finished
    /// source.
    fn stop(&mut self);
}

/// Sink that renders an [`AudioSession`].
pub trait AudioOutput: Send + Sync {
    /// Start rendering `session`. `on_finished` fires after natural
    /// completion only, never from within `start` itself.
    fn start(
        &self,
        session: Arc<AudioSession>,
        on_finished: FinishedCallback,
    ) -> Result<Box<dyn PlaybackHandle>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing { session_id: Uuid },
}

/// Real-time sink driven by the tokio timer. Plays for the session's
/// duration without touching an audio device.
#[derive(Debug, Clone, Default)]
pub struct ClockedOutput;

struct ClockedHandle {
    cancel: CancellationToken,
}

impl PlaybackHandle for ClockedHandle {
    fn stop(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for ClockedHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl AudioOutput for ClockedOutput {
    fn start(
        &self,
        session: Arc<AudioSession>,
        on_finished: FinishedCallback,
    ) -> Result<Box<dyn PlaybackHandle>, AppError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::PlaybackError(format!("no async runtime: {}", e)))?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let duration = session.duration();

        runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(duration) => on_finished(),
            }
        });

        Ok(Box::new(ClockedHandle { cancel }))
    }
}

struct ActivePlayback {
    session: Arc<AudioSession>,
    handle: Box<dyn PlaybackHandle>,
}

type Slot = Arc<Mutex<Option<ActivePlayback>>>;

fn lock(slot: &Mutex<Option<ActivePlayback>>) -> MutexGuard<'_, Option<ActivePlayback>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct AudioPlaybackPipeline {
    output: Arc<dyn AudioOutput>,
    active: Slot,
    state: Arc<watch::Sender<PlaybackState>>,
}

impl AudioPlaybackPipeline {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        let (state, _) = watch::channel(PlaybackState::Idle);
        Self {
            output,
            active: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
        }
    }

    /// Decode a base64 PCM16 payload into a session.
    pub fn decode(
        &self,
        payload: &str,
        sample_rate: u32,
        channel_count: u16,
    ) -> Result<AudioSession, AppError> {
        decode(payload, sample_rate, channel_count)
    }

    /// Decode mono 24 kHz speech and play it.
    pub fn play_payload(&self, payload: &str) -> Result<Uuid, AppError> {
        let session = self.decode(payload, DEFAULT_SAMPLE_RATE, DEFAULT_CHANNEL_COUNT)?;
        self.play(session)
    }

    /// Start `session`, stopping whatever is playing.
    pub fn play(&self, session: AudioSession) -> Result<Uuid, AppError> {
        let session = Arc::new(session);
        let session_id = session.id;

        let mut slot = lock(&self.active);

        if let Some(mut previous) = slot.take() {
            previous.handle.stop();
            tracing::debug!(session_id = %previous.session.id, "Superseded playback released");
        }

        let on_finished = {
            let active = Arc::downgrade(&self.active);
            let state = self.state.clone();
            Box::new(move || {
                let Some(active) = active.upgrade() else {
                    return;
                };
                let mut slot = lock(&active);
                if slot.as_ref().is_some_and(|a| a.session.id == session_id) {
                    *slot = None;
                    state.send_replace(PlaybackState::Idle);
                    tracing::debug!(session_id = %session_id, "Playback finished");
                }
            })
        };

        let handle = match self.output.start(session.clone(), on_finished) {
            Ok(handle) => handle,
            Err(e) => {
                self.state.send_replace(PlaybackState::Idle);
                return Err(e);
            }
        };

        *slot = Some(ActivePlayback { session, handle });
        self.state.send_replace(PlaybackState::Playing { session_id });
        tracing::info!(
            session_id = %session_id,
            frames = slot.as_ref().map(|a| a.session.frames()).unwrap_or(0),
            "Playback started"
        );

        Ok(session_id)
    }

    /// Halt playback. A no-op when idle.
    pub fn stop(&self) {
        let previous = lock(&self.active).take();
        if let Some(mut active) = previous {
            active.handle.stop();
            self.state.send_replace(PlaybackState::Idle);
            tracing::info!(session_id = %active.session.id, "Playback stopped");
        }
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn current_session(&self) -> Option<Uuid> {
        lock(&self.active).as_ref().map(|a| a.session.id)
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// Watch playback transitions.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }
}

impl Default for AudioPlaybackPipeline {
    fn default() -> Self {
        Self::new(Arc::new(ClockedOutput))
    }
}

impl Drop for AudioPlaybackPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
