//! Session lifecycle: one live connection to the voice service, the
//! microphone pipeline feeding it, and the single-consumer loop applying
//! everything it sends back.
//!
//! Ownership layout: all mutable conversation state (practice tracker,
//! transcripts, error slot) lives behind one lock and is only mutated by
//! the inbound loop and teardown, so a `setTargetSentence` can never race
//! an `updatePronunciation`. Audio devices are owned by a dedicated
//! thread, since cpal streams cannot cross task boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, Receiver as CbReceiver, Sender as CbSender};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{
    decode_pcm16, encode_pcm16, AudioInput, AudioOutput, AudioResampler, AudioRingBuffer,
    FrameChunker, PlaybackClock, PlaybackScheduler, CAPTURE_SAMPLE_RATE, FRAME_SAMPLES,
    PLAYBACK_SAMPLE_RATE,
};
use crate::live::{LiveClient, LiveConfig, LiveEvent};
use crate::persona::{self, UserProfile};
use crate::session::interpreter::{ToolCallInterpreter, ToolResponder};
use crate::session::practice::{PracticeState, PracticeTracker, TargetSentence};
use crate::{ParlaError, Result};

/// Seconds of synthesized audio the playback queue can hold
const PLAYBACK_QUEUE_SECS: usize = 30;

/// Connection state exposed to the host UI's status indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Active,
    Error,
}

/// Configuration for a voice session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// API credential; checked before any device or network access
    pub api_key: String,

    /// Learner profile parameterizing the tutor persona
    pub profile: UserProfile,

    /// Model identifier
    pub model: String,

    /// Service endpoint (overridable for testing)
    pub endpoint: String,
}

impl SessionConfig {
    pub fn new(api_key: impl Into<String>, profile: UserProfile) -> Self {
        Self {
            api_key: api_key.into(),
            profile,
            model: crate::live::config::DEFAULT_MODEL.to_string(),
            endpoint: crate::live::config::DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Set the model identifier
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the service endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn live_config(&self) -> LiveConfig {
        LiveConfig::new(self.api_key.clone())
            .with_model(self.model.clone())
            .with_endpoint(self.endpoint.clone())
            .with_system_instruction(persona::system_instruction(&self.profile))
            .with_tools(persona::tool_declarations())
    }
}

/// Everything the host UI renders, in one copyable snapshot
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection_state: ConnectionState,
    pub practice_state: PracticeState,
    pub sentence: Option<TargetSentence>,
    pub is_perfect: bool,
    /// Latest fragment of the tutor's speech transcription
    pub transcript: String,
    /// Latest fragment of the learner's speech transcription
    pub input_transcript: String,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Mutable conversation state behind a single ownership boundary
struct SessionState {
    connection_state: ConnectionState,
    practice: PracticeTracker,
    transcript: String,
    input_transcript: String,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            connection_state: ConnectionState::Idle,
            practice: PracticeTracker::new(),
            transcript: String::new(),
            input_transcript: String::new(),
            error_message: None,
            started_at: None,
        }
    }
}

/// Resources of one connection attempt, created fresh per start()
struct ActiveSession {
    id: Uuid,
    cancel: CancellationToken,
    audio_stop_tx: CbSender<()>,
    client: Mutex<Option<Arc<LiveClient>>>,
    scheduler: Arc<PlaybackScheduler>,
    torn_down: AtomicBool,
}

impl ActiveSession {
    /// Release everything exactly once; safe under concurrent callers.
    ///
    /// `failure` carries the user-visible message for a fatal transport
    /// error; `None` means a user-initiated stop back to Idle.
    fn teardown(&self, shared: &Mutex<SessionState>, failure: Option<String>) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        let _ = self.audio_stop_tx.try_send(());
        if let Some(client) = self.client.lock().take() {
            client.close();
        }
        self.scheduler.reset();

        let mut state = shared.lock();
        state.practice.clear();
        state.transcript.clear();
        state.input_transcript.clear();
        state.started_at = None;
        match failure {
            Some(message) => {
                state.error_message = Some(message);
                state.connection_state = ConnectionState::Error;
            }
            None => state.connection_state = ConnectionState::Idle,
        }

        info!("Session {} torn down", self.id);
    }
}

impl ToolResponder for LiveClient {
    fn respond(&self, call_id: &str, name: &str, result: &str) -> Result<()> {
        self.send_tool_response(call_id, name, result)
    }
}

/// The realtime voice session controller embedded in the practice view
pub struct VoiceSession {
    config: SessionConfig,
    shared: Arc<Mutex<SessionState>>,
    active: Mutex<Option<Arc<ActiveSession>>>,
}

impl VoiceSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Mutex::new(SessionState::new())),
            active: Mutex::new(None),
        }
    }

    /// Start a session: credential check, microphone, then the stream.
    ///
    /// A no-op while a session is already connecting or active. On any
    /// failure the user-visible error slot is filled and no resources
    /// stay behind.
    pub async fn start(&self) -> Result<()> {
        let live_config = self.config.live_config();
        let session_id = Uuid::new_v4();

        let queue = AudioRingBuffer::new(PLAYBACK_SAMPLE_RATE as usize * PLAYBACK_QUEUE_SECS);
        let clock = PlaybackClock::new(PLAYBACK_SAMPLE_RATE);
        let scheduler = Arc::new(PlaybackScheduler::new(clock.clone(), queue.clone()));

        let (audio_stop_tx, audio_stop_rx) = bounded::<()>(1);
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (ready_tx, ready_rx) = oneshot::channel();

        let active = Arc::new(ActiveSession {
            id: session_id,
            cancel: CancellationToken::new(),
            audio_stop_tx,
            client: Mutex::new(None),
            scheduler: Arc::clone(&scheduler),
            torn_down: AtomicBool::new(false),
        });

        if !self.register_attempt(&live_config, &active)? {
            return Ok(());
        }
        info!("Starting voice session {}", session_id);

        // Devices live on their own thread for the whole session
        std::thread::spawn(move || {
            audio_thread_main(ready_tx, audio_stop_rx, frame_tx, queue, clock);
        });

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                active.teardown(&self.shared, None);
                self.clear_active(&active);
                self.fail_start(&e);
                return Err(e);
            }
            Err(_) => {
                let e = ParlaError::ChannelError("Audio thread died during startup".into());
                active.teardown(&self.shared, None);
                self.clear_active(&active);
                self.fail_start(&e);
                return Err(e);
            }
        }

        let (client, mut event_rx) = match LiveClient::connect(&live_config).await {
            Ok(connected) => connected,
            Err(e) => {
                active.teardown(&self.shared, None);
                self.clear_active(&active);
                self.fail_start(&e);
                return Err(e);
            }
        };
        let client = Arc::new(client);
        *active.client.lock() = Some(Arc::clone(&client));

        // stop() may have raced the handshake; close instead of activating
        if !try_activate(&self.shared, &active) {
            info!("Session {} cancelled during connect", session_id);
            client.close();
            self.clear_active(&active);
            return Ok(());
        }
        info!("Session {} active", session_id);

        // Outbound pump: captured frames to the wire, fire-and-forget
        let outbound_client = Arc::clone(&client);
        let outbound_cancel = active.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = outbound_cancel.cancelled() => break,
                    frame = frame_rx.recv() => match frame {
                        Some(frame) => {
                            if outbound_client.send_realtime_audio(&frame).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("Outbound pump finished");
        });

        // Inbound loop: the single consumer of every service event
        let shared = Arc::clone(&self.shared);
        let loop_active = Arc::clone(&active);
        let loop_client = Arc::clone(&client);
        tokio::spawn(async move {
            let interpreter = ToolCallInterpreter::new();
            loop {
                tokio::select! {
                    _ = loop_active.cancel.cancelled() => break,
                    event = event_rx.recv() => {
                        let Some(event) = event else {
                            loop_active.teardown(
                                &shared,
                                Some(ParlaError::ConnectionError("stream ended".into()).user_message()),
                            );
                            break;
                        };
                        if handle_event(event, &shared, &loop_active, &loop_client, &interpreter) {
                            break;
                        }
                    }
                }
            }
            debug!("Inbound loop finished");
        });

        Ok(())
    }

    /// Stop the session. Idempotent, safe from any state including Error
    /// and mid-connect; concurrent calls release the microphone once.
    pub fn stop(&self) {
        let Some(active) = self.active.lock().take() else {
            debug!("stop() with no session, nothing to do");
            return;
        };
        active.teardown(&self.shared, None);
    }

    /// Current state for the host UI
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.lock();
        SessionSnapshot {
            connection_state: state.connection_state,
            practice_state: state.practice.state(),
            sentence: state.practice.sentence().cloned(),
            is_perfect: state.practice.is_perfect(),
            transcript: state.transcript.clone(),
            input_transcript: state.input_transcript.clone(),
            error_message: state.error_message.clone(),
            started_at: state.started_at,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().connection_state
    }

    /// Atomically claim the session slot for this attempt.
    ///
    /// On success the state is Connecting and the handle is registered in
    /// the same critical section, so a concurrent stop() from this point
    /// on always finds the attempt to cancel. Returns Ok(false) when a
    /// session is already connecting or active.
    fn register_attempt(
        &self,
        live_config: &LiveConfig,
        active: &Arc<ActiveSession>,
    ) -> Result<bool> {
        let mut state = self.shared.lock();
        match state.connection_state {
            ConnectionState::Connecting | ConnectionState::Active => {
                warn!("Session already running, ignoring start()");
                return Ok(false);
            }
            ConnectionState::Idle | ConnectionState::Error => {}
        }
        // A fresh attempt clears the previous error
        state.error_message = None;

        if let Err(e) = live_config.validate() {
            // Must fail before any device or network access
            error!("start() failed: {}", e);
            state.error_message = Some(e.user_message());
            state.connection_state = ConnectionState::Idle;
            return Err(e);
        }

        state.connection_state = ConnectionState::Connecting;
        *self.active.lock() = Some(Arc::clone(active));
        Ok(true)
    }

    fn fail_start(&self, error: &ParlaError) {
        error!("start() failed: {}", error);
        let mut state = self.shared.lock();
        state.error_message = Some(error.user_message());
        state.connection_state = ConnectionState::Idle;
    }

    /// Forget the active handle if it is still the given attempt
    fn clear_active(&self, attempt: &Arc<ActiveSession>) {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            if Arc::ptr_eq(current, attempt) {
                *active = None;
            }
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Transition the attempt to Active unless it was cancelled meanwhile.
///
/// The cancellation check and the state transition share the state lock.
/// Teardown cancels before it takes that lock, so a racing stop() either
/// ran first and this declines, or runs after and overwrites Active with
/// the final Idle/Error; the state can never strand on Active.
fn try_activate(shared: &Mutex<SessionState>, active: &ActiveSession) -> bool {
    let mut state = shared.lock();
    if active.cancel.is_cancelled() {
        return false;
    }
    state.connection_state = ConnectionState::Active;
    state.started_at = Some(Utc::now());
    true
}

/// Apply one inbound event. Returns true when the session is over.
fn handle_event(
    event: LiveEvent,
    shared: &Arc<Mutex<SessionState>>,
    active: &Arc<ActiveSession>,
    client: &Arc<LiveClient>,
    interpreter: &ToolCallInterpreter,
) -> bool {
    match event {
        LiveEvent::SetupComplete => {
            debug!("Service accepted setup");
            false
        }
        LiveEvent::InputTranscript(text) => {
            shared.lock().input_transcript = text;
            false
        }
        LiveEvent::OutputTranscript(text) => {
            shared.lock().transcript = text;
            false
        }
        LiveEvent::ToolCalls(calls) => {
            let mut state = shared.lock();
            for call in &calls {
                interpreter.handle(&mut state.practice, call, client.as_ref());
            }
            false
        }
        LiveEvent::Audio(bytes) => {
            match decode_pcm16(&bytes) {
                Ok(samples) => {
                    let start = active.scheduler.schedule(&samples);
                    debug!("Scheduled {} samples at t={:.3}s", samples.len(), start);
                }
                // Corrupt chunk: drop it and keep the session running
                Err(e) => warn!("Dropped audio chunk: {}", e),
            }
            false
        }
        LiveEvent::TurnComplete => {
            debug!("Model turn complete");
            false
        }
        LiveEvent::Error(message) => {
            error!("Service error, ending session: {}", message);
            active.teardown(
                shared,
                Some(ParlaError::ConnectionError(message).user_message()),
            );
            true
        }
        LiveEvent::Closed => {
            // A close after cancellation is the expected end of a stop()
            if !active.cancel.is_cancelled() {
                warn!("Connection closed unexpectedly");
                active.teardown(
                    shared,
                    Some(ParlaError::ConnectionError("connection closed".into()).user_message()),
                );
            }
            true
        }
    }
}

/// Owns the cpal streams for the life of one session.
///
/// Capture blocks are resampled to the wire rate, cut into constant-size
/// frames, and forwarded without waiting on the network. Dropping the
/// streams on exit is what releases the microphone; it must happen on
/// every path out of this function.
fn audio_thread_main(
    ready_tx: oneshot::Sender<Result<()>>,
    stop_rx: CbReceiver<()>,
    frame_tx: mpsc::UnboundedSender<Vec<u8>>,
    queue: AudioRingBuffer,
    clock: PlaybackClock,
) {
    let (raw_tx, raw_rx) = bounded::<Vec<f32>>(64);

    let init = || -> Result<(AudioInput, AudioOutput, Option<AudioResampler>)> {
        let mut input = AudioInput::new(CAPTURE_SAMPLE_RATE)?;
        let mut output = AudioOutput::new(PLAYBACK_SAMPLE_RATE)?;

        let device_rate = input.sample_rate();
        let resampler = if device_rate != CAPTURE_SAMPLE_RATE {
            Some(AudioResampler::new(device_rate, CAPTURE_SAMPLE_RATE)?)
        } else {
            None
        };

        input.start_capture(raw_tx.clone())?;
        output.start_playback(queue.clone(), clock.clone())?;
        Ok((input, output, resampler))
    };

    let (mut input, mut output, mut resampler) = match init() {
        Ok(parts) => {
            let _ = ready_tx.send(Ok(()));
            parts
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let mut chunker = FrameChunker::new(FRAME_SAMPLES);
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(raw_rx) -> block => {
                let Ok(samples) = block else { break };
                let wire_samples = match resampler.as_mut() {
                    Some(resampler) => match resampler.resample(&samples) {
                        Ok(resampled) => resampled,
                        Err(e) => {
                            warn!("Resample failed, dropping block: {}", e);
                            continue;
                        }
                    },
                    None => samples,
                };
                for frame in chunker.push(&wire_samples) {
                    // Fire-and-forget; a gone receiver just means the
                    // session ended and stop is on its way
                    let _ = frame_tx.send(encode_pcm16(&frame));
                }
            }
        }
    }

    input.stop_capture();
    output.stop_playback();
    debug!("Audio thread finished, devices released");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::{Gender, UserLevel};

    fn profile() -> UserProfile {
        UserProfile::new("Test", Gender::Male, UserLevel::Beginner)
    }

    #[tokio::test]
    async fn test_start_without_key_fails_before_devices() {
        let session = VoiceSession::new(SessionConfig::new("", profile()));

        let result = session.start().await;
        assert!(matches!(result, Err(ParlaError::ConfigError(_))));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.connection_state, ConnectionState::Idle);
        assert!(snapshot.error_message.is_some());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let session = VoiceSession::new(SessionConfig::new("", profile()));

        session.stop();
        session.stop();
        assert_eq!(session.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_error_slot_cleared_on_next_start() {
        let session = VoiceSession::new(SessionConfig::new("", profile()));

        let _ = session.start().await;
        assert!(session.snapshot().error_message.is_some());

        // The next attempt clears the slot before failing again
        let _ = session.start().await;
        let snapshot = session.snapshot();
        assert!(snapshot.error_message.is_some());
        assert_eq!(snapshot.connection_state, ConnectionState::Idle);
    }

    fn attempt() -> Arc<ActiveSession> {
        let (audio_stop_tx, _audio_stop_rx) = bounded::<()>(1);
        let clock = PlaybackClock::new(PLAYBACK_SAMPLE_RATE);
        let queue = AudioRingBuffer::new(1024);
        Arc::new(ActiveSession {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            audio_stop_tx,
            client: Mutex::new(None),
            scheduler: Arc::new(PlaybackScheduler::new(clock, queue)),
            torn_down: AtomicBool::new(false),
        })
    }

    #[test]
    fn test_stop_during_connect_cancels_the_attempt() {
        let session = VoiceSession::new(SessionConfig::new("key", profile()));
        let active = attempt();

        let registered = session
            .register_attempt(&session.config.live_config(), &active)
            .unwrap();
        assert!(registered);
        assert_eq!(session.connection_state(), ConnectionState::Connecting);

        // stop() lands while the handshake is still in flight
        session.stop();
        assert!(active.cancel.is_cancelled());
        assert_eq!(session.connection_state(), ConnectionState::Idle);

        // The resolving connect must decline to activate a dead session
        assert!(!try_activate(&session.shared, &active));
        assert_eq!(session.connection_state(), ConnectionState::Idle);
    }

    #[test]
    fn test_stop_after_activation_lands_idle() {
        let session = VoiceSession::new(SessionConfig::new("key", profile()));
        let active = attempt();
        session
            .register_attempt(&session.config.live_config(), &active)
            .unwrap();

        // The other interleaving: activation wins the lock, teardown runs second
        assert!(try_activate(&session.shared, &active));
        assert_eq!(session.connection_state(), ConnectionState::Active);

        session.stop();
        assert_eq!(session.connection_state(), ConnectionState::Idle);
    }

    #[test]
    fn test_second_attempt_rejected_while_connecting() {
        let session = VoiceSession::new(SessionConfig::new("key", profile()));
        let first = attempt();
        assert!(session
            .register_attempt(&session.config.live_config(), &first)
            .unwrap());

        let second = attempt();
        assert!(!session
            .register_attempt(&session.config.live_config(), &second)
            .unwrap());
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        assert!(!first.cancel.is_cancelled());
    }

    #[test]
    fn test_teardown_runs_exactly_once() {
        let shared = Arc::new(Mutex::new(SessionState::new()));
        shared.lock().connection_state = ConnectionState::Active;

        let (audio_stop_tx, audio_stop_rx) = bounded::<()>(1);
        let clock = PlaybackClock::new(PLAYBACK_SAMPLE_RATE);
        let queue = AudioRingBuffer::new(1024);
        let active = ActiveSession {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            audio_stop_tx,
            client: Mutex::new(None),
            scheduler: Arc::new(PlaybackScheduler::new(clock, queue)),
            torn_down: AtomicBool::new(false),
        };

        active.teardown(&shared, None);
        active.teardown(&shared, None);

        // Exactly one stop signal reached the audio thread
        assert!(audio_stop_rx.try_recv().is_ok());
        assert!(audio_stop_rx.try_recv().is_err());
        assert_eq!(shared.lock().connection_state, ConnectionState::Idle);
        assert!(active.cancel.is_cancelled());
    }

    #[test]
    fn test_teardown_with_failure_parks_in_error_state() {
        let shared = Arc::new(Mutex::new(SessionState::new()));
        {
            let mut state = shared.lock();
            state.connection_state = ConnectionState::Active;
            state.practice.set_sentence(TargetSentence::new("I am happy", "أنا سعيد"));
            state.transcript = "hello".into();
        }

        let (audio_stop_tx, _audio_stop_rx) = bounded::<()>(1);
        let clock = PlaybackClock::new(PLAYBACK_SAMPLE_RATE);
        let queue = AudioRingBuffer::new(1024);
        let active = ActiveSession {
            id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            audio_stop_tx,
            client: Mutex::new(None),
            scheduler: Arc::new(PlaybackScheduler::new(clock, queue)),
            torn_down: AtomicBool::new(false),
        };

        active.teardown(&shared, Some("retry please".into()));

        let state = shared.lock();
        assert_eq!(state.connection_state, ConnectionState::Error);
        assert_eq!(state.error_message.as_deref(), Some("retry please"));
        assert!(state.practice.sentence().is_none());
        assert!(state.transcript.is_empty());
    }
}
