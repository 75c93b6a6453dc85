//! WebSocket client for the realtime voice service.
//!
//! One connection per session. The socket is split into a writer task fed
//! by a channel (outbound audio frames and tool responses, fire-and-forget)
//! and a reader task that translates raw JSON messages into [`LiveEvent`]s
//! consumed in arrival order by the session loop.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

use crate::audio::CAPTURE_SAMPLE_RATE;
use crate::live::config::LiveConfig;
use crate::live::wire::{
    capture_mime_type, ClientMessage, Content, FunctionCall, FunctionResponse, GenerationConfig,
    MediaChunk, RealtimeInput, ServerMessage, Setup, Tool, ToolResponse,
};
use crate::{ParlaError, Result};

/// Inbound event union delivered to the session's single-consumer loop
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// Service accepted the setup message
    SetupComplete,

    /// Transcription of the learner's speech
    InputTranscript(String),

    /// Transcription of the tutor's speech
    OutputTranscript(String),

    /// Structured invocation requests, each requiring an acknowledgment
    ToolCalls(Vec<FunctionCall>),

    /// Synthesized audio chunk, PCM16 bytes already base64-decoded
    Audio(Vec<u8>),

    /// The model finished its dialogue turn
    TurnComplete,

    /// Fatal transport or service error
    Error(String),

    /// The connection ended
    Closed,
}

enum Outbound {
    Message(Box<ClientMessage>),
    Close,
}

/// Handle to one live connection
pub struct LiveClient {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    capture_mime: String,
}

impl LiveClient {
    /// Open the connection and send the setup message.
    ///
    /// Returns the client handle and the inbound event stream. The caller
    /// should treat the first `SetupComplete` as the session going live.
    pub async fn connect(config: &LiveConfig) -> Result<(Self, mpsc::UnboundedReceiver<LiveEvent>)> {
        let (stream, _) = connect_async(config.url())
            .await
            .map_err(|e| ParlaError::ConnectionError(format!("WebSocket connect failed: {}", e)))?;

        debug!("Connected to voice service at {}", config.endpoint);

        let (mut write, mut read) = stream.split();

        let setup = ClientMessage::setup(Setup {
            model: config.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
            },
            system_instruction: Content::from_text(&config.system_instruction),
            tools: vec![Tool {
                function_declarations: config.tools.clone(),
            }],
            input_audio_transcription: json!({}),
            output_audio_transcription: json!({}),
        });

        let text = serde_json::to_string(&setup)
            .map_err(|e| ParlaError::ConnectionError(format!("Setup serialization: {}", e)))?;
        write
            .send(Message::Text(text))
            .await
            .map_err(|e| ParlaError::ConnectionError(format!("Setup send failed: {}", e)))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

        // Writer: drains outbound traffic until closed or the socket dies
        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Message(msg) => {
                        let text = match serde_json::to_string(&msg) {
                            Ok(text) => text,
                            Err(e) => {
                                error!("Failed to serialize outbound message: {}", e);
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(text)).await {
                            warn!("Outbound send failed, writer exiting: {}", e);
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        // Reader: one event per wire message, in arrival order
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        dispatch_server_message(text.as_bytes(), &event_tx);
                    }
                    Ok(Message::Binary(bytes)) => {
                        dispatch_server_message(&bytes, &event_tx);
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx.send(LiveEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            let _ = event_tx.send(LiveEvent::Closed);
        });

        Ok((
            Self {
                outbound_tx,
                capture_mime: capture_mime_type(CAPTURE_SAMPLE_RATE),
            },
            event_rx,
        ))
    }

    /// Send one captured audio frame; never waits for acknowledgment
    pub fn send_realtime_audio(&self, frame: &[u8]) -> Result<()> {
        let message = ClientMessage::realtime_input(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: self.capture_mime.clone(),
                data: BASE64.encode(frame),
            }],
        });
        self.send(message)
    }

    /// Acknowledge a tool call by id
    pub fn send_tool_response(&self, id: &str, name: &str, result: &str) -> Result<()> {
        let message = ClientMessage::tool_response(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: id.to_string(),
                name: name.to_string(),
                response: json!({ "result": result }),
            }],
        });
        self.send(message)
    }

    /// Close the connection; safe to call after the socket already died
    pub fn close(&self) {
        let _ = self.outbound_tx.send(Outbound::Close);
    }

    fn send(&self, message: ClientMessage) -> Result<()> {
        self.outbound_tx
            .send(Outbound::Message(Box::new(message)))
            .map_err(|_| ParlaError::ChannelError("Connection writer is gone".into()))
    }
}

/// Translate one raw service message into events
fn dispatch_server_message(raw: &[u8], event_tx: &mpsc::UnboundedSender<LiveEvent>) {
    let message: ServerMessage = match serde_json::from_slice(raw) {
        Ok(message) => message,
        Err(e) => {
            warn!("Unparseable service message dropped: {}", e);
            return;
        }
    };

    if message.setup_complete.is_some() {
        let _ = event_tx.send(LiveEvent::SetupComplete);
    }

    if let Some(error) = message.error {
        let _ = event_tx.send(LiveEvent::Error(error.message));
    }

    if let Some(tool_call) = message.tool_call {
        if !tool_call.function_calls.is_empty() {
            let _ = event_tx.send(LiveEvent::ToolCalls(tool_call.function_calls));
        }
    }

    if let Some(content) = message.server_content {
        if let Some(transcription) = content.input_transcription {
            let _ = event_tx.send(LiveEvent::InputTranscript(transcription.text));
        }
        if let Some(transcription) = content.output_transcription {
            let _ = event_tx.send(LiveEvent::OutputTranscript(transcription.text));
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                let Some(chunk) = part.inline_data else { continue };
                match BASE64.decode(chunk.data.as_bytes()) {
                    Ok(bytes) => {
                        let _ = event_tx.send(LiveEvent::Audio(bytes));
                    }
                    // Corrupt chunk: drop it, the session stays healthy
                    Err(e) => warn!("Dropped undecodable audio chunk: {}", e),
                }
            }
        }
        if content.turn_complete == Some(true) {
            let _ = event_tx.send(LiveEvent::TurnComplete);
        }
    }
}
