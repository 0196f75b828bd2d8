//! Wire protocol of the realtime co-host endpoint.
//!
//! The endpoint speaks JSON over a WebSocket.  Every client frame is an
//! externally-tagged object carrying either the session setup or a batch of
//! realtime media chunks; every server frame is a sparse object where any
//! combination of fields may be present.  [`ServerMessage::events`] flattens
//! one wire frame into the ordered list of facts it carries.

use serde::{Deserialize, Serialize};

use crate::constants::{AUDIO_MIME, VIDEO_MIME};
use crate::types::Speaker;

/// Messages sent *to* the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session configuration, sent once immediately after the socket opens.
    Setup(Setup),

    /// A batch of captured media chunks.
    RealtimeInput(RealtimeInput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// Co-host model to run the session against.
    pub model: String,
    /// Instruction framing the co-host persona.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
    /// Synthetic voice name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

/// One base64-encoded media payload with its content tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    /// Base64-encoded payload bytes.
    pub data: String,
}

impl MediaChunk {
    /// Outbound 16 kHz PCM audio chunk.
    pub fn audio(data: String) -> Self {
        Self {
            mime_type: AUDIO_MIME.to_string(),
            data,
        }
    }

    /// Outbound JPEG video frame.
    pub fn jpeg(data: String) -> Self {
        Self {
            mime_type: VIDEO_MIME.to_string(),
            data,
        }
    }
}

/// Messages received *from* the endpoint.  All fields are optional; a single
/// frame may carry several of them at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<SetupComplete>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Transcription of the host's microphone input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,

    /// Transcription of the co-host's synthesized reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,

    /// Synthesized reply content (inline 24 kHz PCM audio parts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<ModelTurn>,

    /// The host spoke over synthesized playback; flush pending audio.
    #[serde(default)]
    pub interrupted: bool,

    #[serde(default)]
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelTurn {
    pub parts: Vec<TurnPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaChunk>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One fact carried by a server frame, in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    SetupComplete,
    Transcription { speaker: Speaker, text: String },
    /// Base64-encoded inline audio payload (24 kHz PCM).
    Audio { data: String },
    Interrupted,
    TurnComplete,
}

impl ServerMessage {
    /// Flatten this frame into the ordered facts it carries.
    ///
    /// Ordering matters for audio: inline parts must be scheduled in wire
    /// order, and an interruption flag applies before any audio in a later
    /// frame.
    pub fn events(&self) -> Vec<ServerEvent> {
        let mut out = Vec::new();

        if self.setup_complete.is_some() {
            out.push(ServerEvent::SetupComplete);
        }

        if let Some(content) = &self.server_content {
            if content.interrupted {
                out.push(ServerEvent::Interrupted);
            }
            if let Some(t) = &content.input_transcription {
                out.push(ServerEvent::Transcription {
                    speaker: Speaker::Host,
                    text: t.text.clone(),
                });
            }
            if let Some(t) = &content.output_transcription {
                out.push(ServerEvent::Transcription {
                    speaker: Speaker::CoHost,
                    text: t.text.clone(),
                });
            }
            if let Some(turn) = &content.model_turn {
                for part in &turn.parts {
                    if let Some(chunk) = &part.inline_data {
                        out.push(ServerEvent::Audio {
                            data: chunk.data.clone(),
                        });
                    }
                }
            }
            if content.turn_complete {
                out.push(ServerEvent::TurnComplete);
            }
        }

        out
    }
}

impl ClientMessage {
    /// Serialize to the JSON text sent over the socket.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Parse a JSON text frame received from the socket.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_input_uses_external_tag() {
        let msg = ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk::audio("AAAA".into())],
        });
        let json = msg.to_json().unwrap();
        assert!(json.starts_with(r#"{"realtimeInput""#));
        assert!(json.contains(r#""mimeType":"audio/pcm;rate=16000""#));
    }

    #[test]
    fn server_frame_flattens_in_wire_order() {
        let json = r#"{
            "serverContent": {
                "interrupted": true,
                "outputTranscription": { "text": "hello there" },
                "modelTurn": {
                    "parts": [
                        { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "UklGRg==" } },
                        { "text": "hello there" }
                    ]
                }
            }
        }"#;

        let msg = ServerMessage::from_json(json).unwrap();
        let events = msg.events();

        assert_eq!(events[0], ServerEvent::Interrupted);
        assert_eq!(
            events[1],
            ServerEvent::Transcription {
                speaker: Speaker::CoHost,
                text: "hello there".into()
            }
        );
        assert_eq!(
            events[2],
            ServerEvent::Audio {
                data: "UklGRg==".into()
            }
        );
    }

    #[test]
    fn missing_fields_parse_to_empty_frame() {
        let msg = ServerMessage::from_json("{}").unwrap();
        assert!(msg.events().is_empty());
    }
}
