// ============================================================================
// Chat Infrastructure - Completion Relay Client
// File: crates/chat-infrastructure/src/llm/completion_client.rs
// Description: Streams chat completions from an OpenAI-compatible endpoint
// ============================================================================

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use chat_core::domain::ConversationId;
use chat_core::providers::{CompletionProvider, RelayFragment, RelayStream};
use chat_shared::config::LlmSettings;

const DATA_PREFIX: &str = "data: ";
const DONE_LINE: &str = "data: [DONE]";

pub const ENCODING_FAILED: &str = "Error encoding request";
pub const CONNECT_FAILED: &str = "Error connecting to LLM service";
pub const UPSTREAM_FAILED: &str = "Error: LLM service returned an error";
pub const READ_FAILED: &str = "Error reading LLM response";

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

// Streamed response chunk
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    pub choices: Vec<ChoiceChunk>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceChunk {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

/// What one response line means to the relay.
#[derive(Debug, PartialEq, Eq)]
enum ChunkLine {
    Empty,
    Done,
    Content(String),
    Malformed(String),
}

fn parse_line(line: &str) -> ChunkLine {
    let line = line.trim_end_matches('\r');
    if line.is_empty() {
        return ChunkLine::Empty;
    }
    if line == DONE_LINE {
        return ChunkLine::Done;
    }

    let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line);
    match serde_json::from_str::<ChatCompletionChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(ChunkLine::Content)
            .unwrap_or(ChunkLine::Empty),
        Err(e) => ChunkLine::Malformed(e.to_string()),
    }
}

/// Streaming client for the completion provider.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl CompletionClient {
    /// No request timeout is set: a completion may stream for as long as
    /// the provider keeps sending.
    pub fn new(settings: &LlmSettings) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().build()?,
            url: settings.url.clone(),
            api_key: settings.api_key.clone().filter(|key| !key.is_empty()),
            model: settings.model.clone(),
        })
    }
}

impl CompletionProvider for CompletionClient {
    fn stream(&self, conversation_id: &ConversationId, prompt: &str) -> RelayStream {
        let conversation_id = *conversation_id;
        let body = serde_json::to_vec(&ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        });

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        Box::pin(async_stream::stream! {
            let body = match body {
                Ok(body) => body,
                Err(e) => {
                    error!("Failed to encode completion request: {}", e);
                    yield RelayFragment::Failed(ENCODING_FAILED.to_string());
                    return;
                }
            };

            let response = match request.body(body).send().await {
                Ok(response) => response,
                Err(e) => {
                    error!("Completion request for {} failed: {}", conversation_id, e);
                    yield RelayFragment::Failed(CONNECT_FAILED.to_string());
                    return;
                }
            };

            if !response.status().is_success() {
                error!(
                    "Completion provider answered {} for {}",
                    response.status(),
                    conversation_id
                );
                yield RelayFragment::Failed(UPSTREAM_FAILED.to_string());
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut finished = false;

            while !finished {
                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        error!("Reading completion for {} failed: {}", conversation_id, e);
                        yield RelayFragment::Failed(READ_FAILED.to_string());
                        return;
                    }
                    // Flush a final line without a trailing newline.
                    None => {
                        buffer.push(b'\n');
                        finished = true;
                    }
                }

                while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=end).collect();
                    let line = String::from_utf8_lossy(&line[..end]);
                    match parse_line(&line) {
                        ChunkLine::Empty => {}
                        ChunkLine::Done => {
                            debug!("Completion for {} done", conversation_id);
                            return;
                        }
                        ChunkLine::Content(content) => yield RelayFragment::Delta(content),
                        ChunkLine::Malformed(reason) => {
                            warn!("Skipping malformed completion chunk: {}", reason);
                        }
                    }
                }
            }
        })
    }
}
