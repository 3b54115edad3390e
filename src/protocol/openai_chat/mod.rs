use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::config::UpstreamConfig;
use crate::modes::ModeDescriptor;
use crate::protocol::canonical::OptimizeRequest;

/// OpenAI-compatible chat completion request wire type.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: Vec<ChatContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    Text { text: String },
    ImageUrl { image_url: ChatImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatImageUrl {
    pub url: String,
}

fn data_uri(mime_type: &str, data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut uri = String::with_capacity(mime_type.len() + encoded.len() + 13);
    uri.push_str("data:");
    uri.push_str(mime_type);
    uri.push_str(";base64,");
    uri.push_str(&encoded);
    uri
}

/// Build the upstream request for one optimization.
#[must_use]
pub fn build_request(
    upstream: &UpstreamConfig,
    descriptor: &ModeDescriptor,
    request: &OptimizeRequest,
    instruction: String,
    stream: bool,
) -> ChatCompletionRequest {
    let mut content = Vec::with_capacity(1 + request.images.len());
    content.push(ChatContentPart::Text { text: instruction });
    content.extend(request.images.iter().map(|image| ChatContentPart::ImageUrl {
        image_url: ChatImageUrl {
            url: data_uri(&image.mime_type, &image.data),
        },
    }));

    ChatCompletionRequest {
        model: upstream.model.clone(),
        messages: vec![ChatMessage {
            role: "user",
            content,
        }],
        stream,
        temperature: upstream.temperature,
        top_p: upstream.top_p,
        max_tokens: descriptor
            .max_output_tokens
            .unwrap_or(upstream.max_output_tokens),
    }
}
