use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::config::UpstreamConfig;
use crate::modes::ModeDescriptor;
use crate::protocol::canonical::OptimizeRequest;

/// Gemini v1beta generateContent request wire type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    pub generation_config: GeminiGenerationConfig,
    pub safety_settings: Vec<GeminiSafetySetting>,
}

/// A content message in Gemini format.
#[derive(Debug, Clone, Serialize)]
pub struct GeminiContent {
    pub role: &'static str,
    pub parts: Vec<GeminiPart>,
}

/// A single part within a Gemini content message.
#[derive(Debug, Clone, Serialize)]
pub enum GeminiPart {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "inlineData")]
    InlineData(GeminiBlob),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiBlob {
    pub mime_type: String,
    /// Base64 image bytes.
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GeminiThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiThinkingConfig {
    pub thinking_budget: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeminiSafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

const SAFETY_CATEGORIES: [&str; 2] = ["HARM_CATEGORY_HARASSMENT", "HARM_CATEGORY_HATE_SPEECH"];

/// Build the upstream request for one optimization.
#[must_use]
pub fn build_request(
    upstream: &UpstreamConfig,
    descriptor: &ModeDescriptor,
    request: &OptimizeRequest,
    instruction: String,
) -> GeminiRequest {
    let mut parts = Vec::with_capacity(1 + request.images.len());
    parts.push(GeminiPart::Text(instruction));
    parts.extend(request.images.iter().map(|image| {
        GeminiPart::InlineData(GeminiBlob {
            mime_type: image.mime_type.clone(),
            data: STANDARD.encode(&image.data),
        })
    }));

    GeminiRequest {
        contents: vec![GeminiContent {
            role: "user",
            parts,
        }],
        generation_config: GeminiGenerationConfig {
            temperature: upstream.temperature,
            top_k: upstream.top_k,
            top_p: upstream.top_p,
            max_output_tokens: descriptor
                .max_output_tokens
                .unwrap_or(upstream.max_output_tokens),
            thinking_config: descriptor
                .thinking_budget
                .map(|thinking_budget| GeminiThinkingConfig { thinking_budget }),
        },
        safety_settings: SAFETY_CATEGORIES
            .iter()
            .map(|category| GeminiSafetySetting {
                category,
                threshold: "BLOCK_MEDIUM_AND_ABOVE",
            })
            .collect(),
    }
}
