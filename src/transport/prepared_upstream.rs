use crate::config::{ProviderKind, StreamFormat, UpstreamConfig};
use crate::error::RelayError;
use crate::modes::ModeDescriptor;
use crate::protocol::canonical::{OptimizeRequest, UpstreamShape};
use crate::protocol::{gemini, openai_chat};

/// Upstream endpoints and static headers computed once at startup.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    provider_kind: ProviderKind,
    stream_format: StreamFormat,
    generate_url: String,
    stream_array_url: String,
    stream_sse_url: String,
    static_headers: http::HeaderMap,
}

impl PreparedUpstream {
    #[must_use]
    pub fn new(upstream: &UpstreamConfig) -> Self {
        let base = upstream.base_url.trim_end_matches('/');
        let (generate_url, stream_array_url, stream_sse_url) = match upstream.provider {
            ProviderKind::Gemini => {
                let prefix = format!("{base}/models/{}", upstream.model);
                let stream_url = format!("{prefix}:streamGenerateContent");
                (
                    format!("{prefix}:generateContent"),
                    stream_url.clone(),
                    format!("{stream_url}?alt=sse"),
                )
            }
            ProviderKind::OpenAi => {
                let chat_url = format!("{base}/chat/completions");
                (chat_url.clone(), chat_url.clone(), chat_url)
            }
        };

        let mut static_headers = http::HeaderMap::new();
        static_headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );

        Self {
            provider_kind: upstream.provider,
            stream_format: upstream.stream_format,
            generate_url,
            stream_array_url,
            stream_sse_url,
            static_headers,
        }
    }

    #[must_use]
    pub fn provider_kind(&self) -> ProviderKind {
        self.provider_kind
    }

    /// Wire shape the upstream will answer a streaming call with.
    #[must_use]
    pub fn stream_shape(&self, descriptor: &ModeDescriptor) -> UpstreamShape {
        match (self.provider_kind, self.stream_format) {
            (ProviderKind::OpenAi, _) | (ProviderKind::Gemini, StreamFormat::Sse) => {
                UpstreamShape::LineDelimited
            }
            (ProviderKind::Gemini, StreamFormat::Array) => UpstreamShape::SnapshotArray,
            (ProviderKind::Gemini, StreamFormat::Auto) => descriptor.default_shape,
        }
    }

    #[must_use]
    pub fn request_url(&self, stream: Option<UpstreamShape>) -> &str {
        match stream {
            None => &self.generate_url,
            Some(UpstreamShape::SnapshotArray) => &self.stream_array_url,
            Some(UpstreamShape::LineDelimited) => &self.stream_sse_url,
        }
    }

    /// Static headers plus the provider's credential header.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the key is not a valid header value.
    pub fn request_headers(&self, api_key: &str) -> Result<http::HeaderMap, RelayError> {
        let mut headers = self.static_headers.clone();
        let invalid = |_| RelayError::Config("API key contains invalid header characters".into());
        match self.provider_kind {
            ProviderKind::Gemini => {
                let mut value = http::HeaderValue::from_str(api_key).map_err(invalid)?;
                value.set_sensitive(true);
                headers.insert("x-goog-api-key", value);
            }
            ProviderKind::OpenAi => {
                let mut value =
                    http::HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(invalid)?;
                value.set_sensitive(true);
                headers.insert(http::header::AUTHORIZATION, value);
            }
        }
        Ok(headers)
    }

    /// Serialize the provider-specific request body.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if serialization fails.
    pub fn encode_body(
        &self,
        upstream: &UpstreamConfig,
        descriptor: &ModeDescriptor,
        request: &OptimizeRequest,
        instruction: String,
        stream: bool,
    ) -> Result<bytes::Bytes, RelayError> {
        let encoded = match self.provider_kind {
            ProviderKind::Gemini => serde_json::to_vec(&gemini::build_request(
                upstream,
                descriptor,
                request,
                instruction,
            )),
            ProviderKind::OpenAi => serde_json::to_vec(&openai_chat::build_request(
                upstream,
                descriptor,
                request,
                instruction,
                stream,
            )),
        };
        encoded
            .map(bytes::Bytes::from)
            .map_err(|err| RelayError::Internal(format!("Failed to encode upstream body: {err}")))
    }
}
