mod request_id;

use crate::config::AppConfig;
use crate::error::RelayError;
use crate::modes::{render_prompt, ModeDescriptor};
use crate::protocol::canonical::OutputLanguage;
use crate::transport::{HttpTransport, PreparedUpstream};

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub upstream: PreparedUpstream,
    request_ids: RequestIdGenerator,
}

impl AppState {
    /// Build state from a validated config.
    ///
    /// # Errors
    ///
    /// Propagates [`HttpTransport::new`] failures.
    pub fn new(config: AppConfig) -> Result<Self, RelayError> {
        let transport = HttpTransport::new(&config.server, config.upstream.proxy.as_deref())?;
        let upstream = PreparedUpstream::new(&config.upstream);
        Ok(Self {
            config,
            transport,
            upstream,
            request_ids: RequestIdGenerator::new(),
        })
    }

    #[must_use]
    pub fn next_request_id(&self) -> String {
        self.request_ids.next_id()
    }

    /// Instruction text for `descriptor`, honoring configured overrides.
    #[must_use]
    pub fn instruction_for(
        &self,
        descriptor: &ModeDescriptor,
        prompt: &str,
        language: OutputLanguage,
    ) -> String {
        let template = self
            .config
            .features
            .prompt_templates
            .get(descriptor.name)
            .map_or(descriptor.template, String::as_str);
        render_prompt(template, prompt, language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::OptimizeMode;

    #[test]
    fn configured_template_overrides_builtin() {
        let mut config = AppConfig::default();
        config.features.prompt_templates.insert(
            "generate".to_string(),
            "Rewrite in {language}: {prompt}".to_string(),
        );
        let state = AppState::new(config).unwrap();
        assert_eq!(
            state.instruction_for(
                OptimizeMode::Generate.descriptor(),
                "a cat",
                OutputLanguage::Zh
            ),
            "Rewrite in Simplified Chinese: a cat"
        );

        let builtin = state.instruction_for(
            OptimizeMode::Edit.descriptor(),
            "a cat",
            OutputLanguage::En,
        );
        assert!(builtin.contains("a cat"));
        assert!(!builtin.contains("{prompt}"));
    }
}
