//! Model adapter implementations for codeloop.
//!
//! All adapters implement the `codeloop_core::ModelAdapter` trait. The
//! provider wire format stays in this crate; the query loop only sees text.

pub mod openai_compat;

use codeloop_config::AppConfig;
use codeloop_core::error::ModelError;
use tracing::debug;

pub use openai_compat::OpenAiCompatModel;

/// Build the configured model adapter.
///
/// A missing API key is only an error for the public OpenAI endpoint;
/// local servers usually accept anonymous requests.
pub fn build_from_config(config: &AppConfig) -> Result<OpenAiCompatModel, ModelError> {
    let is_openai = config.base_url.contains("api.openai.com");
    if is_openai && !config.has_api_key() {
        return Err(ModelError::NotConfigured(
            "no API key; set CODELOOP_API_KEY or OPENAI_API_KEY, or api_key in config.toml".into(),
        ));
    }

    let name = if is_openai { "openai" } else { "openai-compat" };
    debug!(adapter = name, base_url = %config.base_url, model = %config.model, "Building model adapter");

    Ok(
        OpenAiCompatModel::new(name, config.base_url.clone(), config.api_key.clone())?
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloop_core::model::ModelAdapter;

    #[test]
    fn openai_requires_key() {
        let config = AppConfig {
            api_key: None,
            ..AppConfig::default()
        };
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ModelError::NotConfigured(_)));
    }

    #[test]
    fn local_endpoint_needs_no_key() {
        let config = AppConfig {
            api_key: None,
            base_url: "http://localhost:11434/v1".into(),
            ..AppConfig::default()
        };
        let model = build_from_config(&config).unwrap();
        assert_eq!(model.name(), "openai-compat");
        assert_eq!(model.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn keyed_openai_builds() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        assert_eq!(build_from_config(&config).unwrap().name(), "openai");
    }
}
