use std::sync::Arc;

use agent_provider::{ChatModel, ProviderInitError};
use agent_provider_chat_api::{ChatApiProvider, ChatApiProviderConfig, CHAT_API_PROVIDER_ID};
use agent_provider_mock::{ScriptedModel, MOCK_PROVIDER_ID};

use crate::config::AgentConfig;

pub const DEFAULT_PROVIDER_ID: &str = CHAT_API_PROVIDER_ID;
pub const PROVIDER_ENV_VAR: &str = "CODING_AGENT_PROVIDER";

pub fn provider_from_env(config: &AgentConfig) -> Result<Arc<dyn ChatModel>, ProviderInitError> {
    let provider_id = std::env::var(PROVIDER_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    provider_for_id(provider_id.as_deref().unwrap_or(DEFAULT_PROVIDER_ID), config)
}

pub fn provider_for_id(
    provider_id: &str,
    config: &AgentConfig,
) -> Result<Arc<dyn ChatModel>, ProviderInitError> {
    match provider_id {
        CHAT_API_PROVIDER_ID => {
            let mut provider_config = ChatApiProviderConfig::new(config.model.clone())
                .with_base_url(config.base_url.clone())
                .with_max_tokens(config.max_tokens)
                .with_timeout(config.timeout);
            if let Some(api_key) = config.api_key.as_ref() {
                provider_config = provider_config.with_api_key(api_key.clone());
            }
            Ok(Arc::new(ChatApiProvider::new(provider_config)?))
        }
        MOCK_PROVIDER_ID => Ok(Arc::new(ScriptedModel::interactive())),
        unknown => Err(ProviderInitError::new(format!(
            "Unsupported provider '{unknown}'. Available providers: {CHAT_API_PROVIDER_ID}, {MOCK_PROVIDER_ID}"
        ))),
    }
}
