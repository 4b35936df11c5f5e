pub mod providers;
pub mod retry;

use trellis_core::config::ModelConfig;
use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::LlmClient;

pub use providers::presets::{all_preset_names, get_preset};
pub use providers::OpenAiClient;
pub use retry::RetryingClient;

/// Create the text-generation client for `config`.
///
/// Known providers and any provider with an explicit `base_url` use the
/// OpenAI-compatible client. The client is wrapped in retries when
/// `[model.retry]` is set.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    if get_preset(&config.provider).is_none() && config.base_url.is_none() {
        return Err(TrellisError::UnsupportedProvider(config.provider.clone()));
    }

    let client: Box<dyn LlmClient> = Box::new(OpenAiClient::new(config.clone()));
    Ok(match &config.retry {
        Some(retry) => Box::new(RetryingClient::new(client, retry.clone())),
        None => client,
    })
}
