use crate::config::ConverterConfig;
use crate::services::conversion_provider::ConversionProvider;
use crate::services::conversion_provider::cloudconvert::CloudConvertProvider;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub fn setup_provider(config: &ConverterConfig) -> anyhow::Result<Arc<dyn ConversionProvider>> {
    let base_url = url::Url::parse(&config.api_base_url)
        .with_context(|| format!("Invalid CLOUDCONVERT_API_URL '{}'", config.api_base_url))?;

    info!(
        "☁️  Conversion provider: {} (API key: {}, poll: {} × {}ms)",
        base_url,
        if config.api_key.is_some() { "YES" } else { "NO" },
        config.max_poll_attempts,
        config.poll_interval_ms
    );
    if config.api_key.is_none() {
        tracing::warn!(
            "⚠️  CLOUDCONVERT_API_KEY is not set! Every conversion will fail until it is configured."
        );
    }

    Ok(Arc::new(CloudConvertProvider::from_config(config)))
}
