use crate::config::ConverterConfig;
use crate::services::storage::TransientStorage;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &ConverterConfig) -> anyhow::Result<Arc<TransientStorage>> {
    let storage = TransientStorage::new(&config.uploads_dir, &config.output_dir);
    storage.ensure_roots().await?;

    info!(
        "📁 Scratch storage: uploads={} output={}",
        storage.uploads_root().display(),
        storage.output_root().display()
    );

    Ok(Arc::new(storage))
}
