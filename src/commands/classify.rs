use crate::api;
use crate::classifier::ClassifierClient;
use crate::commands::Out;
use crate::pipeline::{Pipeline, RunSummary};
use crate::{Config, Result};
use tracing::debug;

/// Runs the classification pipeline described by `config`.
pub async fn classify(config: Config) -> Result<Out<RunSummary>> {
    let settings = config.settings();
    debug!(
        "Classifying {} with model {} in batches of {}",
        config.input().display(),
        settings.model,
        settings.batch_size
    );
    let service = api::service(config.mode(), &settings.base_url, config.credential())?;
    let client = ClassifierClient::new(
        service,
        settings.model.clone(),
        &settings.categories()?,
        settings.retry_policy(),
    );
    let summary = Pipeline::new(config, client)?.run().await?;

    let message = format!(
        "Classified {} transactions ({} from cache, {} classified, {} fallback, {} out of \
        vocabulary) into {}",
        summary.total,
        summary.cached,
        summary.classified,
        summary.fallback,
        summary.out_of_vocabulary,
        summary.output.display()
    );
    Ok(Out::new(message, summary))
}
