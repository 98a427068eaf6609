//! The run context: every shared collaborator of one batch, built once and passed by
//! reference to the engine. Nothing in the crate reads global state.

use crate::cache::ExtractionCache;
use crate::config::Config;
use crate::encode::CategoricalEncoder;
use crate::metrics::MetricsCollector;
use crate::normalize::StructuralNormalizer;
use crate::sink::DatasetSink;
use crate::source::SourceClient;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation flag, checked by the engine between stages.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct RunContext {
    pub cache: ExtractionCache,
    pub sink: DatasetSink,
    pub source: Arc<dyn SourceClient>,
    pub normalizer: StructuralNormalizer,
    pub encoder: CategoricalEncoder,
    /// Encoded for every event type, before the policy's extra columns.
    pub default_categoricals: Vec<String>,
    pub metrics: MetricsCollector,
    pub cancel: CancelToken,
}

impl RunContext {
    /// Context wired from `config`, fetching through `source`.
    pub fn new(config: &Config, source: Arc<dyn SourceClient>) -> Self {
        Self {
            cache: ExtractionCache::new(&config.paths.raw_dir),
            sink: DatasetSink::new(&config.paths.clean_dir),
            source,
            normalizer: StructuralNormalizer::default(),
            encoder: config.encoding.encoder(),
            default_categoricals: config.encoding.default_columns.clone(),
            metrics: MetricsCollector::new(),
            cancel: CancelToken::new(),
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_normalizer(mut self, normalizer: StructuralNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
