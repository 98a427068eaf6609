//! In-memory [`SourceClient`] and a throwaway workspace.

use crate::config::{Config, PathsConfig};
use crate::context::RunContext;
use crate::dataset::EventType;
use crate::error::SourceError;
use crate::source::{FetchParams, SourceClient};
use crate::table::EventRecord;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tempfile::TempDir;

#[derive(Clone, Debug)]
enum Canned {
    Records(Vec<EventRecord>),
    Unreachable(String),
    Unauthorized,
}

/// Serves canned records per upstream action and counts every fetch.
///
/// Actions with nothing registered fail with [`SourceError::NotConfigured`].
#[derive(Debug, Default)]
pub struct MockSource {
    canned: HashMap<String, Canned>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_records(mut self, action: &str, records: Vec<EventRecord>) -> Self {
        self.canned.insert(action.to_string(), Canned::Records(records));
        self
    }

    /// Fetches for `action` fail as if retries were exhausted.
    #[must_use]
    pub fn with_failure(mut self, action: &str, message: &str) -> Self {
        self.canned
            .insert(action.to_string(), Canned::Unreachable(message.to_string()));
        self
    }

    /// Fetches for `action` are rejected with HTTP 401.
    #[must_use]
    pub fn with_auth_failure(mut self, action: &str) -> Self {
        self.canned.insert(action.to_string(), Canned::Unauthorized);
        self
    }

    /// Fetches made so far for `action`.
    #[must_use]
    pub fn calls(&self, action: &str) -> usize {
        self.lock().get(action).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.lock().values().sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SourceClient for MockSource {
    fn fetch(&self, event_type: &EventType, params: &FetchParams) -> Result<Vec<EventRecord>, SourceError> {
        *self.lock().entry(params.action.clone()).or_default() += 1;
        match self.canned.get(&params.action) {
            Some(Canned::Records(records)) => Ok(records.clone()),
            Some(Canned::Unreachable(message)) => Err(SourceError::RetriesExhausted {
                attempts: 1,
                last: message.clone(),
            }),
            Some(Canned::Unauthorized) => Err(SourceError::Auth { status: 401 }),
            None => Err(SourceError::NotConfigured(format!(
                "no canned records for {event_type}"
            ))),
        }
    }
}

/// Temp directory with a [`Config`] whose paths all live inside it.
///
/// Everything is removed when the workspace is dropped.
pub struct TestWorkspace {
    dir: TempDir,
    config: Config,
}

impl TestWorkspace {
    /// # Errors
    /// Returns an error if the temp directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        Self::with_config(Config::default())
    }

    /// Use `config`, replacing its paths.
    ///
    /// # Errors
    /// Returns an error if the temp directory cannot be created.
    pub fn with_config(mut config: Config) -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        config.paths = PathsConfig::under(dir.path());
        Ok(Self { dir, config })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Run context over this workspace's config, fetching from `source`.
    #[must_use]
    pub fn context(&self, source: impl SourceClient + 'static) -> RunContext {
        RunContext::new(&self.config, Arc::new(source))
    }

    /// Like [`TestWorkspace::context`], keeping a handle on the source for call counts.
    #[must_use]
    pub fn shared_context<S: SourceClient + 'static>(&self, source: &Arc<S>) -> RunContext {
        let source: Arc<dyn SourceClient> = source.clone();
        RunContext::new(&self.config, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn counts_calls_per_action() {
        let src = MockSource::new()
            .with_records("A", vec![record! { "x" => 1 }])
            .with_failure("B", "timed out");
        let a = EventType::new("a", "A");
        let b = EventType::new("b", "B");
        assert_eq!(src.fetch(&a, &FetchParams::for_action("A")).unwrap().len(), 1);
        assert!(src.fetch(&b, &FetchParams::for_action("B")).is_err());
        assert!(matches!(
            src.fetch(&a, &FetchParams::for_action("C")),
            Err(SourceError::NotConfigured(_))
        ));
        assert_eq!(src.calls("A"), 1);
        assert_eq!(src.total_calls(), 3);
    }

    #[test]
    fn workspace_paths_are_isolated() {
        let ws = TestWorkspace::new().unwrap();
        assert!(ws.config().paths.raw_dir.starts_with(ws.path()));
        assert!(ws.config().paths.report_path.starts_with(ws.path()));
    }
}
