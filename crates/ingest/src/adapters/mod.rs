//! Source adapter implementations and the provider factory.

pub mod archive;
pub mod live;

use std::sync::Arc;

use pitwall_core::Config;

use crate::adapter::SourceAdapter;
use crate::error::IngestError;

pub use archive::ArchiveAdapter;
pub use live::LiveAdapter;

/// Select the adapter for the configured source provider.
pub fn create_adapter(config: &Config) -> Result<Arc<dyn SourceAdapter>, IngestError> {
    match config.source.provider.as_str() {
        "live" => Ok(Arc::new(LiveAdapter::new(
            config.source.live_base_url.clone(),
            config.normalize.clone(),
        ))),
        "archive" => Ok(Arc::new(ArchiveAdapter::new(
            config.source.archive_base_url.clone(),
            config.normalize.clone(),
        ))),
        other => Err(IngestError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_rejects_unknown_providers() {
        let mut config = Config::default();
        config.source.provider = "csv".into();
        let err = create_adapter(&config).unwrap_err();
        assert!(matches!(err, IngestError::UnknownProvider(p) if p == "csv"));
    }

    #[test]
    fn factory_selects_by_provider_name() {
        let mut config = Config::default();
        config.source.provider = "live".into();
        assert_eq!(create_adapter(&config).unwrap().name(), "live");
        config.source.provider = "archive".into();
        assert_eq!(create_adapter(&config).unwrap().name(), "archive");
    }
}
