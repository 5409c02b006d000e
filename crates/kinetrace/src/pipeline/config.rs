use crate::config::{Config, StagesConfig};
use crate::paths::FolderLayout;

/// The subset of the configuration a pipeline run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub layout: FolderLayout,
    pub stages: StagesConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            layout: FolderLayout::from_config(&config.folders),
            stages: config.stages.clone(),
        }
    }
}
