use rag_core::config::EngineConfig;
use serde::Deserialize;

/// Worker-specific overlay on top of the shared engine config, mirroring
/// the teacher's `rag-embedding-worker/src/config/settings.rs` split
/// between engine-wide and binary-specific sections.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    #[serde(flatten)]
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub dir: std::path::PathBuf,
}

impl WorkerSettings {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/settings").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );
        let mut settings: Self = builder.build()?.try_deserialize()?;
        settings.engine.apply_std_env_overrides();
        Ok(settings)
    }
}
