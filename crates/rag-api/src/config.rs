use rag_core::config::EngineConfig;
use serde::Deserialize;

/// `rag-api`'s overlay on top of the shared engine config, mirroring the
/// teacher's `rag-api-server/src/config/settings.rs` `Settings` struct
/// (one sub-config per concern: server, security/auth, cors).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    #[serde(flatten)]
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub rag: RagExecConfig,
}

/// Query executor (C11) tuning, mirroring the teacher's `RagConfig`'s
/// `max_context_tokens` but scoped to the prompt this engine assembles
/// rather than a reranked multi-document context.
#[derive(Debug, Clone, Deserialize)]
pub struct RagExecConfig {
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,
}

fn default_max_prompt_tokens() -> usize {
    6000
}

impl Default for RagExecConfig {
    fn default() -> Self {
        Self {
            max_prompt_tokens: default_max_prompt_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiration_secs")]
    pub jwt_expiration_secs: u64,
}

fn default_jwt_expiration_secs() -> u64 {
    86_400
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// spec.md §6's optional self-ping collaborator: when `url` is set, a
/// background task requests it every `interval_ms` to keep a free-tier
/// deployment warm.
#[derive(Debug, Clone, Deserialize)]
pub struct KeepaliveConfig {
    pub url: Option<String>,
    #[serde(default = "default_keepalive_interval_ms")]
    pub interval_ms: u64,
}

fn default_keepalive_interval_ms() -> u64 {
    840_000
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            url: None,
            interval_ms: default_keepalive_interval_ms(),
        }
    }
}

impl ApiSettings {
    /// Same `config/settings.toml` + `APP__`-prefixed env layering as
    /// `EngineConfig::load`, then the spec.md §6 raw env overlay for
    /// `CORS_ALLOWED_ORIGINS`, `KEEPALIVE_URL`, `KEEPALIVE_INTERVAL_MS`.
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

        if let Ok(origins) = std::env::var("CORS_ALLOWED_ORIGINS") {
            settings.cors.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(url) = std::env::var("KEEPALIVE_URL") {
            settings.keepalive.url = Some(url);
        }
        if let Ok(interval) = std::env::var("KEEPALIVE_INTERVAL_MS") {
            if let Ok(ms) = interval.parse::<u64>() {
                settings.keepalive.interval_ms = ms;
            }
        }

        Ok(settings)
    }
}
