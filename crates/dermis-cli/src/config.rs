use anyhow::{Context, Result};
use dermis_core::AnalyzerConfig;
use std::path::{Path, PathBuf};

/// Environment variable naming an optional TOML configuration file.
pub const CONFIG_ENV: &str = "DERMIS_CONFIG";

/// Load analyzer settings.
///
/// Precedence, lowest first: built-in defaults, the TOML file (`path`, else
/// `DERMIS_CONFIG`), then `DERMIS_*` environment variables.
pub fn load(path: Option<&Path>) -> Result<AnalyzerConfig> {
    load_with(path, |key| std::env::var(key).ok())
}

fn load_with(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<AnalyzerConfig> {
    let file = path.map(Path::to_path_buf).or_else(|| env(CONFIG_ENV).map(PathBuf::from));

    let base = match &file {
        Some(file) => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("reading config file {}", file.display()))?;
            let config: AnalyzerConfig = toml::from_str(&text)
                .with_context(|| format!("parsing config file {}", file.display()))?;
            tracing::debug!(path = %file.display(), "config file loaded");
            config
        }
        None => AnalyzerConfig::default(),
    };

    Ok(AnalyzerConfig {
        model_dir: env("DERMIS_MODEL_DIR").map(PathBuf::from).unwrap_or(base.model_dir),
        seed: env_parse(&env, "DERMIS_SEED", base.seed),
        sample_count: env_parse(&env, "DERMIS_SAMPLE_COUNT", base.sample_count),
        min_accuracy: env_parse(&env, "DERMIS_MIN_ACCURACY", base.min_accuracy),
        usability_floor: env_parse(&env, "DERMIS_USABILITY_FLOOR", base.usability_floor),
    })
}

fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match env(key) {
        Some(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparseable setting");
            default
        }),
        None => default,
    }
}
