/// Configuration system for caresight.
///
/// Four layers, lowest precedence first:
///
/// 1. **Built-in defaults**: [`schema::CaresightConfig::default()`]
/// 2. **User global config**: `~/.caresight/config.toml`
/// 3. **Project local config**: `.caresight.toml` in the current directory
/// 4. **Environment variables**: `CARESIGHT_*` overrides (highest precedence)
///
/// Missing sections in a TOML file fall back to defaults.
///
/// # Usage
///
/// ```rust,ignore
/// use caresight::config;
///
/// let cfg = config::load();
/// let client = PredictionClient::from_config(&cfg);
/// ```
pub mod schema;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub use schema::{
    CaresightConfig, EndpointsConfig, LoggingConfig, PredictionConfig, RecommendationsConfig,
    StorageConfig, WebConfig,
};

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load the fully resolved configuration.
///
/// Merges all layers in order: defaults → global TOML → project TOML → env
/// vars. File layers merge key by key, so a project file that only sets
/// `[endpoints]` keeps the global `[recommendations]`.
pub fn load() -> CaresightConfig {
    let layers = [global_config_path(), project_config_path()]
        .into_iter()
        .filter_map(load_toml_file);
    let mut config = resolve_layers(layers);

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    config
}

/// Read one TOML layer.
///
/// Returns `None` if the path is `None`, the file doesn't exist, or the
/// content is not a valid config on its own. Malformed files are ignored so a
/// bad edit never blocks an upload.
fn load_toml_file(path: Option<PathBuf>) -> Option<toml::Value> {
    let path = path?;
    let content = fs::read_to_string(&path).ok()?;
    let value: toml::Value = toml::from_str(&content).ok()?;
    let _: CaresightConfig = value.clone().try_into().ok()?;
    Some(value)
}

/// Merge layers (lowest precedence first) over the defaults.
fn resolve_layers(layers: impl IntoIterator<Item = toml::Value>) -> CaresightConfig {
    let mut merged = toml::Value::Table(toml::Table::new());
    for layer in layers {
        merge_values(&mut merged, layer);
    }
    merged.try_into().unwrap_or_default()
}

/// Tables merge recursively; any other value in `overlay` replaces `base`.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

// ---------------------------------------------------------------------------
// File paths
// ---------------------------------------------------------------------------

/// Root of all caresight state: `~/.caresight/`.
pub fn caresight_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".caresight"))
}

fn global_config_path() -> Option<PathBuf> {
    caresight_home().map(|dir| dir.join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .map(|cwd| cwd.join(".caresight.toml"))
}

/// `~/.caresight/config.toml`, whether or not it exists.
pub fn global_config_file() -> Option<PathBuf> {
    global_config_path()
}

/// `.caresight.toml` in the working directory, whether or not it exists.
pub fn project_config_file() -> Option<PathBuf> {
    project_config_path()
}

// ---------------------------------------------------------------------------
// CARESIGHT_* variables
// ---------------------------------------------------------------------------

/// Apply `CARESIGHT_*` overrides on top of the file layers.
///
/// Supported variables:
/// - `CARESIGHT_MATERNAL_URL`, `CARESIGHT_CARDIOVASCULAR_URL`,
///   `CARESIGHT_GLUCOSE_URL`: upstream endpoints
/// - `CARESIGHT_TIMEOUT_MS`: prediction request timeout
/// - `CARESIGHT_RECOMMENDATIONS`: narrative generation on/off
/// - `CARESIGHT_MODEL`, `CARESIGHT_OLLAMA_URL`: recommendation backend
/// - `CARESIGHT_DATA_DIR`: patient store directory
/// - `CARESIGHT_LOGGING`: upload/event logging on/off
/// - `CARESIGHT_WEB_ADDR`: API server bind address
fn apply_env_overrides(config: &mut CaresightConfig, var: impl Fn(&str) -> Option<String>) {
    let non_empty = |name: &str| var(name).filter(|v| !v.is_empty());

    if let Some(val) = non_empty("CARESIGHT_MATERNAL_URL") {
        config.endpoints.maternal_url = val;
    }
    if let Some(val) = non_empty("CARESIGHT_CARDIOVASCULAR_URL") {
        config.endpoints.cardiovascular_url = val;
    }
    if let Some(val) = non_empty("CARESIGHT_GLUCOSE_URL") {
        config.endpoints.glucose_url = val;
    }
    if let Some(val) = var("CARESIGHT_TIMEOUT_MS")
        && let Ok(ms) = val.parse::<u64>()
    {
        config.prediction.timeout_ms = ms;
    }

    if let Some(val) = var("CARESIGHT_RECOMMENDATIONS") {
        config.recommendations.enabled = is_truthy(&val);
    }
    if let Some(val) = non_empty("CARESIGHT_MODEL") {
        config.recommendations.model = val;
    }
    if let Some(val) = non_empty("CARESIGHT_OLLAMA_URL") {
        config.recommendations.ollama_url = val;
    }

    if let Some(val) = non_empty("CARESIGHT_DATA_DIR") {
        config.storage.data_dir = val;
    }
    if let Some(val) = var("CARESIGHT_LOGGING") {
        config.logging.enabled = is_truthy(&val);
    }
    if let Some(val) = non_empty("CARESIGHT_WEB_ADDR") {
        config.web.addr = val;
    }
}

/// `1`, `true`, `yes` and `on`, in any case.
fn is_truthy(val: &str) -> bool {
    matches!(
        val.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ---------------------------------------------------------------------------
// Editing the global file
// ---------------------------------------------------------------------------

/// Write the default annotated config to `~/.caresight/config.toml`.
///
/// Returns an error if the file already exists (use `force = true` to
/// overwrite).
pub fn init_config(force: bool) -> Result<PathBuf> {
    let path = global_config_path().context("could not determine home directory")?;

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create ~/.caresight/ directory")?;
    }

    fs::write(&path, CaresightConfig::default_toml()).context("failed to write config file")?;

    Ok(path)
}

/// Set a single dotted key (`prediction.timeout_ms`) in the global config
/// file, starting from the defaults when the file does not exist yet.
pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let path = global_config_path().context("could not determine home directory")?;

    let content = if path.exists() {
        fs::read_to_string(&path).context("failed to read config file")?
    } else {
        toml::to_string_pretty(&CaresightConfig::default())
            .context("failed to serialize default config")?
    };

    let mut value_table: toml::Value =
        toml::from_str(&content).context("failed to parse config as TOML value")?;
    set_toml_value(&mut value_table, key, value)?;

    let output =
        toml::to_string_pretty(&value_table).context("failed to serialize updated config")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    fs::write(&path, output).context("failed to write config file")?;

    Ok(())
}

/// Replace the leaf at `section.key` in a parsed config file.
///
/// The existing value's type decides how `raw_value` is parsed.
fn set_toml_value(root: &mut toml::Value, key: &str, raw_value: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let Some((leaf, sections)) = parts.split_last() else {
        anyhow::bail!("empty config key");
    };

    let mut current = root;
    for &part in sections {
        current = current
            .get_mut(part)
            .with_context(|| format!("config key not found: section '{part}' in '{key}'"))?;
    }

    let table = current.as_table_mut().with_context(|| {
        format!(
            "expected table at '{}'",
            key.rsplit_once('.').map(|(s, _)| s).unwrap_or("")
        )
    })?;

    let new_value = match table.get(*leaf) {
        Some(toml::Value::Boolean(_)) => toml::Value::Boolean(is_truthy(raw_value)),
        Some(toml::Value::Integer(_)) => {
            let n: i64 = raw_value
                .parse()
                .with_context(|| format!("expected integer for '{key}', got '{raw_value}'"))?;
            toml::Value::Integer(n)
        }
        Some(toml::Value::Float(_)) => {
            let f: f64 = raw_value
                .parse()
                .with_context(|| format!("expected float for '{key}', got '{raw_value}'"))?;
            toml::Value::Float(f)
        }
        Some(_) => toml::Value::String(raw_value.to_string()),
        None => anyhow::bail!("unknown config key: '{key}'"),
    };

    table.insert(leaf.to_string(), new_value);
    Ok(())
}

/// Overwrite the global config file with the defaults.
pub fn reset_config() -> Result<PathBuf> {
    init_config(true)
}

/// The merged configuration rendered as TOML.
pub fn show_effective_config() -> Result<String> {
    let config = load();
    toml::to_string_pretty(&config).context("failed to serialize effective config")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
