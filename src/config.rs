//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MIMEVIEW_CONFIG` (environment variable)
//! 2. `~/.config/mimeview/config.toml` (Linux/macOS)
//!    `%APPDATA%\mimeview\config.toml` (Windows)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::render::html::LinkBuilder;
use crate::render::registry::RendererRegistry;
use crate::render::resolver::ContentResolver;
use crate::render::InlinePolicy;
use crate::store::UserPreferences;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Rendering and layout settings.
    pub display: DisplayConfig,
    /// Renderer registry overrides.
    pub renderers: RenderersConfig,
    /// User preferences consulted while rendering.
    pub preferences: Preferences,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Rendering and layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Display width subjects are truncated to in the thread list.
    pub subject_width: usize,
    /// Show the HTML alternative of a message body when both exist.
    pub prefer_html: bool,
    /// Include icon cells in status blocks.
    pub show_icons: bool,
    /// Base URL of download and view links.
    pub link_base: String,
    /// Number of decoded messages kept per open mailbox.
    pub max_cached_messages: usize,
}

/// Renderer registry overrides.
///
/// ```toml
/// [renderers]
/// default = "attachment"
///
/// [renderers.overrides]
/// "text/html" = ["plain"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderersConfig {
    /// Renderer names per content type (`type/subtype` or `type/*`), tried
    /// before the built-in ones.
    pub overrides: BTreeMap<String, Vec<String>>,
    /// Renderer used when nothing else matches. `"none"` leaves the
    /// registry without a default, which is rejected at startup.
    pub default: String,
}

/// Free-form preference table (`[preferences]`).
///
/// Known keys: `show_images_inline`, `inline_html`, `inline_images`,
/// `mail_hdr`, `sig_first`, `signature`, `signature_html`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(pub BTreeMap<String, toml::Value>);

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            subject_width: 60,
            prefer_html: false,
            show_icons: true,
            link_base: "view.php".to_string(),
            max_cached_messages: 50,
        }
    }
}

impl Default for RenderersConfig {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            default: "attachment".to_string(),
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        values.insert("show_images_inline".into(), toml::Value::Boolean(false));
        values.insert("inline_html".into(), toml::Value::Boolean(true));
        values.insert("inline_images".into(), toml::Value::Boolean(true));
        values.insert("sig_first".into(), toml::Value::Boolean(false));
        values.insert("mail_hdr".into(), toml::Value::String(String::new()));
        Self(values)
    }
}

impl UserPreferences for Preferences {
    fn value(&self, name: &str) -> Option<String> {
        self.0.get(name).map(|value| match value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

// ── Derived runtime objects ─────────────────────────────────────

/// Build the content resolver the configuration describes.
///
/// Fails only when the renderer section is unusable (unknown renderer
/// names, no default renderer).
pub fn resolver_from_config(config: &Config) -> Result<ContentResolver> {
    let registry = RendererRegistry::from_config(&config.renderers)?;
    Ok(ContentResolver::new(registry)
        .with_policy(InlinePolicy::from_preferences(&config.preferences))
        .with_links(LinkBuilder::new(config.display.link_base.clone()))
        .prefer_html(config.display.prefer_html))
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MIMEVIEW_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mimeview").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mimeview")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mimeview.log")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderMode;
    use crate::render::viewers::Renderer;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.display.subject_width, 60);
        assert_eq!(cfg.renderers.default, "attachment");
        assert!(cfg.preferences.flag("inline_images"));
        assert!(!cfg.preferences.flag("show_images_inline"));
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.display.link_base, cfg.display.link_base);
        assert_eq!(parsed.preferences, cfg.preferences);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[display]
prefer_html = true

[renderers.overrides]
"text/html" = ["plain"]

[preferences]
inline_images = false
mail_hdr = "X-Mailer\nOrganization"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert!(cfg.display.prefer_html);
        assert_eq!(cfg.display.subject_width, 60);
        assert_eq!(cfg.renderers.default, "attachment");
        assert!(!cfg.preferences.flag("inline_images"));
        assert_eq!(
            cfg.preferences.value("mail_hdr").as_deref(),
            Some("X-Mailer\nOrganization")
        );
        // A partial table replaces the defaults wholesale.
        assert_eq!(cfg.preferences.value("inline_html"), None);
    }

    #[test]
    fn test_resolver_from_config() {
        let mut cfg = Config::default();
        cfg.renderers
            .overrides
            .insert("text/html".into(), vec!["plain".into()]);
        let resolver = resolver_from_config(&cfg).unwrap();
        let node = crate::model::part::PartNode::new(
            crate::model::part::PartAddress::root(),
            "text/html",
        );
        assert_eq!(resolver.renderer_for(&node, RenderMode::INLINE), Renderer::PlainText);

        cfg.renderers.default = "none".into();
        assert!(resolver_from_config(&cfg).is_err());
    }
}
