//! Content-type → renderer lookup.

use std::collections::HashMap;

use tracing::debug;

use super::viewers::Renderer;
use super::{InlinePolicy, RenderMode};
use crate::config::RenderersConfig;
use crate::error::{Result, ViewError};
use crate::model::part::normalize_content_type;

/// Ordered candidate renderers per content type, plus a default.
///
/// Lookup tries the exact `type/subtype` key, then `type/*`, then the
/// default. Within a key the first eligible renderer wins.
#[derive(Debug, Clone)]
pub struct RendererRegistry {
    by_type: HashMap<String, Vec<Renderer>>,
    default: Renderer,
}

/// Builder for [`RendererRegistry`]. A default renderer is mandatory.
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    by_type: HashMap<String, Vec<Renderer>>,
    default: Option<Renderer>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate for a content type (`text/plain` or `image/*`).
    pub fn register(mut self, content_type: &str, renderer: Renderer) -> Self {
        self.by_type
            .entry(registry_key(content_type))
            .or_default()
            .push(renderer);
        self
    }

    /// Put a candidate ahead of every renderer already registered for the
    /// content type.
    pub fn prepend(mut self, content_type: &str, renderer: Renderer) -> Self {
        self.by_type
            .entry(registry_key(content_type))
            .or_default()
            .insert(0, renderer);
        self
    }

    pub fn default_renderer(mut self, renderer: Option<Renderer>) -> Self {
        self.default = renderer;
        self
    }

    pub fn build(self) -> Result<RendererRegistry> {
        let default = self.default.ok_or_else(|| {
            ViewError::Configuration("no default renderer is registered".to_string())
        })?;
        Ok(RendererRegistry {
            by_type: self.by_type,
            default,
        })
    }
}

impl RendererRegistry {
    /// The built-in renderer set.
    pub fn builtin() -> RegistryBuilder {
        RegistryBuilder::new()
            .register("text/plain", Renderer::PlainText)
            .register("text/html", Renderer::Html)
            .register("text/*", Renderer::PlainText)
            .register("image/*", Renderer::Image)
            .register("message/rfc822", Renderer::Rfc822)
            .register("multipart/appledouble", Renderer::AppleDouble)
            .default_renderer(Some(Renderer::Attachment))
    }

    /// The built-in set with the configured overrides placed first.
    pub fn from_config(config: &RenderersConfig) -> Result<Self> {
        let mut builder = Self::builtin();

        // Prepend in reverse so the configured order is kept.
        for (content_type, names) in &config.overrides {
            for name in names.iter().rev() {
                let renderer = Renderer::from_name(name).ok_or_else(|| {
                    ViewError::Configuration(format!(
                        "unknown renderer '{name}' configured for {content_type}"
                    ))
                })?;
                builder = builder.prepend(content_type, renderer);
            }
        }

        let default = match config.default.trim() {
            "" | "none" => None,
            name => Some(Renderer::from_name(name).ok_or_else(|| {
                ViewError::Configuration(format!("unknown default renderer '{name}'"))
            })?),
        };
        builder.default_renderer(default).build()
    }

    pub fn default_renderer(&self) -> Renderer {
        self.default
    }

    /// Whether `renderer` may serve `mode` for `content_type`.
    ///
    /// Every requested bit must be supported. An inline request is also
    /// subject to the user's inline policy, which `force_inline` renderers
    /// ignore. Forcing never makes up for a missing capability.
    pub fn eligible(
        renderer: Renderer,
        content_type: &str,
        mode: RenderMode,
        policy: &InlinePolicy,
    ) -> bool {
        let cap = renderer.capability();
        if !cap.supports(mode) {
            return false;
        }
        !mode.contains(RenderMode::INLINE) || cap.force_inline || policy.allows(content_type)
    }

    /// The renderer for a content type and requested mode.
    ///
    /// Never fails: when no registered candidate is eligible, the default
    /// renderer is returned and the caller decides how to degrade.
    pub fn select(&self, content_type: &str, mode: RenderMode, policy: &InlinePolicy) -> Renderer {
        let content_type = normalize_content_type(content_type);
        for key in lookup_keys(&content_type) {
            let Some(candidates) = self.by_type.get(&key) else {
                continue;
            };
            if let Some(found) = candidates
                .iter()
                .copied()
                .find(|r| Self::eligible(*r, &content_type, mode, policy))
            {
                debug!(
                    content_type = %content_type,
                    key = %key,
                    renderer = found.name(),
                    "Selected renderer"
                );
                return found;
            }
        }
        debug!(
            content_type = %content_type,
            renderer = self.default.name(),
            "Falling back to default renderer"
        );
        self.default
    }

    /// Whether the first registered candidate for a content type is a
    /// composite splitter.
    pub fn is_composite(&self, content_type: &str) -> bool {
        let content_type = normalize_content_type(content_type);
        lookup_keys(&content_type)
            .iter()
            .find_map(|key| self.by_type.get(key).and_then(|c| c.first()))
            .is_some_and(|r| r.is_composite())
    }
}

fn registry_key(content_type: &str) -> String {
    let key = content_type.trim().to_lowercase();
    if key.ends_with("/*") {
        key
    } else {
        normalize_content_type(&key)
    }
}

fn lookup_keys(content_type: &str) -> Vec<String> {
    let mut keys = vec![content_type.to_string()];
    if let Some((primary, _)) = content_type.split_once('/') {
        keys.push(format!("{primary}/*"));
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RendererRegistry {
        RendererRegistry::builtin().build().unwrap()
    }

    #[test]
    fn test_exact_then_wildcard_then_default() {
        let reg = registry();
        let policy = InlinePolicy::default();
        assert_eq!(reg.select("text/html", RenderMode::INLINE, &policy), Renderer::Html);
        assert_eq!(reg.select("text/enriched", RenderMode::INLINE, &policy), Renderer::PlainText);
        assert_eq!(reg.select("image/x-icon", RenderMode::INFO, &policy), Renderer::Image);
        assert_eq!(
            reg.select("application/zip", RenderMode::INLINE, &policy),
            Renderer::Attachment
        );
    }

    #[test]
    fn test_unregistered_types_get_the_default() {
        let reg = registry();
        let policy = InlinePolicy::default();
        for ct in ["application/x-unknown", "model/vrml", "x-weird/thing", "garbage"] {
            for mode in [RenderMode::INLINE, RenderMode::INFO, RenderMode::INLINE | RenderMode::INFO] {
                assert_eq!(reg.select(ct, mode, &policy), reg.default_renderer());
            }
        }
    }

    #[test]
    fn test_policy_blocks_unforced_inline() {
        let reg = registry();
        let policy = InlinePolicy {
            images: false,
            ..InlinePolicy::default()
        };
        assert_eq!(reg.select("image/png", RenderMode::INLINE, &policy), Renderer::Attachment);
        assert_eq!(reg.select("image/png", RenderMode::INFO, &policy), Renderer::Image);
        assert_eq!(
            reg.select("multipart/appledouble", RenderMode::INLINE, &policy),
            Renderer::AppleDouble
        );
    }

    #[test]
    fn test_force_inline_does_not_replace_capability() {
        let policy = InlinePolicy::default();
        assert!(!RendererRegistry::eligible(
            Renderer::Rfc822,
            "message/rfc822",
            RenderMode::INLINE,
            &policy
        ));
    }

    #[test]
    fn test_first_eligible_registration_wins() {
        let reg = RendererRegistry::builtin()
            .prepend("text/html", Renderer::PlainText)
            .build()
            .unwrap();
        let policy = InlinePolicy::default();
        assert_eq!(reg.select("text/html", RenderMode::INLINE, &policy), Renderer::PlainText);
    }

    #[test]
    fn test_missing_default_is_a_configuration_error() {
        let err = RendererRegistry::builtin()
            .default_renderer(None)
            .build()
            .unwrap_err();
        assert!(matches!(err, ViewError::Configuration(_)));
    }

    #[test]
    fn test_from_config_overrides() {
        let mut config = RenderersConfig::default();
        config
            .overrides
            .insert("text/html".to_string(), vec!["plain".to_string()]);
        let reg = RendererRegistry::from_config(&config).unwrap();
        assert_eq!(
            reg.select("text/html", RenderMode::INLINE, &InlinePolicy::default()),
            Renderer::PlainText
        );

        config.overrides.insert("text/x".to_string(), vec!["nope".to_string()]);
        assert!(RendererRegistry::from_config(&config).is_err());
    }

    #[test]
    fn test_is_composite() {
        let reg = registry();
        assert!(reg.is_composite("Multipart/AppleDouble"));
        assert!(!reg.is_composite("multipart/mixed"));
        assert!(!reg.is_composite("text/plain"));
    }
}
