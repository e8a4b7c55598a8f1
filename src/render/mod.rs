//! Content resolution: renderer capabilities, the renderer registry, the
//! per-part resolver and the composite splitters.
//!
//! A request names a part address and the kind of output wanted
//! ([`RenderMode`]). The [`resolver::ContentResolver`] picks a renderer for
//! the part's content type through the [`registry::RendererRegistry`],
//! runs it, and merges whatever it returns into one address-ordered
//! [`fragment::RenderResult`].

pub mod appledouble;
pub mod fragment;
pub mod html;
pub mod registry;
pub mod resolver;
pub mod viewers;

use bitflags::bitflags;

use crate::store::UserPreferences;

bitflags! {
    /// Output kinds a caller can ask a renderer for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderMode: u8 {
        /// Content embedded in the main view.
        const INLINE = 1 << 0;
        /// A description of the part without embedding its payload.
        const INFO = 1 << 1;
    }
}

/// What a renderer kind can do. One static descriptor per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub inline: bool,
    pub info: bool,
    /// Render inline even when the user's preferences keep this content
    /// type out of the main view.
    pub force_inline: bool,
    /// Counted as an embedded part when listing a message's attachments.
    pub embedded: bool,
}

impl Capability {
    /// Whether every requested output kind is available.
    pub fn supports(&self, mode: RenderMode) -> bool {
        (!mode.contains(RenderMode::INLINE) || self.inline)
            && (!mode.contains(RenderMode::INFO) || self.info)
    }

    pub fn modes(&self) -> RenderMode {
        let mut modes = RenderMode::empty();
        modes.set(RenderMode::INLINE, self.inline);
        modes.set(RenderMode::INFO, self.info);
        modes
    }
}

/// The user's inline display preferences, read from preferences once per
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlinePolicy {
    /// Show `image/*` parts inline.
    pub images: bool,
    /// Show `text/html` parts inline.
    pub html: bool,
    /// Load remote images referenced by HTML parts.
    pub remote_images: bool,
}

impl InlinePolicy {
    /// Whether a content type may be shown inline by a renderer that does
    /// not force it.
    pub fn allows(&self, content_type: &str) -> bool {
        if content_type.starts_with("image/") {
            self.images
        } else if content_type == "text/html" {
            self.html
        } else {
            true
        }
    }
}

impl InlinePolicy {
    /// Read the policy from `inline_images`, `inline_html` and
    /// `show_images_inline`. The last one also forces images inline.
    pub fn from_preferences(prefs: &impl UserPreferences) -> Self {
        let force_images = prefs.flag("show_images_inline");
        Self {
            images: force_images || prefs.flag_or("inline_images", true),
            html: prefs.flag_or("inline_html", true),
            remote_images: force_images,
        }
    }
}

impl Default for InlinePolicy {
    fn default() -> Self {
        Self {
            images: true,
            html: true,
            remote_images: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_ONLY: Capability = Capability {
        inline: false,
        info: true,
        force_inline: false,
        embedded: false,
    };

    #[test]
    fn test_supports_requires_every_bit() {
        assert!(INFO_ONLY.supports(RenderMode::INFO));
        assert!(!INFO_ONLY.supports(RenderMode::INLINE));
        assert!(!INFO_ONLY.supports(RenderMode::INLINE | RenderMode::INFO));
        assert!(INFO_ONLY.supports(RenderMode::empty()));
        assert_eq!(INFO_ONLY.modes(), RenderMode::INFO);
    }

    #[test]
    fn test_policy() {
        let policy = InlinePolicy {
            images: false,
            ..InlinePolicy::default()
        };
        assert!(!policy.allows("image/png"));
        assert!(policy.allows("text/html"));
        assert!(policy.allows("application/pdf"));
    }

    #[test]
    fn test_policy_from_preferences() {
        use crate::config::Preferences;

        let defaults = InlinePolicy::from_preferences(&Preferences::default());
        assert_eq!(defaults, InlinePolicy::default());

        let mut prefs = Preferences::default();
        prefs.0.insert("inline_images".into(), toml::Value::Boolean(false));
        prefs.0.insert("show_images_inline".into(), toml::Value::Boolean(true));
        let forced = InlinePolicy::from_preferences(&prefs);
        assert!(forced.images);
        assert!(forced.remote_images);

        prefs.0.clear();
        assert_eq!(InlinePolicy::from_preferences(&prefs), InlinePolicy::default());
    }
}
