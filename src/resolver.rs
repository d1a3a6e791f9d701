use crate::constants::{AVATAR_PLACEHOLDER, DEFAULT_PLACEHOLDER, POST_PLACEHOLDER, PROPERTY_PLACEHOLDER};
use crate::storage_path::{self, EntityType};
use std::collections::HashMap;

/// Static fallback images per entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRegistry {
    default: String,
    by_entity: HashMap<EntityType, String>,
}

impl PlaceholderRegistry {
    /// An empty registry that answers `default` for every entity type.
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            by_entity: HashMap::new(),
        }
    }

    pub fn with(mut self, entity_type: EntityType, placeholder: impl Into<String>) -> Self {
        self.by_entity.insert(entity_type, placeholder.into());
        self
    }

    pub fn get(&self, entity_type: Option<EntityType>) -> &str {
        entity_type
            .and_then(|t| self.by_entity.get(&t))
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    pub fn default_placeholder(&self) -> &str {
        &self.default
    }
}

impl Default for PlaceholderRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER)
            .with(EntityType::Properties, PROPERTY_PLACEHOLDER)
            .with(EntityType::Posts, POST_PLACEHOLDER)
            .with(EntityType::Users, AVATAR_PLACEHOLDER)
            .with(EntityType::Agents, AVATAR_PLACEHOLDER)
            .with(EntityType::Testimonials, AVATAR_PLACEHOLDER)
    }
}

/// Per-call knobs for [`ImageUrlResolver::resolve`].
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub entity_type: Option<EntityType>,
    /// Filename used to predict a path from an entity id; the entity type's
    /// default when unset
    pub default_filename: Option<String>,
    pub placeholder: Option<String>,
    /// Overrides the resolver's base URL for this call
    pub base_url: Option<String>,
    pub fallback: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            entity_type: None,
            default_filename: None,
            placeholder: None,
            base_url: None,
            fallback: true,
        }
    }
}

impl ResolveOptions {
    pub fn for_entity(entity_type: EntityType) -> Self {
        Self {
            entity_type: Some(entity_type),
            ..Self::default()
        }
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback = false;
        self
    }
}

/// Turns stored image references into URLs the rendering layer can use.
#[derive(Debug, Clone, Default)]
pub struct ImageUrlResolver {
    base_url: Option<String>,
    placeholders: PlaceholderRegistry,
}

impl ImageUrlResolver {
    pub fn new(base_url: Option<String>, placeholders: PlaceholderRegistry) -> Self {
        Self {
            base_url: base_url.filter(|url| !url.trim().is_empty()),
            placeholders,
        }
    }

    pub fn placeholders(&self) -> &PlaceholderRegistry {
        &self.placeholders
    }

    /// Resolves a reference; always returns something renderable.
    ///
    /// Priority: absent reference with an entity id predicts the canonical
    /// path, otherwise the placeholder; absolute URLs pass through; canonical
    /// and rooted paths get the base URL; bare names are rooted first.
    pub fn resolve(
        &self,
        reference: Option<&str>,
        entity_id: Option<u64>,
        options: &ResolveOptions,
    ) -> String {
        let reference = reference.map(str::trim).filter(|r| !r.is_empty());
        let base = options
            .base_url
            .as_deref()
            .or(self.base_url.as_deref())
            .map(|url| url.trim_end_matches('/'))
            .unwrap_or("");

        let reference = match reference {
            Some(reference) => reference,
            None => {
                return match (entity_id, options.entity_type) {
                    (Some(id), Some(entity_type)) => {
                        let filename = options
                            .default_filename
                            .as_deref()
                            .unwrap_or_else(|| entity_type.default_filename());
                        let predicted = storage_path::generate(entity_type, id, filename);
                        format!("{}{}", base, predicted)
                    }
                    _ if options.fallback => options
                        .placeholder
                        .clone()
                        .unwrap_or_else(|| self.placeholders.get(options.entity_type).to_string()),
                    _ => String::new(),
                };
            }
        };

        if is_absolute(reference) {
            return reference.to_string();
        }

        // Canonical storage paths are rooted too
        if reference.starts_with('/') {
            return format!("{}{}", base, reference);
        }

        format!("{}/{}", base, reference)
    }

    pub fn resolve_property_image(&self, reference: Option<&str>, property_id: Option<u64>) -> String {
        self.resolve(reference, property_id, &ResolveOptions::for_entity(EntityType::Properties))
    }

    pub fn resolve_agent_avatar(&self, reference: Option<&str>, agent_id: Option<u64>) -> String {
        self.resolve(reference, agent_id, &ResolveOptions::for_entity(EntityType::Agents))
    }

    pub fn resolve_user_avatar(&self, reference: Option<&str>, user_id: Option<u64>) -> String {
        self.resolve(reference, user_id, &ResolveOptions::for_entity(EntityType::Users))
    }

    pub fn resolve_testimonial_avatar(
        &self,
        reference: Option<&str>,
        testimonial_id: Option<u64>,
    ) -> String {
        self.resolve(
            reference,
            testimonial_id,
            &ResolveOptions::for_entity(EntityType::Testimonials),
        )
    }

    pub fn resolve_post_image(&self, reference: Option<&str>, post_id: Option<u64>) -> String {
        self.resolve(reference, post_id, &ResolveOptions::for_entity(EntityType::Posts))
    }
}

fn is_absolute(reference: &str) -> bool {
    let lower = reference.to_ascii_lowercase();
    ["http://", "https://", "//", "data:", "blob:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}
