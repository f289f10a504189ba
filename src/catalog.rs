//! Card catalog
//!
//! Maps card ids to the image URLs published for them. The catalog is a
//! JSON array of card records as exported from the card database.

use crate::cache::{CacheKey, ImageSource};
use crate::config::ImageQuality;
use crate::error::{CardcacheError, CardcacheResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Remote image URLs for one card face
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUris {
    pub small: Option<String>,
    pub normal: Option<String>,
    pub large: Option<String>,
    pub png: Option<String>,
}

impl ImageUris {
    fn variant(&self, name: &str) -> Option<&str> {
        let uri = match name {
            "small" => self.small.as_deref(),
            "normal" => self.normal.as_deref(),
            "large" => self.large.as_deref(),
            "png" => self.png.as_deref(),
            _ => None,
        };
        uri.filter(|u| !u.is_empty())
    }

    /// Best URL for `quality`, falling back to any other published size
    pub fn best(&self, quality: ImageQuality) -> Option<&str> {
        [quality.variant(), "normal", "large", "small", "png"]
            .into_iter()
            .find_map(|name| self.variant(name))
    }
}

/// One face of a multi-faced card
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFace {
    #[serde(default)]
    pub image_uris: Option<ImageUris>,
}

/// One card printing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: String,
    pub name: String,
    pub set: String,
    #[serde(default)]
    pub collector_number: Option<String>,
    #[serde(default)]
    pub image_uris: Option<ImageUris>,
    #[serde(default)]
    pub card_faces: Vec<CardFace>,
}

impl CardRecord {
    /// Image URL for `quality`; double-faced cards use their front face
    pub fn image_url(&self, quality: ImageQuality) -> Option<&str> {
        if let Some(url) = self.image_uris.as_ref().and_then(|u| u.best(quality)) {
            return Some(url);
        }
        self.card_faces
            .first()
            .and_then(|face| face.image_uris.as_ref())
            .and_then(|u| u.best(quality))
    }

    /// Cache key for this printing at `quality`
    pub fn cache_key(&self, quality: ImageQuality) -> CacheKey {
        let variant = format!(
            "{}:{}",
            self.collector_number.as_deref().unwrap_or(""),
            quality.variant()
        );
        CacheKey::for_card(&self.name, &self.set, &variant)
    }
}

/// In-memory card catalog keyed by card id
#[derive(Debug, Clone, Default)]
pub struct CardCatalog {
    cards: HashMap<String, CardRecord>,
    order: Vec<String>,
}

impl CardCatalog {
    /// Build a catalog; a repeated id replaces the earlier record
    pub fn from_cards(cards: Vec<CardRecord>) -> Self {
        let mut catalog = Self::default();
        for card in cards {
            if catalog.cards.contains_key(&card.id) {
                warn!(id = %card.id, "Duplicate card id in catalog, keeping the last record");
            } else {
                catalog.order.push(card.id.clone());
            }
            catalog.cards.insert(card.id.clone(), card);
        }
        catalog
    }

    /// Load a catalog from a JSON file
    pub async fn load(path: &Path) -> CardcacheResult<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CardcacheError::CatalogNotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(CardcacheError::io(
                    format!("reading catalog {}", path.display()),
                    e,
                ))
            }
        };

        let cards: Vec<CardRecord> =
            serde_json::from_str(&content).map_err(|e| CardcacheError::CatalogInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        debug!(path = %path.display(), cards = cards.len(), "Loaded card catalog");
        Ok(Self::from_cards(cards))
    }

    pub fn get(&self, card_id: &str) -> Option<&CardRecord> {
        self.cards.get(card_id)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Card ids in catalog order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Cache key and URL for a card's image.
    ///
    /// `None` when the card is unknown or publishes no image.
    pub fn resolve(&self, card_id: &str, quality: ImageQuality) -> Option<ImageSource> {
        let card = self.get(card_id)?;
        let url = card.image_url(quality)?;
        Some(ImageSource::new(card.cache_key(quality), url))
    }
}
