use crate::driver::VisibleContent;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

const ID_HASH_LEN: usize = 12;
const VARIANT_LABEL_LEN: usize = 6;

/// Configuration for content normalization.
#[derive(Debug, Clone, Default)]
pub struct FingerprintConfig {
    /// Literal substrings removed from visible text before hashing. Used to
    /// strip volatile fragments (timestamps, counters) that would otherwise
    /// split one logical place into many.
    pub volatile_patterns: Vec<String>,
}

/// Identity resolution for one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub place_id: String,
    /// Human-facing address, annotated `address#variant:<label>` when this is
    /// a same-address variant.
    pub display_address: String,
    pub content_fingerprint: String,
    /// The address had been observed before this resolution.
    pub known_address: bool,
    /// A place with this identity did not previously exist.
    pub is_new_place: bool,
}

#[derive(Debug)]
struct AddressRecord {
    /// fingerprint -> (place id, display address), in discovery order.
    variants: Vec<(String, String, String)>,
}

/// Computes stable identities for observed places. An address seen with a new
/// content fingerprint mints a same-address variant, so single-page-app
/// transitions that never touch the address still become distinct places.
#[derive(Debug, Default)]
pub struct FingerprintEngine {
    config: FingerprintConfig,
    seen: HashMap<String, AddressRecord>,
}

impl FingerprintEngine {
    pub fn new(config: FingerprintConfig) -> Self {
        Self {
            config,
            seen: HashMap::new(),
        }
    }

    /// Resolve an observation to a place identity.
    pub fn resolve(&mut self, address: &str, content: &VisibleContent) -> Resolution {
        let normalized_address = normalize_address(address);
        let fingerprint = self.fingerprint(content);

        match self.seen.get_mut(&normalized_address) {
            None => {
                let place_id = format!("place_{}", short_hash(&normalized_address));
                let record = AddressRecord {
                    variants: vec![(fingerprint.clone(), place_id.clone(), address.to_string())],
                };
                self.seen.insert(normalized_address, record);
                Resolution {
                    place_id,
                    display_address: address.to_string(),
                    content_fingerprint: fingerprint,
                    known_address: false,
                    is_new_place: true,
                }
            }
            Some(record) => {
                if let Some((_, id, display)) =
                    record.variants.iter().find(|(fp, _, _)| *fp == fingerprint)
                {
                    // Revisit. Ambiguity (visibly different evidence hashing
                    // identically) is tolerated: reusing the existing place
                    // favors under-splitting over graph explosion.
                    debug!(place_id = %id, "fingerprint resolved to existing place");
                    Resolution {
                        place_id: id.clone(),
                        display_address: display.clone(),
                        content_fingerprint: fingerprint,
                        known_address: true,
                        is_new_place: false,
                    }
                } else {
                    let place_id = format!("place_{}", fingerprint);
                    let label = &fingerprint[..VARIANT_LABEL_LEN.min(fingerprint.len())];
                    let display = format!("{}#variant:{}", address, label);
                    record
                        .variants
                        .push((fingerprint.clone(), place_id.clone(), display.clone()));
                    debug!(%place_id, address, "minted same-address variant");
                    Resolution {
                        place_id,
                        display_address: display,
                        content_fingerprint: fingerprint,
                        known_address: true,
                        is_new_place: true,
                    }
                }
            }
        }
    }

    /// Hash of normalized visible content. Deterministic: the same content
    /// always produces the same fingerprint.
    pub fn fingerprint(&self, content: &VisibleContent) -> String {
        let mut parts = Vec::with_capacity(3 + content.headings.len());
        parts.push(self.normalize(&content.title));
        for heading in &content.headings {
            parts.push(self.normalize(heading));
        }
        parts.push(self.normalize(&content.primary_text));
        parts.push(self.normalize(&content.active_nav));
        short_hash(&parts.join("\n"))
    }

    /// Case-fold, strip volatile substrings, collapse whitespace.
    fn normalize(&self, text: &str) -> String {
        let mut lowered = text.to_lowercase();
        for pattern in &self.config.volatile_patterns {
            let needle = pattern.to_lowercase();
            if !needle.is_empty() {
                lowered = lowered.replace(&needle, "");
            }
        }
        lowered.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Scheme, host and path with any trailing slash removed; query and fragment
/// are not part of place identity.
pub fn normalize_address(address: &str) -> String {
    match Url::parse(address) {
        Ok(url) => {
            let host = url.host_str().unwrap_or("");
            format!("{}://{}{}", url.scheme(), host, url.path()).trim_end_matches('/').to_string()
        }
        Err(_) => address.trim().trim_end_matches('/').to_string(),
    }
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)[..ID_HASH_LEN].to_string()
}
