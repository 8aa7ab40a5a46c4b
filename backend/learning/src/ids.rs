use sha2::{Digest, Sha256};

use hearth_core::SuggestionSource;

/// Content-derived suggestion id, stable across restarts.
pub fn suggestion_id(source: SuggestionSource, current_action: &str, action: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(current_action.as_bytes());
    hasher.update(b"|");
    hasher.update(action.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("sug_{}", &digest[..16])
}
