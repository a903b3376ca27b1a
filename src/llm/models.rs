//! Best-effort model resolution.
//!
//! The requested model is only used when the service currently advertises
//! it. An empty request, a failed listing, or an unlisted name all fall back
//! to the default model. The fallback is logged, never returned as an error:
//! availability is preferred over strict validation.

use tracing::{debug, warn};

use super::LlmProvider;

pub async fn resolve(provider: &LlmProvider, requested: &str, default_model: &str) -> String {
    if requested.is_empty() {
        debug!(model = %default_model, "no model requested, using default");
        return default_model.to_string();
    }

    let available = match provider.list_models().await {
        Ok(models) => models,
        Err(e) => {
            warn!(error = %e, model = %default_model, "cannot list models, defaulting");
            return default_model.to_string();
        }
    };

    if available.iter().any(|m| m == requested) {
        requested.to_string()
    } else {
        warn!(requested, model = %default_model, "requested model not advertised, defaulting");
        default_model.to_string()
    }
}
