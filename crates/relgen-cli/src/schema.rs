//! Schema file loading.

use std::fs;
use std::path::Path;

use anyhow::Context;
use relgen_domain::model::{parse, AuthorizationModel};
use relgen_domain::DomainError;
use tracing::debug;

/// Load a schema: `.json` files are a serialized model, anything else is DSL.
pub fn load_schema(path: &Path) -> anyhow::Result<AuthorizationModel> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let model = if is_json {
        serde_json::from_str(&source)
            .with_context(|| format!("failed to decode JSON schema {}", path.display()))?
    } else {
        parse(&source)
            .map_err(DomainError::from)
            .with_context(|| format!("failed to parse schema {}", path.display()))?
    };

    debug!(
        path = %path.display(),
        types = model.type_definitions.len(),
        "schema loaded"
    );
    Ok(model)
}
