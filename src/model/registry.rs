use crate::error::{Result, SplitterError};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A separation variant and the stems it writes, in display order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub stems: Vec<String>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, stems: &[&str]) -> Self {
        let name = name.into();
        Self {
            description: name.clone(),
            name,
            stems: stems.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Label shown in the model picker: `HTDemucs - 4 tracks (vocals, bass, drums, other)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.description, self.stems.join(", "))
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Registry {
    pub default: String,
    pub models: Vec<ModelSpec>,
}

const REGISTRY_JSON: &str = include_str!("../../models/registry.json");

static BUILTIN: Lazy<std::result::Result<Registry, String>> =
    Lazy::new(|| Registry::from_json(REGISTRY_JSON).map_err(|e| e.to_string()));

fn embedded(loaded: &std::result::Result<Registry, String>) -> Result<&Registry> {
    loaded
        .as_ref()
        .map_err(|e| SplitterError::Registry(format!("built-in model registry is invalid: {e}")))
}

impl Registry {
    /// The registry shipped in `models/registry.json`.
    pub fn builtin() -> Result<&'static Registry> {
        embedded(&BUILTIN)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let reg: Registry = serde_json::from_str(json)?;
        if reg.models.is_empty() {
            return Err(SplitterError::Registry("registry lists no models".into()));
        }
        for m in &reg.models {
            if m.stems.is_empty() {
                return Err(SplitterError::Registry(format!(
                    "model `{}` declares no stems",
                    m.name
                )));
            }
        }
        if !reg.models.iter().any(|m| m.name == reg.default) {
            return Err(SplitterError::Registry(format!(
                "default model `{}` is not listed",
                reg.default
            )));
        }
        Ok(reg)
    }

    /// Looks a model up by name; an empty name selects the default.
    pub fn resolve(&self, model_name: &str) -> Result<&ModelSpec> {
        let target = if model_name.is_empty() {
            self.default.as_str()
        } else {
            model_name
        };

        self.models
            .iter()
            .find(|m| m.name == target)
            .ok_or_else(|| SplitterError::Registry(format!("Model `{target}` not found in registry")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }
}

pub fn resolve_model(model_name: &str) -> Result<&'static ModelSpec> {
    Registry::builtin()?.resolve(model_name)
}
