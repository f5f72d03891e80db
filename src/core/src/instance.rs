//! Running units as seen through an execution backend.

use serde::{Deserialize, Serialize};

/// Which execution substrate an instance lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Managed container on a container engine.
    Container,
    /// Directly spawned OS process.
    Process,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// A running container or process.
///
/// The id is opaque: an engine-assigned container id or a decimal pid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    /// Image reference or executable name
    pub image: String,
    /// Display names, without the engine's leading `/`
    pub names: Vec<String>,
    pub backend: BackendKind,
}

impl Instance {
    /// First display name, or the empty string.
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("")
    }

    /// Whether this instance belongs to `service`: same image identity, or a
    /// name generated for it (`<service>_<suffix>`).
    pub fn belongs_to(&self, service: &str) -> bool {
        self.image == service || self.primary_name().starts_with(&format!("{service}_"))
    }
}
