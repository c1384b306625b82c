use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two deployments being compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSlot {
    A,
    B,
}

impl TargetSlot {
    /// Both slots in reporting order.
    pub const ALL: [TargetSlot; 2] = [TargetSlot::A, TargetSlot::B];

    /// Returns the opposite slot.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Lowercase label, used for metric labels and config keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "a",
            Self::B => "b",
        }
    }
}

impl fmt::Display for TargetSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-facing identity of a target: display name plus the model it serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// Display name (e.g. `"EIS"`).
    pub name: String,
    /// Inference model identifier (e.g. `".elser-2-elastic"`).
    pub model_id: String,
}

impl TargetDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_id: model_id.into(),
        }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.model_id)
    }
}
