use serde::{Deserialize, Serialize};

/// A boolean that remembers whether it was ever set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    #[default]
    Unset,
    On,
    Off,
}

impl TriState {
    pub fn resolve(self, default: bool) -> bool {
        match self {
            TriState::Unset => default,
            TriState::On => true,
            TriState::Off => false,
        }
    }
}

impl std::fmt::Display for TriState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriState::Unset => write!(f, "unset"),
            TriState::On => write!(f, "on"),
            TriState::Off => write!(f, "off"),
        }
    }
}
