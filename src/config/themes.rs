use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemeMode {
    /// Reads a stored value, ignoring anything outside the known set.
    pub fn from_stored(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| value.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_values_outside_the_set_are_ignored() {
        assert_eq!(ThemeMode::from_stored(Some("dark")), Some(ThemeMode::Dark));
        assert_eq!(ThemeMode::from_stored(Some("sepia")), None);
        assert_eq!(ThemeMode::from_stored(None), None);
    }
}
