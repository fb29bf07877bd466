use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::config::themes::ThemeMode;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum ViewMode {
    #[default]
    Grid,
    List,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum NoteSortBy {
    #[default]
    Date,
    Title,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiPreferences {
    pub sidebar_collapsed: bool,
    pub view: ViewMode,
    pub sort_by: NoteSortBy,
    pub show_pinned_only: bool,
    pub theme: ThemeMode,
}

impl UiPreferences {
    pub fn toggle_sidebar(&mut self) -> bool {
        self.sidebar_collapsed = !self.sidebar_collapsed;
        self.sidebar_collapsed
    }

    pub fn set_view(&mut self, view: ViewMode) {
        self.view = view;
    }

    pub fn set_sort_by(&mut self, sort_by: NoteSortBy) {
        self.sort_by = sort_by;
    }

    pub fn toggle_show_pinned_only(&mut self) -> bool {
        self.show_pinned_only = !self.show_pinned_only;
        self.show_pinned_only
    }

    pub fn set_theme(&mut self, theme: ThemeMode) {
        self.theme = theme;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_first_launch_layout() {
        let prefs = UiPreferences::default();
        assert_eq!(prefs.view, ViewMode::Grid);
        assert_eq!(prefs.sort_by, NoteSortBy::Date);
        assert!(!prefs.sidebar_collapsed);
        assert!(!prefs.show_pinned_only);
    }

    #[test]
    fn toggles_report_new_state() {
        let mut prefs = UiPreferences::default();
        assert!(prefs.toggle_sidebar());
        assert!(!prefs.toggle_sidebar());
        assert!(prefs.toggle_show_pinned_only());
    }

    #[test]
    fn enums_reject_unknown_values() {
        assert_eq!("LIST".parse::<ViewMode>(), Ok(ViewMode::List));
        assert!("table".parse::<ViewMode>().is_err());
        assert_eq!(NoteSortBy::Title.to_string(), "title");
    }
}
