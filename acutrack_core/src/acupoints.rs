//! Acupoint selection for a treatment.

use crate::{AcupointSettings, Error, Result};
use std::cmp::Ordering;

/// Set of acupoints picked from the configured list
#[derive(Clone, Debug)]
pub struct AcupointSelection {
    available: Vec<String>,
    selected: Vec<String>,
}

impl AcupointSelection {
    pub fn new(settings: &AcupointSettings) -> Self {
        Self {
            available: settings.names.clone(),
            selected: Vec::new(),
        }
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.iter().any(|s| s == name)
    }

    /// Select or deselect an acupoint. Returns whether it is now selected.
    pub fn toggle(&mut self, name: &str) -> Result<bool> {
        let name = name.trim();
        if !self.available.iter().any(|a| a == name) {
            return Err(Error::Validation(format!("Unknown acupoint: {}", name)));
        }
        if let Some(pos) = self.selected.iter().position(|s| s == name) {
            self.selected.remove(pos);
            Ok(false)
        } else {
            self.selected.push(name.to_string());
            Ok(true)
        }
    }

    /// Selected acupoints in display order
    pub fn sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.selected.iter().map(String::as_str).collect();
        names.sort_by(|a, b| compare_acupoints(a, b));
        names
    }

    /// Comma separated label, e.g. "2, 10, 合谷"
    pub fn label(&self) -> String {
        self.sorted().join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Numeric names first, by value; the rest lexically after them
fn compare_acupoints(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection() -> AcupointSelection {
        let mut settings = AcupointSettings::numbered(12);
        settings.names[0] = "合谷".into();
        AcupointSelection::new(&settings)
    }

    #[test]
    fn test_label_orders_numbers_numerically() {
        let mut sel = selection();
        for name in ["10", "2", "合谷", "11"] {
            assert!(sel.toggle(name).unwrap());
        }
        assert_eq!(sel.label(), "2, 10, 11, 合谷");
    }

    #[test]
    fn test_mixed_names_sort_consistently() {
        let settings = AcupointSettings {
            count: 3,
            names: vec!["10".into(), "9".into(), "1a".into()],
        };
        let mut sel = AcupointSelection::new(&settings);
        for name in ["1a", "10", "9"] {
            sel.toggle(name).unwrap();
        }
        assert_eq!(sel.sorted(), vec!["9", "10", "1a"]);
    }

    #[test]
    fn test_toggle_twice_deselects() {
        let mut sel = selection();
        assert!(sel.toggle("3").unwrap());
        assert!(sel.is_selected("3"));
        assert!(!sel.toggle("3").unwrap());
        assert!(sel.is_empty());
        assert_eq!(sel.label(), "");
    }

    #[test]
    fn test_unknown_acupoint_rejected() {
        let mut sel = selection();
        assert!(sel.toggle("99").is_err());
        // "1" was renamed, so it is no longer available
        assert!(sel.toggle("1").is_err());
    }
}
