use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::{CustomVarsError, Result};

/// Granularity at which a custom variable was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Page,
    Visit,
    Conversion,
}

impl Scope {
    /// Every scope in the order operator tooling walks them.
    pub const ALL: [Scope; 3] = [Scope::Page, Scope::Visit, Scope::Conversion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Page => "page",
            Scope::Visit => "visit",
            Scope::Conversion => "conversion",
        }
    }

    /// Capitalized name used in operator output.
    pub fn display_name(&self) -> &'static str {
        match self {
            Scope::Page => "Page",
            Scope::Visit => "Visit",
            Scope::Conversion => "Conversion",
        }
    }

    /// Log table holding the custom variable columns for this scope.
    pub fn table_name(&self) -> &'static str {
        match self {
            Scope::Page => "log_link_visit_action",
            Scope::Visit => "log_visit",
            Scope::Conversion => "log_conversion",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        value.parse()
    }
}

impl FromStr for Scope {
    type Err = CustomVarsError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "page" => Ok(Scope::Page),
            "visit" => Ok(Scope::Visit),
            "conversion" => Ok(Scope::Conversion),
            other => Err(CustomVarsError::InvalidScope(other.to_string())),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_scopes() {
        assert_eq!(Scope::parse("visit").unwrap(), Scope::Visit);
        assert_eq!(Scope::parse("page").unwrap(), Scope::Page);
        assert_eq!(Scope::parse("conversion").unwrap(), Scope::Conversion);
    }

    #[test]
    fn rejects_unknown_scope() {
        let err = Scope::parse("session").unwrap_err();
        assert!(matches!(err, CustomVarsError::InvalidScope(ref s) if s == "session"));
        assert!(Scope::parse("").is_err());
        assert!(Scope::parse("Visit").is_err());
    }

    #[test]
    fn maps_scopes_to_log_tables() {
        assert_eq!(Scope::Visit.table_name(), "log_visit");
        assert_eq!(Scope::Page.table_name(), "log_link_visit_action");
        assert_eq!(Scope::Conversion.table_name(), "log_conversion");
        assert_eq!(Scope::Conversion.display_name(), "Conversion");
    }
}
