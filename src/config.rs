use crate::error::MdError;

pub const DEFAULT_TABLE_NAME: &str = "metadata";
pub const MAX_TABLE_NAME_LEN: usize = 64;

/// Runtime configuration for a partition catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Name of the metadata table. Interpolated into every statement, so it
    /// must pass [`CatalogConfig::validate`].
    pub table_name: String,
    pub create_table_on_open: bool,
    pub preload_partition_names: bool,
    /// Reject rows wider than the declared VARCHAR columns before they reach
    /// the store. SQLite ignores the widths; most other engines do not.
    pub enforce_column_limits: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            table_name: DEFAULT_TABLE_NAME.to_string(),
            create_table_on_open: true,
            preload_partition_names: true,
            enforce_column_limits: true,
        }
    }
}

impl CatalogConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Self::default()
        }
    }

    /// Nothing happens on open: no DDL, no preload.
    pub fn lazy(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            create_table_on_open: false,
            preload_partition_names: false,
            ..Self::default()
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_create_table_on_open(mut self, enabled: bool) -> Self {
        self.create_table_on_open = enabled;
        self
    }

    pub fn with_preload_partition_names(mut self, enabled: bool) -> Self {
        self.preload_partition_names = enabled;
        self
    }

    pub fn with_enforce_column_limits(mut self, enabled: bool) -> Self {
        self.enforce_column_limits = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), MdError> {
        validate_table_name(&self.table_name)
    }
}

pub(crate) fn validate_table_name(name: &str) -> Result<(), MdError> {
    if name.is_empty() {
        return Err(MdError::InvalidConfig {
            message: "table_name must not be empty".into(),
        });
    }
    if name.len() > MAX_TABLE_NAME_LEN {
        return Err(MdError::InvalidConfig {
            message: format!("table_name must be at most {MAX_TABLE_NAME_LEN} characters"),
        });
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(MdError::InvalidConfig {
            message: format!("table_name '{name}' must not start with a digit"),
        });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MdError::InvalidConfig {
            message: format!("table_name '{name}' may only contain ASCII letters, digits and '_'"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = CatalogConfig::default();
        assert_eq!(config.table_name, DEFAULT_TABLE_NAME);
        assert!(config.create_table_on_open);
        assert!(config.preload_partition_names);
        config.validate().expect("default config validates");
    }

    #[test]
    fn lazy_profile_disables_open_side_effects() {
        let config = CatalogConfig::lazy("psl_md");
        assert!(!config.create_table_on_open);
        assert!(!config.preload_partition_names);
        assert!(config.enforce_column_limits);
    }

    #[test]
    fn rejects_table_names_that_cannot_be_interpolated() {
        for bad in [
            "",
            "1metadata",
            "meta data",
            "md;DROP TABLE x",
            "md\"",
            "métadonnées",
        ] {
            let err = CatalogConfig::new(bad).validate().expect_err(bad);
            assert_eq!(err.code_str(), "invalid_config", "{bad}");
        }
        let too_long = "t".repeat(MAX_TABLE_NAME_LEN + 1);
        assert!(CatalogConfig::new(too_long).validate().is_err());
    }

    #[test]
    fn accepts_plain_identifiers() {
        for good in ["md", "_md", "PSL_METADATA", "md_2"] {
            CatalogConfig::new(good).validate().expect(good);
        }
    }
}
