use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;

use crate::config::{check_factor, EngineConfig, BUILTIN_FACTORS, DEFAULT_FACTOR, TRANSPORT_DEFAULT_FACTOR};
use crate::error::LotkitError;
use crate::frame::read_csv_as_strings;
use crate::schema::factors;

/// Which fallback applies when a category is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorKind {
    Product,
    Transport,
    Material,
}

/// Result of a registry lookup. `used_default` marks an approximated factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorLookup {
    pub factor: f64,
    pub used_default: bool,
}

/// Emission factors keyed by category name.
///
/// Built once and never mutated; share it behind an `Arc` and replace the
/// whole registry to reload.
#[derive(Debug, Clone)]
pub struct EmissionFactorRegistry {
    factors: HashMap<String, f64>,
    default_factor: f64,
    transport_default_factor: f64,
}

impl Default for EmissionFactorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EmissionFactorRegistry {
    pub fn builtin() -> Self {
        Self {
            factors: BUILTIN_FACTORS
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            default_factor: DEFAULT_FACTOR,
            transport_default_factor: TRANSPORT_DEFAULT_FACTOR,
        }
    }

    pub fn from_entries<I, K>(entries: I, default_factor: f64) -> Result<Self, LotkitError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        check_factor("default_factor", default_factor)?;
        let mut factors = HashMap::new();
        for (category, value) in entries {
            let category = category.into();
            check_factor(&category, value)?;
            factors.insert(category, value);
        }
        Ok(Self {
            factors,
            default_factor,
            transport_default_factor: default_factor,
        })
    }

    /// Registry described by a config: its factor table (or the built-in one)
    /// and its fallback values.
    pub fn from_config(config: &EngineConfig) -> Result<Self, LotkitError> {
        config.validate()?;
        let mut registry = match &config.factors {
            Some(map) => Self::from_entries(map.iter().map(|(k, v)| (k.clone(), *v)), config.default_factor)?,
            None => Self::builtin(),
        };
        registry.default_factor = config.default_factor;
        registry.transport_default_factor = config.transport_default_factor;
        Ok(registry)
    }

    /// Build from a two-column table: `category`, `factor`.
    /// Factor values may be strings; they are parsed to Float64.
    pub fn from_frame(df: &DataFrame, default_factor: f64) -> Result<Self, LotkitError> {
        for name in [factors::CATEGORY, factors::FACTOR] {
            if df.column(name).is_err() {
                return Err(LotkitError::MissingColumn(name.to_string()));
            }
        }

        let parsed = df
            .clone()
            .lazy()
            .select([
                col(factors::CATEGORY).cast(DataType::String),
                col(factors::FACTOR)
                    .cast(DataType::String)
                    .str()
                    .strip_chars(lit(" \t\r\n"))
                    .alias("_raw"),
                col(factors::FACTOR)
                    .cast(DataType::String)
                    .str()
                    .strip_chars(lit(" \t\r\n"))
                    .cast(DataType::Float64),
            ])
            .collect()?;

        let categories = parsed.column(factors::CATEGORY)?.str()?;
        let raw = parsed.column("_raw")?.str()?;
        let values = parsed.column(factors::FACTOR)?.f64()?;

        let mut entries = Vec::with_capacity(parsed.height());
        for i in 0..parsed.height() {
            let category = categories.get(i).ok_or_else(|| LotkitError::NullValue {
                column: factors::CATEGORY.to_string(),
                row: i,
            })?;
            let value = values.get(i).ok_or_else(|| LotkitError::InvalidFactor {
                category: category.to_string(),
                value: raw.get(i).unwrap_or("null").to_string(),
            })?;
            entries.push((category.trim().to_string(), value));
        }

        Self::from_entries(entries, default_factor)
    }

    pub fn from_csv(path: impl AsRef<Path>, default_factor: f64) -> Result<Self, LotkitError> {
        let df = read_csv_as_strings(path, None)?;
        Self::from_frame(&df, default_factor)
    }

    pub fn with_transport_default(mut self, factor: f64) -> Result<Self, LotkitError> {
        check_factor("transport_default_factor", factor)?;
        self.transport_default_factor = factor;
        Ok(self)
    }

    /// Factor for `category`, or the registry default when it is unknown.
    pub fn lookup(&self, category: &str) -> FactorLookup {
        self.resolve(category, self.default_factor)
    }

    /// Like `lookup`, but falls back to the default of `kind`.
    pub fn lookup_as(&self, kind: FactorKind, category: &str) -> FactorLookup {
        let fallback = match kind {
            FactorKind::Transport => self.transport_default_factor,
            FactorKind::Product | FactorKind::Material => self.default_factor,
        };
        self.resolve(category, fallback)
    }

    fn resolve(&self, category: &str, fallback: f64) -> FactorLookup {
        match self.factors.get(category) {
            Some(&factor) => FactorLookup {
                factor,
                used_default: false,
            },
            None => FactorLookup {
                factor: fallback,
                used_default: true,
            },
        }
    }

    pub fn contains(&self, category: &str) -> bool {
        self.factors.contains_key(category)
    }

    pub fn default_factor(&self) -> f64 {
        self.default_factor
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_category_resolves() {
        let registry = EmissionFactorRegistry::builtin();
        let hit = registry.lookup("Aglio Nazionale");
        assert_eq!(hit.factor, 0.38);
        assert!(!hit.used_default);
        assert_eq!(registry.lookup("Plastic").factor, 3.4);
    }

    #[test]
    fn unknown_category_uses_default() {
        let registry = EmissionFactorRegistry::builtin();
        let miss = registry.lookup("Cipolla Rossa");
        assert_eq!(miss.factor, 0.5);
        assert!(miss.used_default);
    }

    #[test]
    fn transport_kind_has_own_default() {
        let registry = EmissionFactorRegistry::builtin();
        let miss = registry.lookup_as(FactorKind::Transport, "Rail");
        assert_eq!(miss.factor, 0.08);
        assert!(miss.used_default);
        assert_eq!(registry.lookup_as(FactorKind::Material, "Glass").factor, 0.5);
    }

    #[test]
    fn injected_default_is_used() {
        let registry = EmissionFactorRegistry::from_entries([("Truck", 0.1)], 0.9).unwrap();
        assert_eq!(registry.lookup("Truck").factor, 0.1);
        assert_eq!(registry.lookup("Barge").factor, 0.9);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn negative_entry_is_rejected() {
        let err = EmissionFactorRegistry::from_entries([("Truck", -0.1)], 0.5).unwrap_err();
        assert!(matches!(err, LotkitError::InvalidFactor { .. }));
    }

    #[test]
    fn from_frame_parses_string_factors() {
        let df = df!(
            factors::CATEGORY => ["Truck", "Plastic"],
            factors::FACTOR => [" 0.082", "3.4"],
        )
        .unwrap();
        let registry = EmissionFactorRegistry::from_frame(&df, 0.5).unwrap();
        assert_eq!(registry.lookup("Truck").factor, 0.082);
        assert_eq!(registry.lookup("Plastic").factor, 3.4);
    }

    #[test]
    fn from_frame_rejects_non_numeric_factor() {
        let df = df!(
            factors::CATEGORY => ["Truck"],
            factors::FACTOR => ["fast"],
        )
        .unwrap();
        let err = EmissionFactorRegistry::from_frame(&df, 0.5).unwrap_err();
        assert!(matches!(err, LotkitError::InvalidFactor { ref value, .. } if value == "fast"));
    }

    #[test]
    fn from_config_overrides_table_and_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "factors": { "Mela": 0.2 }, "default_factor": 0.6, "transport_default_factor": 0.1 }"#,
        )
        .unwrap();
        let registry = EmissionFactorRegistry::from_config(&config).unwrap();
        assert_eq!(registry.lookup("Mela").factor, 0.2);
        assert!(!registry.contains("Truck"));
        assert_eq!(registry.lookup("Truck").factor, 0.6);
        assert_eq!(registry.lookup_as(FactorKind::Transport, "Truck").factor, 0.1);
    }
}
