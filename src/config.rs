use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LotkitError;
use crate::model::PackagingSize;

/// Factors shipped with the engine (kg CO2e per kg product, per tonne-km,
/// or per kg packaging material).
pub const BUILTIN_FACTORS: [(&str, f64); 7] = [
    ("Aglio Nazionale", 0.38),
    ("Scalogno UE", 0.45),
    ("Zenzero Extra-UE", 1.15),
    ("Truck", 0.082),
    ("Ship", 0.015),
    ("Plastic", 3.4),
    ("Cardboard", 0.92),
];

pub const DEFAULT_FACTOR: f64 = 0.5;
pub const TRANSPORT_DEFAULT_FACTOR: f64 = 0.08;
/// Beyond this an f64 carries no further decimal digits.
pub const MAX_ROUNDING_DECIMALS: u32 = 15;

/// What `enrich` does with a batch that fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidBatchPolicy {
    /// Drop the record, keep going, and report it in the run.
    #[default]
    Skip,
    /// Stop at the first invalid record in input order.
    Abort,
}

/// Packaging material carried by one sales unit of a size class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackagingClass {
    pub unit_weight_kg: f64,
    pub material_mass_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingPolicy {
    /// Registry category used for the packaging material factor.
    pub material: String,
    /// Label fragments that mark the small unit size.
    pub small_markers: Vec<String>,
    pub small: PackagingClass,
    pub standard: PackagingClass,
}

impl Default for PackagingPolicy {
    fn default() -> Self {
        Self {
            material: "Plastic".to_string(),
            small_markers: vec!["150g".to_string()],
            small: PackagingClass {
                unit_weight_kg: 0.150,
                material_mass_kg: 0.012,
            },
            standard: PackagingClass {
                unit_weight_kg: 0.5,
                material_mass_kg: 0.025,
            },
        }
    }
}

impl PackagingPolicy {
    /// Resolve a packaging label to its size class.
    pub fn classify(&self, label: &str) -> PackagingSize {
        if self.small_markers.iter().any(|m| label.contains(m.as_str())) {
            PackagingSize::Small
        } else {
            PackagingSize::Standard
        }
    }

    pub fn class(&self, size: PackagingSize) -> &PackagingClass {
        match size {
            PackagingSize::Small => &self.small,
            PackagingSize::Standard => &self.standard,
        }
    }
}

/// Transport mode derivation for records that do not name one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportPolicy {
    pub long_haul_threshold_km: f64,
    pub long_haul_mode: String,
    pub short_haul_mode: String,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            long_haul_threshold_km: 2000.0,
            long_haul_mode: "Ship".to_string(),
            short_haul_mode: "Truck".to_string(),
        }
    }
}

impl TransportPolicy {
    pub fn derive_mode(&self, distance_km: f64) -> &str {
        if distance_km > self.long_haul_threshold_km {
            &self.long_haul_mode
        } else {
            &self.short_haul_mode
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Replaces the built-in factor table when present.
    pub factors: Option<BTreeMap<String, f64>>,
    pub default_factor: f64,
    pub transport_default_factor: f64,
    pub packaging: PackagingPolicy,
    pub transport: TransportPolicy,
    pub rounding_decimals: u32,
    pub invalid_batches: InvalidBatchPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            factors: None,
            default_factor: DEFAULT_FACTOR,
            transport_default_factor: TRANSPORT_DEFAULT_FACTOR,
            packaging: PackagingPolicy::default(),
            transport: TransportPolicy::default(),
            rounding_decimals: 2,
            invalid_batches: InvalidBatchPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, LotkitError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LotkitError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), LotkitError> {
        if self.rounding_decimals > MAX_ROUNDING_DECIMALS {
            return Err(LotkitError::InvalidConfig(format!(
                "rounding_decimals must be at most {MAX_ROUNDING_DECIMALS}, got {}",
                self.rounding_decimals
            )));
        }
        check_factor("default_factor", self.default_factor)?;
        check_factor("transport_default_factor", self.transport_default_factor)?;
        if let Some(factors) = &self.factors {
            for (category, value) in factors {
                check_factor(category, *value)?;
            }
        }

        for (name, class) in [
            ("packaging.small", &self.packaging.small),
            ("packaging.standard", &self.packaging.standard),
        ] {
            if !(class.unit_weight_kg.is_finite() && class.unit_weight_kg > 0.0) {
                return Err(LotkitError::InvalidFactor {
                    category: format!("{name}.unit_weight_kg"),
                    value: class.unit_weight_kg.to_string(),
                });
            }
            check_factor(&format!("{name}.material_mass_kg"), class.material_mass_kg)?;
        }
        Ok(())
    }
}

pub(crate) fn check_factor(category: &str, value: f64) -> Result<(), LotkitError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(LotkitError::InvalidFactor {
            category: category.to_string(),
            value: value.to_string(),
        })
    }
}
