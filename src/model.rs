use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::LotkitError;

/// The two packaging size classes. Resolved once when a batch is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagingSize {
    Small,
    Standard,
}

impl PackagingSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackagingSize::Small => "small",
            PackagingSize::Standard => "standard",
        }
    }
}

/// One shipped lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub supplier_id: String,
    pub product: String,
    pub quantity_kg: f64,
    pub distance_km: f64,
    pub transport_mode: String,
    pub packaging: String,
    pub packaging_size: PackagingSize,
    pub channel: String,
}

/// Raw fields of a batch before ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: String,
    pub supplier_id: String,
    pub product: String,
    pub quantity_kg: f64,
    pub distance_km: f64,
    pub transport_mode: Option<String>,
    pub packaging: String,
    pub channel: String,
}

impl Batch {
    /// Ingest a record: validate it, resolve the packaging size class and
    /// derive the transport mode when the record has none.
    pub fn from_record(record: BatchRecord, config: &EngineConfig) -> Result<Self, LotkitError> {
        check_quantity(&record.id, record.quantity_kg)?;
        check_distance(&record.id, record.distance_km)?;

        let transport_mode = match record.transport_mode {
            Some(mode) if !mode.trim().is_empty() => mode,
            _ => config.transport.derive_mode(record.distance_km).to_string(),
        };
        let packaging_size = config.packaging.classify(&record.packaging);

        Ok(Self {
            id: record.id,
            supplier_id: record.supplier_id,
            product: record.product,
            quantity_kg: record.quantity_kg,
            distance_km: record.distance_km,
            transport_mode,
            packaging: record.packaging,
            packaging_size,
            channel: record.channel,
        })
    }

    pub fn validate(&self) -> Result<(), LotkitError> {
        check_quantity(&self.id, self.quantity_kg)?;
        check_distance(&self.id, self.distance_km)
    }
}

fn check_quantity(id: &str, quantity_kg: f64) -> Result<(), LotkitError> {
    if quantity_kg.is_finite() && quantity_kg > 0.0 {
        Ok(())
    } else {
        Err(LotkitError::invalid(
            id,
            format!("quantity_kg must be positive, got {quantity_kg}"),
        ))
    }
}

fn check_distance(id: &str, distance_km: f64) -> Result<(), LotkitError> {
    if distance_km.is_finite() && distance_km >= 0.0 {
        Ok(())
    } else {
        Err(LotkitError::invalid(
            id,
            format!("distance_km must be non-negative, got {distance_km}"),
        ))
    }
}

/// Emission components of one batch, kg CO2e.
///
/// Components are rounded; `total` is their plain sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmissionBreakdown {
    pub agricultural: f64,
    pub logistics: f64,
    pub packaging: f64,
    pub total: f64,
}

impl EmissionBreakdown {
    pub fn from_components(agricultural: f64, logistics: f64, packaging: f64) -> Self {
        Self {
            agricultural,
            logistics,
            packaging,
            total: agricultural + logistics + packaging,
        }
    }
}

/// Which components were computed with a fallback factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorAudit {
    pub agricultural: bool,
    pub logistics: bool,
    pub packaging: bool,
}

impl FactorAudit {
    pub fn any(&self) -> bool {
        self.agricultural || self.logistics || self.packaging
    }
}

/// A batch with its emission decomposition. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedBatch {
    pub batch: Batch,
    pub emissions: EmissionBreakdown,
    pub audit: FactorAudit,
}

impl EnrichedBatch {
    pub fn total(&self) -> f64 {
        self.emissions.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(quantity_kg: f64, distance_km: f64) -> BatchRecord {
        BatchRecord {
            id: "L-2026-000".into(),
            supplier_id: "Fornitore_001".into(),
            product: "Aglio Nazionale".into(),
            quantity_kg,
            distance_km,
            transport_mode: None,
            packaging: "Retina 150g".into(),
            channel: "Export".into(),
        }
    }

    #[test]
    fn ingestion_resolves_size_and_transport() {
        let batch = Batch::from_record(record(1000.0, 9000.0), &EngineConfig::default()).unwrap();
        assert_eq!(batch.packaging_size, PackagingSize::Small);
        assert_eq!(batch.transport_mode, "Ship");
    }

    #[test]
    fn supplied_transport_is_kept() {
        let mut rec = record(1000.0, 9000.0);
        rec.transport_mode = Some("Truck".into());
        let batch = Batch::from_record(rec, &EngineConfig::default()).unwrap();
        assert_eq!(batch.transport_mode, "Truck");
    }

    #[test]
    fn rejects_non_positive_quantity() {
        for q in [0.0, -5.0, f64::NAN] {
            let err = Batch::from_record(record(q, 10.0), &EngineConfig::default()).unwrap_err();
            assert!(matches!(err, LotkitError::InvalidInput { .. }));
        }
    }

    #[test]
    fn rejects_negative_distance() {
        let err = Batch::from_record(record(10.0, -1.0), &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, LotkitError::InvalidInput { ref batch_id, .. } if batch_id == "L-2026-000"));
    }

    #[test]
    fn breakdown_total_is_component_sum() {
        let e = EmissionBreakdown::from_components(380.0, 16.4, 272.0);
        assert_eq!(e.total, 380.0 + 16.4 + 272.0);
    }
}
