//! Per-batch emission decomposition.
//!
//! agricultural = quantity_kg * factor(product)
//! logistics    = quantity_kg / 1000 * distance_km * factor(transport_mode)
//! packaging    = quantity_kg / unit_weight_kg * material_mass_kg * factor(material)
//!
//! Each component is rounded on its own; sums are never re-rounded.

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::LotkitError;
use crate::model::{Batch, EmissionBreakdown, EnrichedBatch, FactorAudit};
use crate::registry::{EmissionFactorRegistry, FactorKind};

const KG_PER_TONNE: f64 = 1000.0;

/// Round to `decimals` places, nearest first, ties to even.
///
/// The decision is made on the exact binary value of `value`, so 1.115
/// (stored just below 1.115) goes to 1.11 and 50.125 (exact) goes to 50.12.
/// Values that cannot be scaled without overflow are returned unchanged.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() || value == 0.0 {
        return value;
    }
    let scale = 10f64.powi(decimals as i32);
    let scaled = value * scale;
    if !scale.is_finite() || !scaled.is_finite() {
        return value;
    }

    // value * 2 * scale == product + error exactly; compare it with the
    // midpoint 2 * lower + 1 between `lower` and `lower + 1`.
    let lower = scaled.floor();
    let twice = 2.0 * scale;
    let product = value * twice;
    let error = value.mul_add(twice, -product);
    let side = (product - (2.0 * lower + 1.0)) + error;

    let rounded = if side > 0.0 {
        lower + 1.0
    } else if side < 0.0 {
        lower
    } else if lower % 2.0 == 0.0 {
        lower
    } else {
        lower + 1.0
    };
    rounded / scale
}

/// Decompose one batch into its three emission components.
pub fn decompose(
    batch: &Batch,
    registry: &EmissionFactorRegistry,
    config: &EngineConfig,
) -> Result<EnrichedBatch, LotkitError> {
    batch.validate()?;

    let product = registry.lookup_as(FactorKind::Product, &batch.product);
    let transport = registry.lookup_as(FactorKind::Transport, &batch.transport_mode);
    let material = registry.lookup_as(FactorKind::Material, &config.packaging.material);

    let agricultural = batch.quantity_kg * product.factor;
    let logistics = (batch.quantity_kg / KG_PER_TONNE) * batch.distance_km * transport.factor;

    let class = config.packaging.class(batch.packaging_size);
    let units = batch.quantity_kg / class.unit_weight_kg;
    let packaging = units * class.material_mass_kg * material.factor;

    let audit = FactorAudit {
        agricultural: product.used_default,
        logistics: transport.used_default,
        packaging: material.used_default,
    };
    if audit.any() {
        debug!(
            batch_id = %batch.id,
            product = %batch.product,
            transport_mode = %batch.transport_mode,
            "default emission factor used"
        );
    }

    let digits = config.rounding_decimals;
    Ok(EnrichedBatch {
        batch: batch.clone(),
        emissions: EmissionBreakdown::from_components(
            round_to(agricultural, digits),
            round_to(logistics, digits),
            round_to(packaging, digits),
        ),
        audit,
    })
}
