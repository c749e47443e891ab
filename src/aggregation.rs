use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::Serialize;

use crate::error::LotkitError;
use crate::model::EnrichedBatch;
use crate::schema::batch;

/// Batch field used as a rollup dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Supplier,
    Product,
    Channel,
    TransportMode,
    Packaging,
    PackagingSize,
}

impl GroupKey {
    /// Column name of this key in batch tables.
    pub fn column(&self) -> &'static str {
        match self {
            GroupKey::Supplier => batch::SUPPLIER_ID,
            GroupKey::Product => batch::PRODUCT,
            GroupKey::Channel => batch::CHANNEL,
            GroupKey::TransportMode => batch::TRANSPORT_MODE,
            GroupKey::Packaging => batch::PACKAGING,
            GroupKey::PackagingSize => batch::PACKAGING_SIZE,
        }
    }

    fn value<'a>(&self, e: &'a EnrichedBatch) -> &'a str {
        let b = &e.batch;
        match self {
            GroupKey::Supplier => b.supplier_id.as_str(),
            GroupKey::Product => b.product.as_str(),
            GroupKey::Channel => b.channel.as_str(),
            GroupKey::TransportMode => b.transport_mode.as_str(),
            GroupKey::Packaging => b.packaging.as_str(),
            GroupKey::PackagingSize => b.packaging_size.as_str(),
        }
    }
}

impl FromStr for GroupKey {
    type Err = LotkitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            batch::SUPPLIER_ID | "supplier" => Ok(GroupKey::Supplier),
            batch::PRODUCT => Ok(GroupKey::Product),
            batch::CHANNEL => Ok(GroupKey::Channel),
            batch::TRANSPORT_MODE => Ok(GroupKey::TransportMode),
            batch::PACKAGING => Ok(GroupKey::Packaging),
            batch::PACKAGING_SIZE => Ok(GroupKey::PackagingSize),
            other => Err(LotkitError::UnknownGroupKey(other.to_string())),
        }
    }
}

pub fn total_emissions(enriched: &[EnrichedBatch]) -> f64 {
    enriched.iter().map(|e| e.emissions.total).sum()
}

pub fn total_quantity(enriched: &[EnrichedBatch]) -> f64 {
    enriched.iter().map(|e| e.batch.quantity_kg).sum()
}

/// kg CO2e per kg of product across the collection.
pub fn intensity(enriched: &[EnrichedBatch]) -> Result<f64, LotkitError> {
    let quantity = total_quantity(enriched);
    if quantity == 0.0 {
        return Err(LotkitError::DivisionUndefined);
    }
    Ok(total_emissions(enriched) / quantity)
}

pub fn supplier_count(enriched: &[EnrichedBatch]) -> usize {
    enriched
        .iter()
        .map(|e| e.batch.supplier_id.as_str())
        .collect::<HashSet<_>>()
        .len()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRow {
    pub keys: Vec<String>,
    pub total_co2e_kg: f64,
    pub quantity_kg: f64,
    pub batch_count: usize,
}

/// Grouped totals, in first-seen key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rollup {
    pub group_by: Vec<&'static str>,
    pub rows: Vec<RollupRow>,
}

/// One level of the nested rollup view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupNode {
    pub key: String,
    pub total_co2e_kg: f64,
    pub children: Vec<RollupNode>,
}

impl Rollup {
    pub fn get(&self, keys: &[&str]) -> Option<&RollupRow> {
        self.rows
            .iter()
            .find(|r| r.keys.iter().map(String::as_str).eq(keys.iter().copied()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Nest rows by key position: first key at the top level.
    /// Each node's total is the sum of the rows below it.
    pub fn tree(&self) -> Vec<RollupNode> {
        let mut roots: Vec<RollupNode> = Vec::new();
        for row in &self.rows {
            let mut level = &mut roots;
            for key in &row.keys {
                let pos = match level.iter().position(|n| &n.key == key) {
                    Some(pos) => pos,
                    None => {
                        level.push(RollupNode {
                            key: key.clone(),
                            total_co2e_kg: 0.0,
                            children: Vec::new(),
                        });
                        level.len() - 1
                    }
                };
                let node = &mut level[pos];
                node.total_co2e_kg += row.total_co2e_kg;
                level = &mut node.children;
            }
        }
        roots
    }
}

/// Sum batch totals per key tuple. An empty key list yields a single
/// group over the whole collection.
pub fn group_rollup(enriched: &[EnrichedBatch], keys: &[GroupKey]) -> Rollup {
    let mut index: HashMap<Vec<&str>, usize> = HashMap::new();
    let mut rows: Vec<RollupRow> = Vec::new();

    for e in enriched {
        let tuple: Vec<&str> = keys.iter().map(|k| k.value(e)).collect();
        let pos = *index.entry(tuple).or_insert_with_key(|tuple| {
            rows.push(RollupRow {
                keys: tuple.iter().map(|s| s.to_string()).collect(),
                total_co2e_kg: 0.0,
                quantity_kg: 0.0,
                batch_count: 0,
            });
            rows.len() - 1
        });
        let row = &mut rows[pos];
        row.total_co2e_kg += e.emissions.total;
        row.quantity_kg += e.batch.quantity_kg;
        row.batch_count += 1;
    }

    Rollup {
        group_by: keys.iter().map(GroupKey::column).collect(),
        rows,
    }
}

/// Portfolio-level view of an enriched collection. Recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub batch_count: usize,
    pub supplier_count: usize,
    pub total_quantity_kg: f64,
    pub agricultural_kg: f64,
    pub logistics_kg: f64,
    pub packaging_kg: f64,
    pub total_emissions_kg: f64,
    pub total_emissions_tonnes: f64,
    /// `None` when total quantity is zero: render as "not available".
    pub intensity: Option<f64>,
    /// Batches with at least one component on a default factor.
    pub defaulted_batches: usize,
}

impl PortfolioSummary {
    pub fn from_enriched(enriched: &[EnrichedBatch]) -> Self {
        let total = total_emissions(enriched);
        Self {
            batch_count: enriched.len(),
            supplier_count: supplier_count(enriched),
            total_quantity_kg: total_quantity(enriched),
            agricultural_kg: enriched.iter().map(|e| e.emissions.agricultural).sum(),
            logistics_kg: enriched.iter().map(|e| e.emissions.logistics).sum(),
            packaging_kg: enriched.iter().map(|e| e.emissions.packaging).sum(),
            total_emissions_kg: total,
            total_emissions_tonnes: total / 1000.0,
            intensity: intensity(enriched).ok(),
            defaulted_batches: enriched.iter().filter(|e| e.audit.any()).count(),
        }
    }
}
