//! Polars table boundary: batch tables in, augmented tables out.

use std::collections::HashMap;
use std::path::Path;

use polars::prelude::*;

use crate::aggregation::GroupKey;
use crate::config::EngineConfig;
use crate::error::LotkitError;
use crate::model::{Batch, BatchRecord, EnrichedBatch};
use crate::schema::{audit, batch, emissions, rollup};

/// Read a CSV file with all columns as String dtype.
/// Trims whitespace from column names and applies optional rename.
pub fn read_csv_as_strings(
    path: impl AsRef<Path>,
    rename: Option<&HashMap<String, String>>,
) -> Result<DataFrame, LotkitError> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.as_slice())?;

    if let Some(map) = rename {
        let old: Vec<&str> = map.keys().map(|s| s.as_str()).collect();
        let new: Vec<&str> = map.values().map(|s| s.as_str()).collect();
        df = df.lazy().rename(old, new, true).collect()?;
    }

    Ok(df)
}

pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), LotkitError> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(LotkitError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

/// Read the raw records of a batch table, one per row, unvalidated.
///
/// Numeric columns may be strings; they are trimmed and parsed to Float64.
/// Unparseable or null cells are `NullValue` errors. `transport_mode` is
/// optional and left as `None` when the column is absent.
pub fn batch_records_from_frame(df: &DataFrame) -> Result<Vec<BatchRecord>, LotkitError> {
    require_columns(df, &batch::REQUIRED)?;
    let has_transport = df.column(batch::TRANSPORT_MODE).is_ok();

    let mut exprs: Vec<Expr> = [
        batch::BATCH_ID,
        batch::SUPPLIER_ID,
        batch::PRODUCT,
        batch::PACKAGING,
        batch::CHANNEL,
    ]
    .iter()
    .map(|c| col(*c).cast(DataType::String))
    .collect();
    for c in [batch::QUANTITY_KG, batch::DISTANCE_KM] {
        exprs.push(
            col(c)
                .cast(DataType::String)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Float64),
        );
    }
    if has_transport {
        exprs.push(col(batch::TRANSPORT_MODE).cast(DataType::String));
    }
    let parsed = df.clone().lazy().select(exprs).collect()?;

    let ids = parsed.column(batch::BATCH_ID)?.str()?;
    let suppliers = parsed.column(batch::SUPPLIER_ID)?.str()?;
    let products = parsed.column(batch::PRODUCT)?.str()?;
    let packagings = parsed.column(batch::PACKAGING)?.str()?;
    let channels = parsed.column(batch::CHANNEL)?.str()?;
    let quantities = parsed.column(batch::QUANTITY_KG)?.f64()?;
    let distances = parsed.column(batch::DISTANCE_KM)?.f64()?;
    let transports = if has_transport {
        Some(parsed.column(batch::TRANSPORT_MODE)?.str()?)
    } else {
        None
    };

    let text = |ca: &StringChunked, column: &str, row: usize| -> Result<String, LotkitError> {
        ca.get(row)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| LotkitError::NullValue {
                column: column.to_string(),
                row,
            })
    };
    let number = |ca: &Float64Chunked, column: &str, row: usize| -> Result<f64, LotkitError> {
        ca.get(row).ok_or_else(|| LotkitError::NullValue {
            column: column.to_string(),
            row,
        })
    };

    let mut records = Vec::with_capacity(parsed.height());
    for i in 0..parsed.height() {
        records.push(BatchRecord {
            id: text(ids, batch::BATCH_ID, i)?,
            supplier_id: text(suppliers, batch::SUPPLIER_ID, i)?,
            product: text(products, batch::PRODUCT, i)?,
            quantity_kg: number(quantities, batch::QUANTITY_KG, i)?,
            distance_km: number(distances, batch::DISTANCE_KM, i)?,
            transport_mode: transports.and_then(|t| t.get(i)).map(|s| s.trim().to_string()),
            packaging: text(packagings, batch::PACKAGING, i)?,
            channel: text(channels, batch::CHANNEL, i)?,
        });
    }
    Ok(records)
}

/// Ingest every row of a batch table. The first invalid row is an error.
pub fn batches_from_frame(df: &DataFrame, config: &EngineConfig) -> Result<Vec<Batch>, LotkitError> {
    batch_records_from_frame(df)?
        .into_iter()
        .map(|r| Batch::from_record(r, config))
        .collect()
}

/// The augmented table: batch columns plus emission components, total and
/// default-factor flags, one row per enriched batch.
pub fn enriched_to_frame(enriched: &[EnrichedBatch]) -> Result<DataFrame, LotkitError> {
    let n = enriched.len();
    let mut ids = Vec::with_capacity(n);
    let mut suppliers = Vec::with_capacity(n);
    let mut products = Vec::with_capacity(n);
    let mut quantities = Vec::with_capacity(n);
    let mut distances = Vec::with_capacity(n);
    let mut transports = Vec::with_capacity(n);
    let mut packagings = Vec::with_capacity(n);
    let mut sizes = Vec::with_capacity(n);
    let mut channels = Vec::with_capacity(n);
    let mut agri = Vec::with_capacity(n);
    let mut logistics = Vec::with_capacity(n);
    let mut packaging = Vec::with_capacity(n);
    let mut totals = Vec::with_capacity(n);
    let mut agri_flags = Vec::with_capacity(n);
    let mut logistics_flags = Vec::with_capacity(n);
    let mut packaging_flags = Vec::with_capacity(n);

    for e in enriched {
        let b = &e.batch;
        ids.push(b.id.as_str());
        suppliers.push(b.supplier_id.as_str());
        products.push(b.product.as_str());
        quantities.push(b.quantity_kg);
        distances.push(b.distance_km);
        transports.push(b.transport_mode.as_str());
        packagings.push(b.packaging.as_str());
        sizes.push(b.packaging_size.as_str());
        channels.push(b.channel.as_str());
        agri.push(e.emissions.agricultural);
        logistics.push(e.emissions.logistics);
        packaging.push(e.emissions.packaging);
        totals.push(e.emissions.total);
        agri_flags.push(e.audit.agricultural);
        logistics_flags.push(e.audit.logistics);
        packaging_flags.push(e.audit.packaging);
    }

    let df = DataFrame::new(vec![
        Column::new(batch::BATCH_ID.into(), &ids),
        Column::new(batch::SUPPLIER_ID.into(), &suppliers),
        Column::new(batch::PRODUCT.into(), &products),
        Column::new(batch::QUANTITY_KG.into(), &quantities),
        Column::new(batch::DISTANCE_KM.into(), &distances),
        Column::new(batch::TRANSPORT_MODE.into(), &transports),
        Column::new(batch::PACKAGING.into(), &packagings),
        Column::new(batch::PACKAGING_SIZE.into(), &sizes),
        Column::new(batch::CHANNEL.into(), &channels),
        Column::new(emissions::CO2_AGRI_KG.into(), &agri),
        Column::new(emissions::CO2_LOGISTICS_KG.into(), &logistics),
        Column::new(emissions::CO2_PACKAGING_KG.into(), &packaging),
        Column::new(emissions::TOTAL_CO2E_KG.into(), &totals),
        Column::new(audit::AGRI_DEFAULT_FACTOR.into(), &agri_flags),
        Column::new(audit::LOGISTICS_DEFAULT_FACTOR.into(), &logistics_flags),
        Column::new(audit::PACKAGING_DEFAULT_FACTOR.into(), &packaging_flags),
    ])?;

    Ok(df)
}

/// Group an augmented table and sum emissions and quantity per group.
/// Groups appear in first-seen order.
pub fn rollup_frame(enriched_df: &DataFrame, group_by: &[GroupKey]) -> Result<DataFrame, LotkitError> {
    let keys: Vec<&str> = group_by.iter().map(GroupKey::column).collect();
    require_columns(enriched_df, &keys)?;
    require_columns(enriched_df, &[batch::QUANTITY_KG, emissions::TOTAL_CO2E_KG])?;

    let aggs = [
        col(emissions::TOTAL_CO2E_KG).sum().alias(rollup::TOTAL_CO2E_KG_SUM),
        col(batch::QUANTITY_KG).sum().alias(rollup::QUANTITY_KG_SUM),
        col(emissions::TOTAL_CO2E_KG).count().alias(rollup::BATCH_COUNT),
    ];

    let lazy = enriched_df.clone().lazy();
    let df = if keys.is_empty() {
        lazy.select(aggs).collect()?
    } else {
        lazy.group_by_stable(keys.iter().map(|c| col(*c)).collect::<Vec<_>>())
            .agg(aggs)
            .collect()?
    };

    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LotEngine;

    fn batch_frame() -> DataFrame {
        df!(
            batch::BATCH_ID => ["L-2026-000", "L-2026-001", "L-2026-002"],
            batch::SUPPLIER_ID => ["Fornitore_001", "Fornitore_002", "Fornitore_001"],
            batch::PRODUCT => ["Aglio Nazionale", "Zenzero Extra-UE", "Scalogno UE"],
            batch::QUANTITY_KG => ["1000", " 500 ", "2000"],
            batch::DISTANCE_KM => ["200", "9000", "1200"],
            batch::PACKAGING => ["Retina 150g", "Vassoio 500g", "Retina 250g"],
            batch::CHANNEL => ["Export", "Marchio Proprio", "Export"],
        )
        .unwrap()
    }

    #[test]
    fn batches_parse_and_derive_transport() {
        let batches = batches_from_frame(&batch_frame(), &EngineConfig::default()).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].quantity_kg, 500.0);
        assert_eq!(batches[0].transport_mode, "Truck");
        assert_eq!(batches[1].transport_mode, "Ship");
    }

    #[test]
    fn missing_column_is_reported() {
        let df = batch_frame().drop(batch::CHANNEL).unwrap();
        let err = batches_from_frame(&df, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, LotkitError::MissingColumn(ref c) if c == batch::CHANNEL));
    }

    #[test]
    fn unparseable_quantity_is_null_value() {
        let mut df = batch_frame();
        df.replace(
            batch::QUANTITY_KG,
            Series::new(batch::QUANTITY_KG.into(), &["1000", "lots", "10"]),
        )
        .unwrap();
        let err = batches_from_frame(&df, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, LotkitError::NullValue { row: 1, .. }));
    }

    #[test]
    fn enriched_frame_has_components_and_flags() {
        let engine = LotEngine::from_config(EngineConfig::default()).unwrap();
        let batches = batches_from_frame(&batch_frame(), engine.config()).unwrap();
        let run = engine.enrich(&batches).unwrap();
        let df = enriched_to_frame(&run.enriched).unwrap();

        assert_eq!(df.height(), 3);
        let totals = df.column(emissions::TOTAL_CO2E_KG).unwrap().f64().unwrap();
        assert!((totals.get(0).unwrap() - 668.4).abs() < 1e-9);
        let flags = df.column(audit::AGRI_DEFAULT_FACTOR).unwrap().bool().unwrap();
        assert_eq!(flags.get(0), Some(false));
    }

    #[test]
    fn rollup_frame_keeps_first_seen_order() {
        let engine = LotEngine::from_config(EngineConfig::default()).unwrap();
        let batches = batches_from_frame(&batch_frame(), engine.config()).unwrap();
        let run = engine.enrich(&batches).unwrap();
        let df = enriched_to_frame(&run.enriched).unwrap();

        let out = rollup_frame(&df, &[GroupKey::Channel]).unwrap();
        assert_eq!(out.height(), 2);
        let channels = out.column(batch::CHANNEL).unwrap().str().unwrap();
        assert_eq!(channels.get(0), Some("Export"));
        let quantity = out.column(rollup::QUANTITY_KG_SUM).unwrap().f64().unwrap();
        assert_eq!(quantity.get(0), Some(3000.0));
    }
}
