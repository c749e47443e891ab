/// Column-name constants for carbon-lotkit tables.
/// Single source of truth - exported to Python via PyO3.

// ── Batch columns ───────────────────────────────────────────────────────────
pub mod batch {
    pub const BATCH_ID: &str = "batch_id";
    pub const SUPPLIER_ID: &str = "supplier_id";
    pub const PRODUCT: &str = "product";
    pub const QUANTITY_KG: &str = "quantity_kg";
    pub const DISTANCE_KM: &str = "distance_km";
    pub const TRANSPORT_MODE: &str = "transport_mode";
    pub const PACKAGING: &str = "packaging";
    pub const PACKAGING_SIZE: &str = "packaging_size";
    pub const CHANNEL: &str = "channel";

    /// Columns a batch table must provide. Transport mode may be derived.
    pub const REQUIRED: [&str; 7] = [
        BATCH_ID,
        SUPPLIER_ID,
        PRODUCT,
        QUANTITY_KG,
        DISTANCE_KM,
        PACKAGING,
        CHANNEL,
    ];
}

// ── Emission columns ────────────────────────────────────────────────────────
pub mod emissions {
    pub const CO2_AGRI_KG: &str = "co2_agri_kg";
    pub const CO2_LOGISTICS_KG: &str = "co2_logistics_kg";
    pub const CO2_PACKAGING_KG: &str = "co2_packaging_kg";
    pub const TOTAL_CO2E_KG: &str = "total_co2e_kg";

    pub const COMPONENTS: [&str; 3] = [CO2_AGRI_KG, CO2_LOGISTICS_KG, CO2_PACKAGING_KG];
}

// ── Data-quality flag columns ───────────────────────────────────────────────
pub mod audit {
    pub const AGRI_DEFAULT_FACTOR: &str = "agri_default_factor";
    pub const LOGISTICS_DEFAULT_FACTOR: &str = "logistics_default_factor";
    pub const PACKAGING_DEFAULT_FACTOR: &str = "packaging_default_factor";
}

// ── Factor table columns ────────────────────────────────────────────────────
pub mod factors {
    pub const CATEGORY: &str = "category";
    pub const FACTOR: &str = "factor";
}

// ── Rollup columns ──────────────────────────────────────────────────────────
pub mod rollup {
    pub const BATCH_COUNT: &str = "batch_count";
    pub const QUANTITY_KG_SUM: &str = "quantity_kg_sum";
    pub const TOTAL_CO2E_KG_SUM: &str = "total_co2e_kg_sum";
}
