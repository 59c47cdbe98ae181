//! Feature identifiers recognized by the orchestrator.

/// Every feature name a model may consume, sorted.
pub const FEATURE_CATALOG: &[&str] = &[
    "cell_line_embedding",
    "copy_number",
    "drug_descriptors",
    "drug_fingerprint",
    "gene_expression",
    "methylation",
    "mutation",
    "proteomics",
    "smiles_characters",
    "smiles_length",
    "tissue_type",
];

/// Configuration flag enabling the SMILES modality.
pub const SMILES_FLAG: &str = "use_smiles";

/// Features added unconditionally when [`SMILES_FLAG`] is set.
pub const SMILES_FEATURES: &[&str] = &["smiles_characters", "smiles_length"];

/// Separator between feature names in the caller's request string.
pub const FEATURE_DELIMITER: char = ',';

pub fn is_known(name: &str) -> bool {
    FEATURE_CATALOG.binary_search(&name).is_ok()
}

/// Owned copy of the catalog, used in error reports.
pub fn catalog() -> Vec<String> {
    FEATURE_CATALOG.iter().map(|s| s.to_string()).collect()
}
