//! Validation of the caller's feature request against the catalog and the
//! model parameters.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use tracing::debug;

use crate::common::config::ConfigRecord;
use crate::common::error::{TrainError, TrainResult};

use super::domain::{self, FEATURE_DELIMITER, SMILES_FEATURES, SMILES_FLAG};

/// Split, trim, dedup and sort a comma-delimited feature string.
pub fn parse_feature_list(spec: &str) -> Vec<String> {
    spec.split(FEATURE_DELIMITER)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Produce the validated, sorted feature list for a run.
///
/// When the SMILES modality is enabled its features are appended and mapped to
/// themselves in `config`, so the model-reference check below accepts them.
/// A name must be both in the global catalog and referenced by a string value
/// of the merged configuration.
pub fn validate(
    spec: &str,
    config: &mut ConfigRecord,
    params_path: &Path,
    variant: &str,
) -> TrainResult<Vec<String>> {
    let mut features: BTreeSet<String> = parse_feature_list(spec).into_iter().collect();

    if config.get_bool(SMILES_FLAG) {
        for name in SMILES_FEATURES {
            features.insert(name.to_string());
            config.set(*name, *name);
        }
    }

    let features: Vec<String> = features.into_iter().collect();
    if features.is_empty() {
        return Err(TrainError::invalid("no features requested"));
    }

    let unknown: Vec<String> = features
        .iter()
        .filter(|name| !domain::is_known(name))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(TrainError::UnknownFeature {
            unknown,
            catalog: domain::catalog(),
        });
    }

    let referenced: HashSet<&str> = config.string_values().collect();
    let missing: Vec<String> = features
        .iter()
        .filter(|name| !referenced.contains(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(TrainError::FeatureModelMismatch {
            missing,
            requested: features,
            params: params_path.to_path_buf(),
            variant: variant.to_string(),
        });
    }

    debug!(features = ?features, "validated feature request");
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn config_referencing(names: &[&str]) -> ConfigRecord {
        let mut config = ConfigRecord::new();
        for (idx, name) in names.iter().enumerate() {
            config.set(format!("encoder_{idx}"), *name);
        }
        config
    }

    #[test]
    fn parses_dedups_and_sorts() {
        assert_eq!(
            parse_feature_list("mutation, gene_expression,mutation,,"),
            vec!["gene_expression", "mutation"]
        );
    }

    #[test]
    fn smiles_modality_is_appended_and_self_mapped() {
        let mut config = config_referencing(&["gene_expression", "mutation"]);
        config.set(SMILES_FLAG, true);

        let features = validate("mutation,gene_expression", &mut config, Path::new("p.json"), "dense")
            .unwrap();
        assert_eq!(
            features,
            vec![
                "gene_expression",
                "mutation",
                "smiles_characters",
                "smiles_length"
            ]
        );
        assert_eq!(config.get("smiles_characters"), Some(&json!("smiles_characters")));
        assert_eq!(config.get("smiles_length"), Some(&json!("smiles_length")));
    }

    #[test]
    fn unknown_feature_lists_catalog() {
        let mut config = config_referencing(&["not_a_feature"]);
        let err = validate("not_a_feature", &mut config, Path::new("p.json"), "dense").unwrap_err();
        match err {
            TrainError::UnknownFeature { unknown, catalog } => {
                assert_eq!(unknown, vec!["not_a_feature"]);
                assert_eq!(catalog, domain::catalog());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn catalogued_feature_missing_from_params_is_mismatch() {
        let mut config = config_referencing(&["gene_expression"]);
        let err = validate("gene_expression,proteomics", &mut config, Path::new("p.json"), "linear")
            .unwrap_err();
        match err {
            TrainError::FeatureModelMismatch {
                missing, variant, ..
            } => {
                assert_eq!(missing, vec!["proteomics"]);
                assert_eq!(variant, "linear");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_string_values_do_not_count_as_references() {
        let mut config = ConfigRecord::new();
        config.set("encoders", json!(["gene_expression"]));
        let err = validate("gene_expression", &mut config, Path::new("p.json"), "dense").unwrap_err();
        assert!(matches!(err, TrainError::FeatureModelMismatch { .. }));
    }

    #[test]
    fn empty_request_is_rejected() {
        let mut config = ConfigRecord::new();
        let err = validate(" , ", &mut config, Path::new("p.json"), "dense").unwrap_err();
        assert!(matches!(err, TrainError::InvalidInput(_)));
    }

    proptest! {
        #[test]
        fn output_is_sorted_distinct_request(
            picks in prop::collection::vec(0..domain::FEATURE_CATALOG.len(), 1..12)
        ) {
            let names: Vec<&str> = picks.iter().map(|i| domain::FEATURE_CATALOG[*i]).collect();
            let mut config = config_referencing(domain::FEATURE_CATALOG);
            let features = validate(&names.join(","), &mut config, Path::new("p.json"), "dense").unwrap();

            let expected: Vec<String> = names
                .iter()
                .map(|s| s.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            prop_assert_eq!(features, expected);
        }
    }
}
