//! Run configuration: a layered key/value record resolved from the parameter
//! file, the optional dataset normalization file and caller overrides.
//!
//! Layers are applied in order and later layers always win. Keys are only
//! ever added or overwritten, never removed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::common::error::{TrainError, TrainResult};
use crate::common::json;

/// File name of the dataset-specific normalization document.
pub const NORMALIZATION_FILE: &str = "ic50_normalization_params.json";

/// Resolved configuration record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigRecord(Map<String, Value>);

impl ConfigRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a parameter document; fails with `ConfigLoad`.
    pub fn load(path: &Path) -> TrainResult<Self> {
        json::read_object(path).map(Self)
    }

    /// Overlay `layer` on top of this record.
    pub fn merge(&mut self, layer: Map<String, Value>) {
        for (key, value) in layer {
            self.0.insert(key, value);
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Flags are true only when stored as JSON `true`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Every top-level value stored as a string.
    pub fn string_values(&self) -> impl Iterator<Item = &str> {
        self.0.values().filter_map(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Caller-supplied options, merged after every file layer.
#[derive(Clone, Debug, PartialEq)]
pub struct RunOptions {
    pub train_path: PathBuf,
    pub eval_path: PathBuf,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub dropout: f64,
    pub buffer_size: usize,
    /// `1` means "unset": the input pipeline picks its own default.
    pub num_threads: usize,
    pub prefetch_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            train_path: PathBuf::new(),
            eval_path: PathBuf::new(),
            batch_size: 64,
            learning_rate: 1e-3,
            dropout: 0.5,
            buffer_size: 20_000,
            num_threads: 1,
            prefetch_size: 6,
        }
    }
}

impl RunOptions {
    /// Reject values that cannot be persisted faithfully or trained with.
    pub fn validate(&self) -> TrainResult<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainError::invalid(format!(
                "learning_rate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TrainError::invalid(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.batch_size == 0 {
            return Err(TrainError::invalid("batch_size must be positive"));
        }
        Ok(())
    }

    /// Option set as a configuration layer.
    pub fn to_layer(&self) -> Map<String, Value> {
        let threads = match self.num_threads {
            1 => Value::Null,
            n => Value::from(n),
        };
        let mut layer = Map::new();
        layer.insert("batch_size".into(), self.batch_size.into());
        layer.insert("learning_rate".into(), self.learning_rate.into());
        layer.insert("dropout".into(), self.dropout.into());
        layer.insert("buffer_size".into(), self.buffer_size.into());
        layer.insert("number_of_threads".into(), threads);
        layer.insert("prefetch_buffer_size".into(), self.prefetch_size.into());
        layer.insert(
            "train_filepath".into(),
            self.train_path.to_string_lossy().into_owned().into(),
        );
        layer.insert(
            "eval_filepath".into(),
            self.eval_path.to_string_lossy().into_owned().into(),
        );
        layer
    }
}

/// Location of the normalization document for a dataset path.
///
/// A directory holds the document directly; for a file it sits next to it.
pub fn normalization_path(dataset_root: &Path) -> PathBuf {
    if dataset_root.is_dir() {
        dataset_root.join(NORMALIZATION_FILE)
    } else {
        dataset_root
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(NORMALIZATION_FILE)
    }
}

/// Merge parameter file, normalization file and options into one record.
pub fn resolve(
    params_path: &Path,
    dataset_root: &Path,
    options: &RunOptions,
) -> TrainResult<ConfigRecord> {
    options.validate()?;
    let mut record = ConfigRecord::load(params_path)?;
    debug!(path = %params_path.display(), keys = record.len(), "loaded parameter file");

    let norm_path = normalization_path(dataset_root);
    if norm_path.is_file() {
        let layer = json::read_object(&norm_path)?;
        info!(path = %norm_path.display(), keys = layer.len(), "merging normalization parameters");
        record.merge(layer);
    }

    record.merge(options.to_layer());
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::fs;

    fn write(path: &Path, value: Value) {
        fs::write(path, serde_json::to_string(&value).unwrap()).unwrap();
    }

    #[test]
    fn non_finite_or_out_of_range_options_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("params.json");
        write(&params, json!({}));

        for options in [
            RunOptions { learning_rate: f64::NAN, ..RunOptions::default() },
            RunOptions { learning_rate: f64::INFINITY, ..RunOptions::default() },
            RunOptions { learning_rate: 0.0, ..RunOptions::default() },
            RunOptions { dropout: f64::NAN, ..RunOptions::default() },
            RunOptions { dropout: 1.0, ..RunOptions::default() },
            RunOptions { batch_size: 0, ..RunOptions::default() },
        ] {
            let err = resolve(&params, dir.path(), &options).unwrap_err();
            assert!(matches!(err, TrainError::InvalidInput(_)), "{options:?}");
        }
        assert!(RunOptions::default().validate().is_ok());
    }

    #[test]
    fn options_win_over_files() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("params.json");
        write(&params, json!({"batch_size": 8, "dense_hidden_sizes": [16]}));
        let options = RunOptions {
            train_path: dir.path().to_path_buf(),
            batch_size: 32,
            ..RunOptions::default()
        };

        let record = resolve(&params, dir.path(), &options).unwrap();
        assert_eq!(record.get_u64("batch_size"), Some(32));
        assert_eq!(record.get("dense_hidden_sizes"), Some(&json!([16])));
    }

    #[test]
    fn normalization_file_overrides_params() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("params.json");
        write(&params, json!({"ic50_max": 1.0, "ic50_min": 0.0}));
        write(
            &dir.path().join(NORMALIZATION_FILE),
            json!({"ic50_max": 9.5}),
        );

        let record = resolve(&params, dir.path(), &RunOptions::default()).unwrap();
        assert_eq!(record.get_f64("ic50_max"), Some(9.5));
        assert_eq!(record.get_f64("ic50_min"), Some(0.0));
    }

    #[test]
    fn normalization_file_next_to_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.jsonl");
        fs::write(&data, "").unwrap();
        assert_eq!(
            normalization_path(&data),
            dir.path().join(NORMALIZATION_FILE)
        );
    }

    #[test]
    fn missing_normalization_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("params.json");
        write(&params, json!({"a": "b"}));
        let record = resolve(&params, &dir.path().join("nope"), &RunOptions::default()).unwrap();
        assert_eq!(record.get_str("a"), Some("b"));
    }

    #[test]
    fn single_thread_becomes_unset() {
        let layer = RunOptions::default().to_layer();
        assert_eq!(layer["number_of_threads"], Value::Null);

        let layer = RunOptions {
            num_threads: 4,
            ..RunOptions::default()
        }
        .to_layer();
        assert_eq!(layer["number_of_threads"], json!(4));
    }

    #[test]
    fn malformed_params_fail() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("params.json");
        fs::write(&params, "{not json").unwrap();
        let err = resolve(&params, dir.path(), &RunOptions::default()).unwrap_err();
        assert_eq!(err.code(), crate::common::error::ExitCode::ConfigLoad);
    }

    fn small_map() -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map("[a-e]{1,2}", any::<i32>(), 0..8).prop_map(|m| {
            m.into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect::<Map<String, Value>>()
        })
    }

    proptest! {
        #[test]
        fn later_layers_always_win(base in small_map(), overrides in small_map()) {
            let mut record = ConfigRecord(base.clone());
            record.merge(overrides.clone());

            for (key, value) in &overrides {
                prop_assert_eq!(record.get(key), Some(value));
            }
            for key in base.keys() {
                prop_assert!(record.contains_key(key));
            }
        }
    }
}
