//! Reading JSON Lines records and turning them into batches.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use tracing::debug;

use crate::common::error::{TrainError, TrainResult};

use super::domain::{Batch, InputSpec, LabelScaling, Record, LABEL_KEY};
use super::workers;

/// Data files behind `path`: the file itself or the sorted `*.jsonl` entries
/// of a directory.
pub fn data_files(path: &Path) -> TrainResult<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(path)
        .map_err(|err| TrainError::io(path, err))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    files.sort();
    Ok(files)
}

/// Parse every record behind `spec.path`.
pub fn load_records(spec: &InputSpec) -> TrainResult<Vec<Record>> {
    let mut lines = Vec::new();
    for file in data_files(&spec.path)? {
        let raw = fs::read_to_string(&file).map_err(|err| TrainError::io(&file, err))?;
        lines.extend(
            raw.lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(idx, line)| (file.clone(), idx + 1, line.to_string())),
        );
    }

    let features = Arc::new(spec.features.clone());
    let scaling = spec.scaling;
    let parse = move |(file, line_no, line): (PathBuf, usize, String)| {
        parse_record(&line, &features, scaling).map_err(|reason| {
            TrainError::training(format!("{}:{line_no}: {reason}", file.display()))
        })
    };

    let parsed: Vec<TrainResult<Record>> = match spec.num_threads {
        Some(threads) => workers::map_chunks(lines, threads, parse)?,
        None => lines.into_iter().map(parse).collect(),
    };
    let records = parsed.into_iter().collect::<TrainResult<Vec<_>>>()?;

    if let Some(first) = records.first() {
        let width = first.inputs.len();
        if let Some(bad) = records.iter().position(|r| r.inputs.len() != width) {
            return Err(TrainError::training(format!(
                "record {bad} in {} has {} inputs, expected {width}",
                spec.path.display(),
                records[bad].inputs.len()
            )));
        }
    }

    debug!(path = %spec.path.display(), records = records.len(), "loaded input records");
    Ok(records)
}

/// Parse one JSON line, flattening features in the order given.
pub fn parse_record(
    line: &str,
    features: &[String],
    scaling: Option<LabelScaling>,
) -> Result<Record, String> {
    let value: Value = serde_json::from_str(line).map_err(|err| err.to_string())?;
    let object = value.as_object().ok_or("record is not a JSON object")?;

    let mut inputs = Vec::new();
    for name in features {
        match object.get(name) {
            Some(Value::Number(n)) => inputs.push(n.as_f64().unwrap_or_default() as f32),
            Some(Value::Array(items)) => {
                for item in items {
                    let x = item
                        .as_f64()
                        .ok_or_else(|| format!("feature '{name}' holds a non-numeric value"))?;
                    inputs.push(x as f32);
                }
            }
            Some(_) => return Err(format!("feature '{name}' is not numeric")),
            None => return Err(format!("feature '{name}' is missing")),
        }
    }

    let raw_label = object
        .get(LABEL_KEY)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("label '{LABEL_KEY}' is missing or not numeric"))?;
    let label = match scaling {
        Some(scaling) => scaling.apply(raw_label),
        None => raw_label as f32,
    };

    Ok(Record { inputs, label })
}

/// Batch iterator over loaded records.
///
/// Training input is shuffled through a bounded buffer and repeats forever;
/// evaluation input is read once in file order.
pub struct Batches {
    records: Arc<Vec<Record>>,
    batch_size: usize,
    repeat: bool,
    shuffle_buffer: Option<usize>,
    prefetch: usize,
    rng: StdRng,
    cursor: usize,
    buffer: Vec<usize>,
    ready: VecDeque<Batch>,
    exhausted: bool,
}

impl Batches {
    pub fn new(records: Arc<Vec<Record>>, spec: &InputSpec) -> Self {
        Self {
            records,
            batch_size: spec.batch_size,
            repeat: spec.repeat(),
            shuffle_buffer: spec.repeat().then_some(spec.shuffle_buffer),
            prefetch: spec.prefetch,
            rng: StdRng::seed_from_u64(spec.seed),
            cursor: 0,
            buffer: Vec::new(),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    fn next_index(&mut self) -> Option<usize> {
        let Some(capacity) = self.shuffle_buffer else {
            let idx = (self.cursor < self.records.len()).then_some(self.cursor);
            self.cursor += 1;
            return idx;
        };
        while self.buffer.len() < capacity && self.cursor < self.records.len() {
            self.buffer.push(self.cursor);
            self.cursor += 1;
        }
        if self.buffer.is_empty() {
            return None;
        }
        let pick = self.rng.gen_range(0..self.buffer.len());
        Some(self.buffer.swap_remove(pick))
    }

    fn assemble(&mut self) -> Option<Batch> {
        let mut batch = Batch::default();
        while batch.len() < self.batch_size {
            match self.next_index() {
                Some(idx) => {
                    let record = &self.records[idx];
                    batch.inputs.push(record.inputs.clone());
                    batch.labels.push(record.label);
                }
                None if self.repeat && !self.records.is_empty() => {
                    self.cursor = 0;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }
        (!batch.is_empty()).then_some(batch)
    }
}

impl Iterator for Batches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        while self.ready.len() < self.prefetch && !self.exhausted {
            match self.assemble() {
                Some(batch) => self.ready.push_back(batch),
                None => break,
            }
        }
        self.ready.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::Mode;

    fn spec(path: &Path, mode: Mode, threads: Option<usize>) -> InputSpec {
        InputSpec {
            mode,
            path: path.to_path_buf(),
            features: vec!["gene_expression".into(), "mutation".into()],
            batch_size: 4,
            shuffle_buffer: 8,
            num_threads: threads,
            prefetch: 2,
            scaling: None,
            seed: 7,
        }
    }

    fn write_records(path: &Path, n: usize) {
        let body: String = (0..n)
            .map(|i| format!("{{\"gene_expression\":[{i},1.5],\"mutation\":0,\"ic50\":{i}}}\n"))
            .collect();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn flattens_features_in_order() {
        let features = vec!["b".to_string(), "a".to_string()];
        let record = parse_record(r#"{"a":[1,2],"b":3,"ic50":0.5}"#, &features, None).unwrap();
        assert_eq!(record.inputs, vec![3.0, 1.0, 2.0]);
        assert_eq!(record.label, 0.5);
    }

    #[test]
    fn missing_feature_is_reported() {
        let err = parse_record(r#"{"ic50":1}"#, &["a".to_string()], None).unwrap_err();
        assert!(err.contains("'a' is missing"));
    }

    #[test]
    fn parallel_and_serial_loads_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.jsonl");
        write_records(&path, 25);

        let serial = load_records(&spec(&path, Mode::Train, None)).unwrap();
        let parallel = load_records(&spec(&path, Mode::Train, Some(3))).unwrap();
        assert_eq!(serial.len(), 25);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn directory_input_reads_jsonl_files() {
        let dir = tempfile::tempdir().unwrap();
        write_records(&dir.path().join("a.jsonl"), 3);
        write_records(&dir.path().join("b.jsonl"), 2);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let records = load_records(&spec(dir.path(), Mode::Eval, None)).unwrap();
        assert_eq!(records.len(), 5);
    }

    #[test]
    fn bad_line_names_file_and_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.jsonl");
        fs::write(&path, "{\"gene_expression\":1,\"mutation\":1,\"ic50\":1}\n{oops\n").unwrap();
        let err = load_records(&spec(&path, Mode::Train, None)).unwrap_err();
        assert!(err.to_string().contains("train.jsonl:2"));
    }

    #[test]
    fn eval_batches_cover_each_record_once() {
        let records: Vec<Record> = (0..10)
            .map(|i| Record {
                inputs: vec![i as f32],
                label: i as f32,
            })
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let batches: Vec<Batch> =
            Batches::new(Arc::new(records), &spec(dir.path(), Mode::Eval, None)).collect();

        assert_eq!(batches.len(), 3);
        let labels: Vec<f32> = batches.iter().flat_map(|b| b.labels.clone()).collect();
        assert_eq!(labels, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn train_batches_repeat_and_shuffle() {
        let records: Vec<Record> = (0..6)
            .map(|i| Record {
                inputs: vec![i as f32],
                label: i as f32,
            })
            .collect();
        let dir = tempfile::tempdir().unwrap();
        let mut batches = Batches::new(Arc::new(records), &spec(dir.path(), Mode::Train, None));

        let seen: Vec<f32> = (0..6).flat_map(|_| batches.next().unwrap().labels).collect();
        assert_eq!(seen.len(), 24);
        let mut first_epoch = seen[..6].to_vec();
        first_epoch.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(first_epoch, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn empty_training_data_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut batches = Batches::new(Arc::new(Vec::new()), &spec(dir.path(), Mode::Train, None));
        assert!(batches.next().is_none());
    }
}
