//! Small helpers for reading and writing structured JSON documents.
//!
//! Parameter files, normalization files, checkpoints and exports all go
//! through these functions so the on-disk format stays uniform.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::common::error::{TrainError, TrainResult};

/// Read a JSON document whose top level must be an object.
///
/// Missing files and malformed content both map to `ConfigLoad`.
pub fn read_object(path: &Path) -> TrainResult<Map<String, Value>> {
    let raw = fs::read_to_string(path).map_err(|err| TrainError::ConfigLoad {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(TrainError::ConfigLoad {
            path: path.to_path_buf(),
            reason: format!("expected a JSON object, found {}", kind_of(&other)),
        }),
        Err(err) => Err(TrainError::ConfigLoad {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }),
    }
}

/// Deserialize any JSON document into `T`.
pub fn read<T: DeserializeOwned>(path: &Path) -> TrainResult<T> {
    let raw = fs::read_to_string(path).map_err(|err| TrainError::io(path, err))?;
    serde_json::from_str(&raw)
        .map_err(|err| TrainError::training(format!("malformed {}: {err}", path.display())))
}

/// Write `value` as pretty JSON, replacing `path` atomically.
///
/// The document is written next to the target and renamed into place so a
/// reader never observes a half-written file.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> TrainResult<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp).map_err(|err| TrainError::io(&tmp, err))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|err| TrainError::training(format!("serialize {}: {err}", path.display())))?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|err| TrainError::io(&tmp, err))?;
    }
    fs::rename(&tmp, path).map_err(|err| TrainError::io(path, err))
}

/// Append one compact JSON line to `path`, creating it when absent.
pub fn append_line<T: Serialize>(path: &Path, value: &T) -> TrainResult<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| TrainError::io(path, err))?;
    let mut line = serde_json::to_vec(value)
        .map_err(|err| TrainError::training(format!("serialize {}: {err}", path.display())))?;
    line.push(b'\n');
    file.write_all(&line).map_err(|err| TrainError::io(path, err))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
