//! Run directory naming.
//!
//! The name is `ic50__<feature>__...__<variant>_<suffix>`. With an explicit
//! suffix the name is a pure function of its inputs. Without one the suffix is
//! the wall-clock time at second resolution, so two runs started within the
//! same second with identical inputs share a directory.

use std::path::{Path, PathBuf};

use crate::common::time;

pub const RUN_PREFIX: &str = "ic50";
pub const NAME_SEPARATOR: &str = "__";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunIdentity {
    prefix: String,
    suffix: String,
    path: PathBuf,
}

impl RunIdentity {
    /// `features` is expected sorted; names are used verbatim.
    pub fn build(base: &Path, features: &[String], variant: &str, suffix: Option<&str>) -> Self {
        let prefix = std::iter::once(RUN_PREFIX)
            .chain(features.iter().map(String::as_str))
            .chain(std::iter::once(variant))
            .collect::<Vec<_>>()
            .join(NAME_SEPARATOR);
        let suffix = match suffix {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => time::timestamp_suffix(),
        };
        let path = base.join(format!("{prefix}_{suffix}"));
        Self {
            prefix,
            suffix,
            path,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
