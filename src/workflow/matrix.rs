//! Job matrix and execution strategy
//!
//! A matrix declares named axes (in declaration order) whose cartesian
//! product yields the concrete job instances. `exclude` removes specific
//! combinations, `include` appends extra ones. In YAML the matrix is written
//! map-style, with `exclude` and `include` as reserved keys:
//!
//! ```yaml
//! strategy:
//!   matrix:
//!     os: [ubuntu-22.04, ubuntu-20.04, macos-13]
//!     interpreter: ["3.10"]
//!     exclude:
//!       - os: macos-13
//!         interpreter: "3.10"
//! ```

use std::collections::HashMap;
use std::fmt;

use ahash::AHashSet;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::ValidationError;
use super::yaml::ScalarString;

/// A job matrix: ordered axes with exclusions and extra combinations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Matrix {
    /// Axes in declaration order
    pub axes: Vec<MatrixAxis>,
    /// Combinations removed from the cartesian product
    pub exclude: Vec<HashMap<String, String>>,
    /// Combinations appended after exclusion
    pub include: Vec<HashMap<String, String>>,
}

/// A single axis of the matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixAxis {
    /// Name of the axis
    pub name: String,
    /// Values for this axis
    pub values: Vec<String>,
}

/// One concrete combination produced by matrix expansion.
///
/// Pairs are kept in axis declaration order so the entry renders stably,
/// both for job naming and for reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatrixEntry {
    pairs: Vec<(String, String)>,
}

impl MatrixEntry {
    fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// Creates the empty entry used for jobs without a matrix
    #[must_use]
    pub fn empty() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Looks up the value for an axis
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `(axis, value)` pairs in axis declaration order
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Returns true if the entry carries no values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The values as a lookup map for expression interpolation
    #[must_use]
    pub fn context(&self) -> HashMap<String, String> {
        self.pairs.iter().cloned().collect()
    }

    /// Comma-separated values, e.g. `ubuntu-22.04, 3.10`
    #[must_use]
    pub fn label(&self) -> String {
        self.pairs
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MatrixEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Matrix {
    /// Creates a new empty matrix
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an axis to the matrix
    #[must_use]
    pub fn add_axis(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.axes.push(MatrixAxis {
            name: name.into(),
            values,
        });
        self
    }

    /// Adds an exclusion rule
    #[must_use]
    pub fn add_exclude(mut self, conditions: HashMap<String, String>) -> Self {
        self.exclude.push(conditions);
        self
    }

    /// Adds an extra combination
    #[must_use]
    pub fn add_include(mut self, values: HashMap<String, String>) -> Self {
        self.include.push(values);
        self
    }

    /// Returns true if no axes are declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Expands the matrix into concrete entries.
    ///
    /// The cartesian product is built axis by axis in declaration order,
    /// exclusions are filtered out, includes are appended, and exact
    /// duplicates are dropped. The output order is deterministic.
    #[must_use]
    pub fn expand(&self) -> Vec<MatrixEntry> {
        if self.axes.is_empty() {
            return Vec::new();
        }

        let mut combinations: Vec<Vec<(String, String)>> = vec![vec![]];
        for axis in &self.axes {
            let mut next = Vec::with_capacity(combinations.len() * axis.values.len());
            for combo in &combinations {
                for value in &axis.values {
                    let mut entry = combo.clone();
                    entry.push((axis.name.clone(), value.clone()));
                    next.push(entry);
                }
            }
            combinations = next;
        }

        let mut seen: AHashSet<Vec<(String, String)>> = AHashSet::new();
        let mut entries = Vec::new();

        for combo in combinations {
            if self.is_excluded(&combo) {
                continue;
            }
            if seen.insert(combo.clone()) {
                entries.push(MatrixEntry::new(combo));
            }
        }

        for extra in &self.include {
            let combo = self.ordered_pairs(extra);
            if seen.insert(combo.clone()) {
                entries.push(MatrixEntry::new(combo));
            }
        }

        entries
    }

    /// Checks whether all keys of some exclude rule match the combination
    fn is_excluded(&self, combo: &[(String, String)]) -> bool {
        self.exclude.iter().any(|rule| {
            !rule.is_empty()
                && rule
                    .iter()
                    .all(|(key, value)| combo.iter().any(|(k, v)| k == key && v == value))
        })
    }

    /// Orders an include entry: declared axes first, extra keys sorted
    fn ordered_pairs(&self, values: &HashMap<String, String>) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(values.len());
        for axis in &self.axes {
            if let Some(value) = values.get(&axis.name) {
                pairs.push((axis.name.clone(), value.clone()));
            }
        }
        let mut extras: Vec<_> = values
            .iter()
            .filter(|(key, _)| !self.axes.iter().any(|a| &a.name == *key))
            .collect();
        extras.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in extras {
            pairs.push((key.clone(), value.clone()));
        }
        pairs
    }

    /// Validates the matrix in the context of the named job
    #[allow(clippy::missing_errors_doc)]
    pub fn validate_for(&self, job: &str) -> Result<(), ValidationError> {
        if self.axes.is_empty() {
            return Err(ValidationError::EmptyMatrix {
                job: job.to_string(),
            });
        }
        for axis in &self.axes {
            if axis.values.is_empty() {
                return Err(ValidationError::EmptyMatrixAxis {
                    job: job.to_string(),
                    axis: axis.name.clone(),
                });
            }
        }
        for rule in &self.exclude {
            for key in rule.keys() {
                if !self.axes.iter().any(|a| &a.name == key) {
                    return Err(ValidationError::UnknownExcludeKey {
                        job: job.to_string(),
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

// `exclude` and `include` are reserved keys of the map-style syntax; every
// other key is an axis, kept in encounter order.
impl<'de> Deserialize<'de> for Matrix {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MatrixVisitor;

        impl<'de> Visitor<'de> for MatrixVisitor {
            type Value = Matrix;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of matrix axes, optionally with 'exclude' and 'include'")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Matrix, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut matrix = Matrix::default();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "exclude" => {
                            let rules: Vec<HashMap<String, ScalarString>> = map.next_value()?;
                            matrix.exclude = rules.into_iter().map(into_string_map).collect();
                        }
                        "include" => {
                            let rules: Vec<HashMap<String, ScalarString>> = map.next_value()?;
                            matrix.include = rules.into_iter().map(into_string_map).collect();
                        }
                        _ => {
                            let values: Vec<ScalarString> = map.next_value()?;
                            matrix.axes.push(MatrixAxis {
                                name: key,
                                values: values.into_iter().map(ScalarString::into_inner).collect(),
                            });
                        }
                    }
                }
                Ok(matrix)
            }
        }

        deserializer.deserialize_map(MatrixVisitor)
    }
}

impl Serialize for Matrix {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = self.axes.len()
            + usize::from(!self.exclude.is_empty())
            + usize::from(!self.include.is_empty());
        let mut map = serializer.serialize_map(Some(len))?;
        for axis in &self.axes {
            map.serialize_entry(&axis.name, &axis.values)?;
        }
        if !self.exclude.is_empty() {
            map.serialize_entry("exclude", &self.exclude)?;
        }
        if !self.include.is_empty() {
            map.serialize_entry("include", &self.include)?;
        }
        map.end()
    }
}

fn into_string_map(map: HashMap<String, ScalarString>) -> HashMap<String, String> {
    map.into_iter()
        .map(|(k, v)| (k, v.into_inner()))
        .collect()
}

/// Execution strategy for a job's matrix instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    /// The matrix to expand; absent means a single instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Matrix>,

    /// Cancel not-yet-started instances once one fails
    #[serde(
        rename = "fail-fast",
        default = "default_fail_fast",
        skip_serializing_if = "is_true"
    )]
    pub fail_fast: bool,

    /// Upper bound on concurrently running instances
    #[serde(
        rename = "max-parallel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_parallel: Option<usize>,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            matrix: None,
            fail_fast: true,
            max_parallel: None,
        }
    }
}

fn default_fail_fast() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_true(value: &bool) -> bool {
    *value
}
