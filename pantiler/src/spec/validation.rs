//! Structural validation of build-spec documents.
//!
//! The validator walks the raw document and records every violation it
//! finds; it never stops at the first one, so a user sees all problems at
//! once. Only a document with zero violations is turned into a
//! [`BuildSpec`], and only if no two of its sources would share cache files.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use reqwest::Url;
use serde_json::{Map, Value};

use super::types::{BuildSpec, Source};
use crate::cache::specifier;

/// A single segment of a path into the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// One schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Location of the offending field, e.g. `sources[0].inputs[1].url`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// All violations found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
    pub violations: Vec<Violation>,
}

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tilefile is not valid:")?;
        for violation in &self.violations {
            write!(f, "\n  {}", violation)?;
        }
        Ok(())
    }
}

/// Render a path the way users write it: `a.b[0].c`.
pub fn render_path(segments: &[PathSegment]) -> String {
    let mut rendered = String::new();
    for segment in segments {
        match segment {
            PathSegment::Index(i) => rendered.push_str(&format!("[{}]", i)),
            PathSegment::Key(key) if rendered.is_empty() => rendered.push_str(key),
            PathSegment::Key(key) => {
                rendered.push('.');
                rendered.push_str(key);
            }
        }
    }
    rendered
}

/// Validate a raw document and convert it into a [`BuildSpec`].
pub fn validate(document: &Value) -> Result<BuildSpec, ValidationErrors> {
    let mut validator = Validator::default();
    validator.build_spec(document);

    if !validator.violations.is_empty() {
        return Err(ValidationErrors {
            violations: validator.violations,
        });
    }

    let spec: BuildSpec = serde_json::from_value(document.clone()).map_err(|e| ValidationErrors {
        violations: vec![Violation {
            path: String::new(),
            message: e.to_string().to_lowercase(),
        }],
    })?;

    let violations = cache_clashes(&spec);
    if !violations.is_empty() {
        return Err(ValidationErrors { violations });
    }
    Ok(spec)
}

/// Cache file names a source can produce, without extensions.
fn cache_keys(source: &Source) -> BTreeSet<String> {
    let inputs = source.inputs.len();
    let outputs = source.outputs.len();
    let mut keys: BTreeSet<String> = source
        .inputs
        .iter()
        .map(|input| format!("{}{}", source.name, specifier(&input.name, inputs)))
        .collect();
    keys.extend(
        source
            .outputs
            .iter()
            .map(|output| format!("{}{}", source.name, specifier(&output.name, outputs))),
    );
    for layer in source.outputs.iter().filter_map(|o| o.layer.as_deref()) {
        for input in &source.inputs {
            keys.insert(format!("{}{}-{}", source.name, specifier(&input.name, inputs), layer));
        }
    }
    keys
}

/// Report each source whose cache files collide with an earlier source's.
fn cache_clashes(spec: &BuildSpec) -> Vec<Violation> {
    let mut owners: HashMap<String, &str> = HashMap::new();
    let mut violations = Vec::new();
    for (i, source) in spec.sources.iter().enumerate() {
        let keys = cache_keys(source);
        if let Some(owner) = keys.iter().find_map(|key| owners.get(key)) {
            violations.push(Violation {
                path: format!("sources[{}].name", i),
                message: format!("cache files clash with source \"{}\"", owner),
            });
        }
        for key in keys {
            owners.entry(key).or_insert(&source.name);
        }
    }
    violations
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Default)]
struct Validator {
    path: Vec<PathSegment>,
    violations: Vec<Violation>,
}

/// Whether an integer field must be strictly positive.
#[derive(Clone, Copy)]
enum Bound {
    Positive,
    NonNegative,
}

impl Validator {
    fn report(&mut self, message: impl Into<String>) {
        self.violations.push(Violation {
            path: render_path(&self.path),
            message: message.into(),
        });
    }

    fn at<F>(&mut self, segment: PathSegment, check: F)
    where
        F: FnOnce(&mut Self),
    {
        self.path.push(segment);
        check(self);
        self.path.pop();
    }

    fn expect_object<'v>(&mut self, value: &'v Value) -> Option<&'v Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            other => {
                self.report(format!("expected object, received {}", type_name(other)));
                None
            }
        }
    }

    /// Check a field of `object`, reporting `required` when a mandatory field is missing.
    fn field<F>(&mut self, object: &Map<String, Value>, key: &str, required: bool, check: F)
    where
        F: FnOnce(&mut Self, &Value),
    {
        self.at(PathSegment::Key(key.to_string()), |v| {
            match object.get(key) {
                None | Some(Value::Null) if required => v.report("required"),
                None | Some(Value::Null) => {}
                Some(value) => check(v, value),
            }
        });
    }

    fn string(&mut self, value: &Value) {
        if !value.is_string() {
            self.report(format!("expected string, received {}", type_name(value)));
        }
    }

    /// A name used as a single file name in the cache or target directory.
    fn file_name(&mut self, value: &Value) {
        match value.as_str() {
            Some(name) if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") => {
                self.report("must be a plain file name")
            }
            Some(_) => {}
            None => self.report(format!("expected string, received {}", type_name(value))),
        }
    }

    fn url(&mut self, value: &Value) {
        match value.as_str() {
            Some(s) if Url::parse(s).is_ok() => {}
            Some(_) => self.report("invalid url"),
            None => self.report(format!("expected string, received {}", type_name(value))),
        }
    }

    fn integer(&mut self, value: &Value, bound: Bound) {
        if !value.is_number() {
            self.report(format!("expected number, received {}", type_name(value)));
            return;
        }
        let Some(number) = value.as_i64() else {
            self.report("expected integer, received float");
            return;
        };
        match bound {
            Bound::Positive if number <= 0 => self.report("number must be greater than 0"),
            Bound::NonNegative if number < 0 => {
                self.report("number must be greater than or equal to 0")
            }
            _ if number > i64::from(u32::MAX) => self.report("number is too large"),
            _ => {}
        }
    }

    fn list<F>(&mut self, value: &Value, mut item: F)
    where
        F: FnMut(&mut Self, &Value),
    {
        let Some(items) = value.as_array() else {
            self.report(format!("expected array, received {}", type_name(value)));
            return;
        };
        let mut seen = HashSet::new();
        for (i, entry) in items.iter().enumerate() {
            self.at(PathSegment::Index(i), |v| {
                item(v, entry);
                if let Some(name) = entry.get("name").and_then(Value::as_str) {
                    if !seen.insert(name.to_string()) {
                        v.at(PathSegment::Key("name".to_string()), |v| {
                            v.report(format!("duplicate name \"{}\"", name))
                        });
                    }
                }
            });
        }
    }

    fn build_spec(&mut self, document: &Value) {
        let Some(root) = self.expect_object(document) else {
            return;
        };
        self.field(root, "host", true, Self::url);
        self.field(root, "zoomFrom", true, |v, x| v.integer(x, Bound::Positive));
        self.field(root, "zoomTo", true, |v, x| v.integer(x, Bound::Positive));
        self.field(root, "fonts", false, |v, x| v.list(x, Self::asset_input));
        self.field(root, "sprites", false, |v, x| v.list(x, Self::sprite));
        self.field(root, "sources", true, |v, x| v.list(x, Self::source));
        self.field(root, "styling", false, |v, x| {
            v.expect_object(x);
        });
    }

    fn asset_input(&mut self, value: &Value) {
        self.asset(value, Self::file_name);
    }

    /// Sprite names only key the manifest.
    fn sprite(&mut self, value: &Value) {
        self.asset(value, Self::string);
    }

    fn asset(&mut self, value: &Value, name: fn(&mut Self, &Value)) {
        let Some(input) = self.expect_object(value) else {
            return;
        };
        self.field(input, "name", true, name);
        self.field(input, "url", false, Self::url);
        self.field(input, "path", false, Self::string);
        self.field(input, "format", false, Self::string);
    }

    fn source(&mut self, value: &Value) {
        let Some(source) = self.expect_object(value) else {
            return;
        };
        self.field(source, "name", true, Self::file_name);
        self.field(source, "system", true, Self::string);
        self.field(source, "fieldLongitude", false, Self::string);
        self.field(source, "fieldLatitude", false, Self::string);

        let declared = |key: &str| source.get(key).is_some_and(|v| !v.is_null());
        if declared("fieldLongitude") != declared("fieldLatitude") {
            let missing = if declared("fieldLongitude") {
                "fieldLatitude"
            } else {
                "fieldLongitude"
            };
            self.at(PathSegment::Key(missing.to_string()), |v| {
                v.report("fieldLongitude and fieldLatitude must be declared together")
            });
        }

        self.field(source, "inputs", true, |v, x| v.list(x, Self::asset_input));
        self.field(source, "outputs", true, |v, x| v.list(x, Self::output));
    }

    fn output(&mut self, value: &Value) {
        let Some(output) = self.expect_object(value) else {
            return;
        };
        self.field(output, "name", true, Self::file_name);
        self.field(output, "layer", false, Self::file_name);
        self.field(output, "fields", false, |v, x| {
            let Some(fields) = v.expect_object(x) else {
                return;
            };
            for (key, source_field) in fields {
                v.at(PathSegment::Key(key.clone()), |v| v.string(source_field));
            }
        });
        self.field(output, "zoomMin", false, |v, x| v.integer(x, Bound::NonNegative));
        self.field(output, "zoomMax", false, |v, x| v.integer(x, Bound::NonNegative));
        self.field(output, "additional", false, |v, x| {
            v.expect_object(x);
        });
    }
}
