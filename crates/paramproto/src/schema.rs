//! Schema payloads and reconciliation.
//!
//! A schema is the remote side's declaration of which params exist. It is
//! decoded from a `POST schema.json?schema=...` frame, applied once to the
//! client's [`Params`] and then only kept as the client's replay cache.
//!
//! Applying is a diff, not a rebuild: params whose path is still declared
//! keep their instance, value and subscriptions, so anything bound to them
//! keeps working across schema refreshes.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::param::{Param, ParamOpts};
use crate::params::Params;
use crate::value::ParamType;

/// One `{path, type, value?, opts?}` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub path: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opts: Option<ParamOpts>,
}

impl ParamDescriptor {
    pub fn new(path: impl Into<String>, ty: ParamType) -> Self {
        Self {
            path: path.into(),
            ty,
            value: None,
            opts: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_opts(mut self, opts: ParamOpts) -> Self {
        self.opts = Some(opts);
        self
    }

    /// Build a fresh param for this descriptor.
    pub fn to_param(&self) -> Param {
        Param::new(
            self.path.clone(),
            self.ty,
            self.value.clone(),
            self.opts.clone().unwrap_or_default(),
        )
    }
}

/// Errors decoding a schema payload.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Schema must be a JSON array, got {0}")]
    NotAnArray(&'static str),
}

/// Paths touched by one [`Schema::apply_to`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// An ordered descriptor list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    descriptors: Vec<ParamDescriptor>,
}

impl Schema {
    pub fn new(descriptors: Vec<ParamDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Decode a JSON array of descriptors.
    ///
    /// Entries that are not valid descriptors (missing path, unknown type
    /// letter, ...) are skipped with a warning; the rest of the schema is kept.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let raw: Value = serde_json::from_str(text)?;
        let entries = match raw {
            Value::Array(entries) => entries,
            Value::Object(_) => return Err(SchemaError::NotAnArray("object")),
            Value::String(_) => return Err(SchemaError::NotAnArray("string")),
            Value::Number(_) => return Err(SchemaError::NotAnArray("number")),
            Value::Bool(_) => return Err(SchemaError::NotAnArray("bool")),
            Value::Null => return Err(SchemaError::NotAnArray("null")),
        };

        let mut descriptors = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<ParamDescriptor>(entry) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => warn!("Skipping schema entry {}: {}", index, e),
            }
        }
        Ok(Self { descriptors })
    }

    pub fn to_json(&self) -> String {
        // Descriptors hold only strings, enums and JSON values
        serde_json::to_string(&self.descriptors).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn descriptors(&self) -> &[ParamDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Reconcile `params` with this schema.
    ///
    /// Removes params no longer declared, adds newly declared ones, leaves
    /// the rest untouched, and fires a single schema change if anything moved.
    pub fn apply_to(&self, params: &Params) -> SchemaDiff {
        let declared: HashSet<&str> = self.descriptors.iter().map(|d| d.path.as_str()).collect();

        let removes: Vec<Arc<Param>> = params
            .params()
            .into_iter()
            .filter(|p| !declared.contains(p.path()))
            .collect();

        let mut seen = HashSet::new();
        let adds: Vec<Arc<Param>> = self
            .descriptors
            .iter()
            .filter(|d| !params.contains(&d.path))
            .filter(|d| seen.insert(d.path.as_str()))
            .map(|d| Arc::new(d.to_param()))
            .collect();

        let diff = SchemaDiff {
            added: adds.iter().map(|p| p.path().to_string()).collect(),
            removed: removes.iter().map(|p| p.path().to_string()).collect(),
        };

        params.remove_all(&removes, false);
        params.add_all(adds, false);

        if !diff.is_empty() {
            debug!(
                "Schema applied: +{} -{} ({} params)",
                diff.added.len(),
                diff.removed.len(),
                params.len()
            );
            params.schema_change().emit(&());
        }

        diff
    }
}

impl From<Vec<ParamDescriptor>> for Schema {
    fn from(descriptors: Vec<ParamDescriptor>) -> Self {
        Self::new(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schema(paths: &[&str]) -> Schema {
        Schema::new(
            paths
                .iter()
                .map(|p| ParamDescriptor::new(*p, ParamType::Int).with_value(0))
                .collect(),
        )
    }

    #[test]
    fn diff_is_minimal_and_keeps_instances() {
        let params = Params::new();
        schema(&["/a", "/b", "/c"]).apply_to(&params);
        let b = params.get("/b").unwrap();
        let c = params.get("/c").unwrap();
        b.set(11);

        let forwarded = Arc::new(AtomicUsize::new(0));
        let f = forwarded.clone();
        let _sub = params.value_change().subscribe(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        let diff = schema(&["/b", "/c", "/d"]).apply_to(&params);

        assert_eq!(
            diff,
            SchemaDiff {
                added: vec!["/d".to_string()],
                removed: vec!["/a".to_string()],
            }
        );
        assert!(Arc::ptr_eq(&params.get("/b").unwrap(), &b));
        assert!(Arc::ptr_eq(&params.get("/c").unwrap(), &c));
        assert_eq!(b.get_value().as_i64(), Some(11));
        assert_eq!(params.paths(), vec!["/b", "/c", "/d"]);

        // forwarding for survivors is still wired
        c.set(3);
        assert_eq!(forwarded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let params = Params::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = params.schema_change().subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let s = schema(&["/a", "/b"]);
        assert!(!s.apply_to(&params).is_empty());
        assert!(s.apply_to(&params).is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decodes_wire_json() {
        let s = Schema::from_json(
            r#"[{"path":"/a","type":"i","value":"5"},
                {"path":"/f","type":"f","opts":{"min":0,"max":1}},
                {"path":"/bad","type":"x"},
                {"type":"s"}]"#,
        )
        .unwrap();

        assert_eq!(s.len(), 2);
        assert_eq!(s.descriptors()[0].ty, ParamType::Int);
        assert_eq!(
            s.descriptors()[1].opts.as_ref().and_then(|o| o.range()),
            Some((0.0, 1.0))
        );
    }

    #[test]
    fn rejects_non_arrays() {
        assert!(matches!(
            Schema::from_json(r#"{"path":"/a"}"#),
            Err(SchemaError::NotAnArray("object"))
        ));
        assert!(matches!(Schema::from_json("[{"), Err(SchemaError::Json(_))));
    }

    #[test]
    fn json_roundtrip_keeps_descriptors() {
        let s = Schema::new(vec![
            ParamDescriptor::new("/name", ParamType::String).with_value("osc"),
            ParamDescriptor::new("/go", ParamType::Void),
        ]);
        assert_eq!(Schema::from_json(&s.to_json()).unwrap(), s);
    }

    #[test]
    fn empty_schema_clears_everything() {
        let params = Params::new();
        schema(&["/a", "/b"]).apply_to(&params);
        let diff = Schema::default().apply_to(&params);
        assert_eq!(diff.removed.len(), 2);
        assert!(params.is_empty());
    }
}
