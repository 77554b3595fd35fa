//! A single typed, observable param.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signal::{Signal, Subscription};
use crate::value::{ParamType, ParamValue};

/// Optional hints attached to a param by the remote side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamOpts {
    /// `(min, max)` when both bounds are present and numeric.
    pub fn range(&self) -> Option<(f64, f64)> {
        let min = self.min.as_ref()?.as_f64()?;
        let max = self.max.as_ref()?.as_f64()?;
        Some((min, max))
    }
}

/// A named, typed value cell mirrored from the remote process.
///
/// Shared as `Arc<Param>`; the same instance survives schema updates that
/// keep its path, so holding one (and its subscriptions) is safe across
/// reconciliation.
pub struct Param {
    path: String,
    ty: ParamType,
    opts: ParamOpts,
    value: Mutex<Option<ParamValue>>,
    value_change: Signal<ParamValue>,
}

impl Param {
    /// Create a param; an initial `value` is coerced without notifying.
    pub fn new(
        path: impl Into<String>,
        ty: ParamType,
        value: Option<Value>,
        opts: ParamOpts,
    ) -> Self {
        let value = value.filter(|v| !v.is_null()).map(|v| ty.coerce(&v));
        Self {
            path: path.into(),
            ty,
            opts,
            value: Mutex::new(value),
            value_change: Signal::new(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn ty(&self) -> ParamType {
        self.ty
    }

    pub fn opts(&self) -> &ParamOpts {
        &self.opts
    }

    /// Last segment of the path, used as a display label.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// The stored value, if one was ever set.
    pub fn value(&self) -> Option<ParamValue> {
        self.value.lock().clone()
    }

    /// Stored value, else the coerced `opts.default`, else the type's zero.
    pub fn get_value(&self) -> ParamValue {
        if let Some(value) = self.value.lock().as_ref() {
            return value.clone();
        }
        match self.opts.default.as_ref() {
            Some(default) if !default.is_null() => self.ty.coerce(default),
            _ => self.ty.zero(),
        }
    }

    /// Coerce and store `value`. Notifies subscribers and returns `true` only
    /// when the canonical value differs from what was stored.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        let canonical = self.ty.coerce(&value.into());
        self.store(canonical)
    }

    /// Like [`Param::set`] for raw wire text.
    pub fn set_str(&self, raw: &str) -> bool {
        self.store(self.ty.coerce_str(raw))
    }

    fn store(&self, canonical: ParamValue) -> bool {
        {
            let mut current = self.value.lock();
            if current.as_ref() == Some(&canonical) {
                return false;
            }
            *current = Some(canonical.clone());
        }
        self.value_change.emit(&canonical);
        true
    }

    /// Called with the new canonical value after every effective change.
    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ParamValue) + Send + Sync + 'static,
    {
        self.value_change.subscribe(handler)
    }

    pub fn value_change(&self) -> &Signal<ParamValue> {
        &self.value_change
    }

    /// Size of the decoded payload of an image param, for display.
    pub fn image_len(&self) -> Option<usize> {
        if self.ty != ParamType::Image {
            return None;
        }
        self.get_value().image_bytes().map(|bytes| bytes.len())
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Param")
            .field("path", &self.path)
            .field("type", &self.ty)
            .field("value", &*self.value.lock())
            .field("opts", &self.opts)
            .finish()
    }
}
