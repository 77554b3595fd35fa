//! Ordered, path-indexed collection of params.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::param::Param;
use crate::signal::{Signal, Subscription};
use crate::value::{ParamType, ParamValue};

/// Collection-level value notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub path: String,
    pub value: ParamValue,
}

/// Options for [`Params::get_values`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetValuesOptions {
    /// Leave out `g` (image) params.
    pub skip_images: bool,
}

/// The params of one client, in display order.
///
/// Each member's value notifications are forwarded to [`Params::value_change`];
/// membership changes fire [`Params::schema_change`] (no payload, re-read
/// [`Params::params`]).
#[derive(Default)]
pub struct Params {
    params: RwLock<Vec<Arc<Param>>>,
    forwarders: Mutex<HashMap<String, Subscription>>,
    value_change: Signal<ValueChange>,
    schema_change: Signal<()>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `param`. Returns `false` (and changes nothing) if its path is taken.
    pub fn add(&self, param: Arc<Param>, notify: bool) -> bool {
        let added = self.insert(param);
        if added && notify {
            self.schema_change.emit(&());
        }
        added
    }

    /// Remove the param with `param`'s path. Returns `false` if absent.
    pub fn remove(&self, param: &Param, notify: bool) -> bool {
        let removed = self.take(param.path());
        if removed && notify {
            self.schema_change.emit(&());
        }
        removed
    }

    /// Add several params, notifying at most once. Returns how many were added.
    pub fn add_all(&self, params: Vec<Arc<Param>>, notify: bool) -> usize {
        let added = params.into_iter().filter(|p| self.insert(p.clone())).count();
        if added > 0 && notify {
            self.schema_change.emit(&());
        }
        added
    }

    /// Remove several params, notifying at most once. Returns how many were removed.
    pub fn remove_all(&self, params: &[Arc<Param>], notify: bool) -> usize {
        let removed = params.iter().filter(|p| self.take(p.path())).count();
        if removed > 0 && notify {
            self.schema_change.emit(&());
        }
        removed
    }

    pub fn get(&self, path: &str) -> Option<Arc<Param>> {
        self.params.read().iter().find(|p| p.path() == path).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.params.read().iter().any(|p| p.path() == path)
    }

    /// Snapshot of the members in display order.
    pub fn params(&self) -> Vec<Arc<Param>> {
        self.params.read().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.params.read().iter().map(|p| p.path().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.params.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.read().is_empty()
    }

    /// path → value for every stateful param. Triggers are always left out.
    pub fn get_values(&self, options: GetValuesOptions) -> BTreeMap<String, ParamValue> {
        self.params
            .read()
            .iter()
            .filter(|p| !p.ty().is_trigger())
            .filter(|p| !(options.skip_images && p.ty() == ParamType::Image))
            .map(|p| (p.path().to_string(), p.get_value()))
            .collect()
    }

    pub fn value_change(&self) -> &Signal<ValueChange> {
        &self.value_change
    }

    pub fn schema_change(&self) -> &Signal<()> {
        &self.schema_change
    }

    fn insert(&self, param: Arc<Param>) -> bool {
        {
            let mut params = self.params.write();
            if params.iter().any(|p| p.path() == param.path()) {
                warn!("Param {} already present, ignoring add", param.path());
                return false;
            }
            params.push(param.clone());
        }

        let forward = self.value_change.clone();
        let path = param.path().to_string();
        let subscription = param.on_change(move |value| {
            forward.emit(&ValueChange {
                path: path.clone(),
                value: value.clone(),
            });
        });
        self.forwarders
            .lock()
            .insert(param.path().to_string(), subscription);
        true
    }

    fn take(&self, path: &str) -> bool {
        let removed = {
            let mut params = self.params.write();
            let before = params.len();
            params.retain(|p| p.path() != path);
            params.len() != before
        };
        if removed {
            // Dropping the token unwires the forwarder
            let subscription = self.forwarders.lock().remove(path);
            drop(subscription);
        }
        removed
    }
}

impl std::fmt::Debug for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Params")
            .field("paths", &self.paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::ParamOpts;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn param(path: &str, ty: ParamType, value: serde_json::Value) -> Arc<Param> {
        Arc::new(Param::new(path, ty, Some(value), ParamOpts::default()))
    }

    fn counter(signal: &Signal<()>) -> (Arc<AtomicUsize>, Subscription) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = signal.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, sub)
    }

    #[test]
    fn forwards_member_changes() {
        let params = Params::new();
        let a = param("/a", ParamType::Int, json!(1));
        params.add(a.clone(), true);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = params.value_change().subscribe(move |c| s.lock().push(c.clone()));

        a.set(2);
        assert_eq!(
            *seen.lock(),
            vec![ValueChange {
                path: "/a".into(),
                value: ParamValue::Int(2)
            }]
        );
    }

    #[test]
    fn removed_params_stop_forwarding() {
        let params = Params::new();
        let a = param("/a", ParamType::Int, json!(1));
        params.add(a.clone(), false);

        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let _sub = params.value_change().subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert!(params.remove(&a, false));
        a.set(5);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(params.get("/a").is_none());
    }

    #[test]
    fn batch_operations_notify_once() {
        let params = Params::new();
        let (hits, _sub) = counter(params.schema_change());

        let batch = vec![
            param("/a", ParamType::Int, json!(1)),
            param("/b", ParamType::Int, json!(2)),
            param("/c", ParamType::Int, json!(3)),
        ];
        assert_eq!(params.add_all(batch.clone(), true), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert_eq!(params.remove_all(&batch[..2], true), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(params.paths(), vec!["/c".to_string()]);
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let params = Params::new();
        let first = param("/a", ParamType::Int, json!(1));
        assert!(params.add(first.clone(), false));
        assert!(!params.add(param("/a", ParamType::Int, json!(9)), false));
        assert_eq!(params.len(), 1);
        assert!(Arc::ptr_eq(&params.get("/a").unwrap(), &first));
    }

    #[test]
    fn get_values_skips_triggers_and_optionally_images() {
        let params = Params::new();
        params.add_all(
            vec![
                param("/gain", ParamType::Float, json!(0.5)),
                param("/fire", ParamType::Void, json!(0)),
                param("/img", ParamType::Image, json!("aGVsbG8=")),
                param("/name", ParamType::String, json!("osc")),
            ],
            false,
        );

        let all = params.get_values(GetValuesOptions::default());
        assert_eq!(
            all.keys().cloned().collect::<Vec<_>>(),
            vec!["/gain", "/img", "/name"]
        );

        let no_images = params.get_values(GetValuesOptions { skip_images: true });
        assert_eq!(
            no_images.keys().cloned().collect::<Vec<_>>(),
            vec!["/gain", "/name"]
        );
    }

    #[test]
    fn insertion_order_is_display_order() {
        let params = Params::new();
        for path in ["/z", "/a", "/m"] {
            params.add(param(path, ParamType::String, json!("")), false);
        }
        assert_eq!(params.paths(), vec!["/z", "/a", "/m"]);
    }
}
