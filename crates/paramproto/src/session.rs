//! Saving and replaying a session's param values.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::client::Client;
use crate::params::{GetValuesOptions, Params};
use crate::registry::{ClientRegistry, RegistryError};
use crate::transport::TransportError;
use crate::value::ParamValue;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Current values of `client`, images left out.
pub fn snapshot_values(client: &dyn Client) -> BTreeMap<String, ParamValue> {
    client
        .params()
        .get_values(GetValuesOptions { skip_images: true })
}

/// Store a snapshot of `id`'s values as its restore values. Returns how
/// many values were saved.
pub fn save_session_values(registry: &ClientRegistry, id: &str) -> Result<usize, SessionError> {
    let client = registry.get_client(id)?;
    let values = snapshot_values(client.as_ref());
    let count = values.len();

    let mut settings = registry.session_settings(id)?;
    settings.restore_values = Some(values);
    registry.set_session_settings(id, Some(&settings))?;

    info!("{}: Saved {} values", id, count);
    Ok(count)
}

/// Send the stored restore values of `id` back to the remote.
///
/// Does nothing unless restoring is enabled for the session. Values for
/// paths the current schema no longer has are skipped. Returns how many
/// values were sent.
pub fn restore_session_values(registry: &ClientRegistry, id: &str) -> Result<usize, SessionError> {
    let client = registry.get_client(id)?;
    let settings = registry.session_settings(id)?;

    if settings.restore_values_enabled != Some(true) {
        debug!("{}: Value restore disabled", id);
        return Ok(0);
    }
    let Some(stored) = settings.restore_values else {
        return Ok(0);
    };

    let values = restorable_values(client.params(), stored);
    client.output().send_values(&values)?;
    info!("{}: Restored {} values", id, values.len());
    Ok(values.len())
}

/// Stored values that still have a param, with the `Nan` marker clamped to
/// the param's zero so it never goes back out on the wire.
fn restorable_values(
    params: &Params,
    stored: BTreeMap<String, ParamValue>,
) -> BTreeMap<String, ParamValue> {
    stored
        .into_iter()
        .filter_map(|(path, value)| {
            let param = params.get(&path)?;
            Some((path, value.or_zero(param.ty())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientId;
    use crate::schema::Schema;
    use crate::settings::{MemorySettingsStore, SessionSettings};
    use std::sync::Arc;

    fn synced_registry() -> (ClientRegistry, String) {
        let registry = ClientRegistry::new(Arc::new(MemorySettingsStore::new()));
        let client = registry.connect_id(&ClientId::osc("a", 1)).unwrap();
        let schema = Schema::from_json(
            r#"[{"path":"/gain","type":"f","value":0.25},
                {"path":"/img","type":"g","value":"aGk="},
                {"path":"/go","type":"v"}]"#,
        )
        .unwrap();
        schema.apply_to(client.params());
        (registry, client.id().to_string())
    }

    #[test]
    fn snapshot_skips_images_and_triggers() {
        let (registry, id) = synced_registry();
        let client = registry.get_client(&id).unwrap();
        let values = snapshot_values(client.as_ref());
        assert_eq!(values.keys().cloned().collect::<Vec<_>>(), vec!["/gain"]);
    }

    #[test]
    fn save_then_restore_respects_the_flag() {
        let (registry, id) = synced_registry();
        assert_eq!(save_session_values(&registry, &id).unwrap(), 1);

        let saved = registry.session_settings(&id).unwrap();
        assert_eq!(
            saved.restore_values.as_ref().and_then(|v| v.get("/gain")),
            Some(&ParamValue::Float(0.25))
        );

        // disabled by default
        assert_eq!(restore_session_values(&registry, &id).unwrap(), 0);

        registry
            .set_session_settings(
                &id,
                Some(&SessionSettings {
                    restore_values_enabled: Some(true),
                    ..saved
                }),
            )
            .unwrap();
        // the OSC output refuses to send
        assert!(matches!(
            restore_session_values(&registry, &id),
            Err(SessionError::Transport(_))
        ));
    }

    #[test]
    fn restored_nan_goes_out_as_zero() {
        let (registry, id) = synced_registry();
        let client = registry.get_client(&id).unwrap();
        let stored: BTreeMap<String, ParamValue> = [
            ("/gain".to_string(), ParamValue::Nan),
            ("/gone".to_string(), ParamValue::Int(4)),
        ]
        .into_iter()
        .collect();

        let values = restorable_values(client.params(), stored);
        assert_eq!(
            values.into_iter().collect::<Vec<_>>(),
            vec![("/gain".to_string(), ParamValue::Float(0.0))]
        );
    }

    #[test]
    fn unknown_session() {
        let registry = ClientRegistry::new(Arc::new(MemorySettingsStore::new()));
        assert!(matches!(
            save_session_values(&registry, "wsock-x:1"),
            Err(SessionError::Registry(RegistryError::NotFound(_)))
        ));
    }
}
