//! Bootstrap data lookup and the guest metadata handed to VMs

use crate::error::{ProvisionError, Result};
use crate::meta::{ObjectKey, ObjectMeta};
use crate::resources::{ApiEndpoint, ConfigMap, Machine, Secret};
use crate::store::Client;
use tera::{Context, Tera};
use vmflow_clone::extra_config::{
    METADATA_ENCODING_KEY, METADATA_KEY, USERDATA_ENCODING_KEY, USERDATA_KEY, encode_once,
};
use vmflow_clone::{BootstrapData, BootstrapFormat};

const METADATA_TEMPLATE: &str = r#"instance-id: "{{ hostname }}"
local-hostname: "{{ hostname }}"
{%- if control_plane_endpoint %}
control-plane-endpoint: "{{ control_plane_endpoint }}"
{%- endif %}
"#;

/// Name of the config object carrying a machine's bootstrap payload
pub fn config_map_name(machine_name: &str) -> String {
    format!("{}-bootstrap", machine_name)
}

/// Bootstrap payload of `machine`, or `None` while the bootstrap provider
/// has not produced it yet
pub async fn bootstrap_data(client: &Client, machine: &Machine) -> Result<Option<BootstrapData>> {
    let Some(secret_name) = machine.spec.bootstrap.data_secret_name.as_deref() else {
        return Ok(None);
    };
    let key = ObjectKey::new(&machine.metadata.namespace, secret_name);
    let secret: Secret = client.get(&key).await?;

    let value = secret
        .data
        .get("value")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProvisionError::InvalidBootstrapData {
            secret: key.clone(),
            reason: "missing value".to_string(),
        })?;
    let format = match secret.data.get("format").map(String::as_str) {
        None | Some("") | Some("cloud-config") => BootstrapFormat::CloudConfig,
        Some("ignition") => BootstrapFormat::Ignition,
        Some(other) => {
            return Err(ProvisionError::InvalidBootstrapData {
                secret: key,
                reason: format!("unsupported format {:?}", other),
            });
        }
    };
    Ok(Some(BootstrapData {
        value: value.clone().into_bytes(),
        format,
    }))
}

/// Render the guest metadata document
///
/// The control plane endpoint is only set for control plane machines.
pub fn guest_metadata(machine: &Machine, endpoint: Option<&ApiEndpoint>) -> Result<String> {
    let mut context = Context::new();
    context.insert("hostname", &machine.metadata.name);
    let endpoint = endpoint
        .filter(|_| machine.is_control_plane())
        .map(ToString::to_string)
        .unwrap_or_default();
    context.insert("control_plane_endpoint", &endpoint);
    Ok(Tera::one_off(METADATA_TEMPLATE, &context, false)?)
}

/// Desired bootstrap config object for `machine`
pub fn bootstrap_config_map(
    namespace: &str,
    machine_name: &str,
    data: &BootstrapData,
    metadata: &str,
) -> ConfigMap {
    let mut config_map = ConfigMap {
        metadata: ObjectMeta::new(namespace, config_map_name(machine_name)),
        ..Default::default()
    };
    fill_bootstrap_config_map(&mut config_map, data, metadata);
    config_map
}

pub(crate) fn fill_bootstrap_config_map(config_map: &mut ConfigMap, data: &BootstrapData, metadata: &str) {
    config_map.data = [
        (USERDATA_KEY, encode_once(&data.value)),
        (USERDATA_ENCODING_KEY, "base64".to_string()),
        (METADATA_KEY, encode_once(metadata.as_bytes())),
        (METADATA_ENCODING_KEY, "base64".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
}
