//! Extra-config payload (guestinfo keys and custom VMX keys)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;
use vmflow_cloud::OptionValue;

pub const USERDATA_KEY: &str = "guestinfo.userdata";
pub const USERDATA_ENCODING_KEY: &str = "guestinfo.userdata.encoding";
pub const METADATA_KEY: &str = "guestinfo.metadata";
pub const METADATA_ENCODING_KEY: &str = "guestinfo.metadata.encoding";
pub const IGNITION_KEY: &str = "guestinfo.ignition.config.data";
pub const IGNITION_ENCODING_KEY: &str = "guestinfo.ignition.config.data.encoding";

/// Ordered set of extra-config options; setting a key twice keeps the last value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraConfig {
    values: Vec<OptionValue>,
}

impl ExtraConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.values.iter_mut().find(|o| o.key == key) {
            Some(existing) => existing.value = value,
            None => self.values.push(OptionValue::new(key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set_cloud_init_user_data(&mut self, data: &[u8]) {
        self.set_encoded(USERDATA_KEY, USERDATA_ENCODING_KEY, data);
    }

    pub fn set_cloud_init_metadata(&mut self, data: &[u8]) {
        self.set_encoded(METADATA_KEY, METADATA_ENCODING_KEY, data);
    }

    pub fn set_ignition_user_data(&mut self, data: &[u8]) {
        self.set_encoded(IGNITION_KEY, IGNITION_ENCODING_KEY, data);
    }

    pub fn set_custom_vmx_keys(&mut self, keys: &BTreeMap<String, String>) {
        for (k, v) in keys {
            self.set(k.clone(), v.clone());
        }
    }

    fn set_encoded(&mut self, key: &str, encoding_key: &str, data: &[u8]) {
        self.set(key, encode_once(data));
        self.set(encoding_key, "base64");
    }

    pub fn into_values(self) -> Vec<OptionValue> {
        self.values
    }
}

/// Base64-encode `data` exactly once, peeling off any existing layers first
pub fn encode_once(data: &[u8]) -> String {
    let mut raw = data.to_vec();
    while let Ok(decoded) = STANDARD.decode(&raw) {
        if decoded.is_empty() {
            break;
        }
        raw = decoded;
    }
    STANDARD.encode(raw)
}
