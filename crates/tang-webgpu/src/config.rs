//! Provider configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::handle::OpaqueHandle;

/// Tensor layout the provider prefers for convolution-like operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataLayout {
    #[default]
    Nhwc,
    Nchw,
}

impl FromStr for DataLayout {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "NHWC" => Ok(Self::Nhwc),
            "NCHW" => Ok(Self::Nchw),
            _ => Err(()),
        }
    }
}

/// How a class of GPU buffers is recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BufferCacheMode {
    /// Release buffers immediately.
    Disabled,
    /// Release buffers at the end of each run.
    LazyRelease,
    /// Reuse buffers of exactly the requested size.
    Simple,
    /// Reuse buffers from size buckets.
    Bucket,
}

impl FromStr for BufferCacheMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "lazyRelease" => Ok(Self::LazyRelease),
            "simple" => Ok(Self::Simple),
            "bucket" => Ok(Self::Bucket),
            _ => Err(()),
        }
    }
}

impl fmt::Display for BufferCacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disabled => "disabled",
            Self::LazyRelease => "lazyRelease",
            Self::Simple => "simple",
            Self::Bucket => "bucket",
        })
    }
}

/// Options for creating a GPU context and the provider that uses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderOptions {
    pub preferred_layout: DataLayout,
    pub enable_graph_capture: bool,
    pub storage_buffer_cache_mode: BufferCacheMode,
    pub uniform_buffer_cache_mode: BufferCacheMode,
    pub query_resolve_buffer_cache_mode: BufferCacheMode,
    pub default_buffer_cache_mode: BufferCacheMode,
    /// Which context in a [`ContextRegistry`](crate::context::ContextRegistry) to use.
    pub context_id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webgpu_instance: Option<OpaqueHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webgpu_adapter: Option<OpaqueHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webgpu_device: Option<OpaqueHandle>,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            preferred_layout: DataLayout::Nhwc,
            enable_graph_capture: false,
            storage_buffer_cache_mode: BufferCacheMode::Bucket,
            uniform_buffer_cache_mode: BufferCacheMode::LazyRelease,
            query_resolve_buffer_cache_mode: BufferCacheMode::Disabled,
            default_buffer_cache_mode: BufferCacheMode::Disabled,
            context_id: 0,
            webgpu_instance: None,
            webgpu_adapter: None,
            webgpu_device: None,
        }
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn handle(key: &str, value: &str) -> Result<OpaqueHandle, ConfigError> {
    value.parse().map_err(|source| ConfigError::Handle {
        key: key.to_string(),
        source,
    })
}

impl ProviderOptions {
    /// Parse options from string key/value pairs, starting from the defaults.
    ///
    /// Keys this provider does not know are ignored, since session
    /// configuration is shared with other components.
    pub fn from_entries<I, K, V>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in entries {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "preferredLayout" => {
                    options.preferred_layout = value.parse().map_err(|_| invalid(key, value))?;
                }
                "enableGraphCapture" => {
                    options.enable_graph_capture = matches!(value, "true" | "1");
                }
                "storageBufferCacheMode" => {
                    options.storage_buffer_cache_mode =
                        value.parse().map_err(|_| invalid(key, value))?;
                }
                "uniformBufferCacheMode" => {
                    options.uniform_buffer_cache_mode =
                        value.parse().map_err(|_| invalid(key, value))?;
                }
                "queryResolveBufferCacheMode" => {
                    options.query_resolve_buffer_cache_mode =
                        value.parse().map_err(|_| invalid(key, value))?;
                }
                "defaultBufferCacheMode" => {
                    options.default_buffer_cache_mode =
                        value.parse().map_err(|_| invalid(key, value))?;
                }
                "contextId" => {
                    options.context_id = value.trim().parse().map_err(|_| invalid(key, value))?;
                }
                "webgpuInstance" => options.webgpu_instance = Some(handle(key, value)?),
                "webgpuAdapter" => options.webgpu_adapter = Some(handle(key, value)?),
                "webgpuDevice" => options.webgpu_device = Some(handle(key, value)?),
                _ => continue,
            }
            debug!("provider option {key} = {value:?}");
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandleParseError;

    #[test]
    fn defaults() {
        let options = ProviderOptions::default();
        assert_eq!(options.preferred_layout, DataLayout::Nhwc);
        assert!(!options.enable_graph_capture);
        assert_eq!(options.storage_buffer_cache_mode, BufferCacheMode::Bucket);
        assert_eq!(options.uniform_buffer_cache_mode, BufferCacheMode::LazyRelease);
        assert_eq!(options.query_resolve_buffer_cache_mode, BufferCacheMode::Disabled);
        assert_eq!(options.default_buffer_cache_mode, BufferCacheMode::Disabled);
        assert_eq!(options.context_id, 0);
        assert_eq!(
            ProviderOptions::from_entries(Vec::<(&str, &str)>::new()).unwrap(),
            options
        );
    }

    #[test]
    fn parse_entries() {
        let options = ProviderOptions::from_entries([
            ("preferredLayout", "NCHW"),
            ("enableGraphCapture", "1"),
            ("storageBufferCacheMode", "simple"),
            ("uniformBufferCacheMode", "disabled"),
            ("queryResolveBufferCacheMode", "bucket"),
            ("defaultBufferCacheMode", "lazyRelease"),
            ("contextId", "3"),
            ("webgpuDevice", "123456"),
            ("session.unrelated", "whatever"),
        ])
        .unwrap();
        assert_eq!(options.preferred_layout, DataLayout::Nchw);
        assert!(options.enable_graph_capture);
        assert_eq!(options.storage_buffer_cache_mode, BufferCacheMode::Simple);
        assert_eq!(options.uniform_buffer_cache_mode, BufferCacheMode::Disabled);
        assert_eq!(options.query_resolve_buffer_cache_mode, BufferCacheMode::Bucket);
        assert_eq!(options.default_buffer_cache_mode, BufferCacheMode::LazyRelease);
        assert_eq!(options.context_id, 3);
        assert_eq!(options.webgpu_device.map(OpaqueHandle::get), Some(123456));
        assert!(options.webgpu_instance.is_none());
    }

    #[test]
    fn graph_capture_only_on_true_or_one() {
        for (value, expected) in [("true", true), ("1", true), ("false", false), ("yes", false)] {
            let options = ProviderOptions::from_entries([("enableGraphCapture", value)]).unwrap();
            assert_eq!(options.enable_graph_capture, expected, "{value}");
        }
    }

    #[test]
    fn invalid_values() {
        assert_eq!(
            ProviderOptions::from_entries([("storageBufferCacheMode", "lru")]),
            Err(ConfigError::InvalidValue {
                key: "storageBufferCacheMode".into(),
                value: "lru".into(),
            })
        );
        assert!(ProviderOptions::from_entries([("preferredLayout", "NWHC")]).is_err());
        assert!(ProviderOptions::from_entries([("contextId", "70000")]).is_err());
        assert_eq!(
            ProviderOptions::from_entries([("webgpuAdapter", "0")]),
            Err(ConfigError::Handle {
                key: "webgpuAdapter".into(),
                source: HandleParseError::Null,
            })
        );
    }

    #[test]
    fn serde_round_trip() {
        let json = r#"{
            "preferredLayout": "NCHW",
            "uniformBufferCacheMode": "simple",
            "contextId": 2,
            "webgpuInstance": 99
        }"#;
        let options: ProviderOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.preferred_layout, DataLayout::Nchw);
        assert_eq!(options.uniform_buffer_cache_mode, BufferCacheMode::Simple);
        assert_eq!(options.storage_buffer_cache_mode, BufferCacheMode::Bucket);
        assert_eq!(options.context_id, 2);
        assert_eq!(options.webgpu_instance.map(OpaqueHandle::get), Some(99));

        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(value["defaultBufferCacheMode"], "disabled");
        assert_eq!(value["queryResolveBufferCacheMode"], "disabled");
        assert!(value.get("webgpuDevice").is_none());
    }
}
