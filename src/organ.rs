//! Stimulus/response service surface for raw_bridge
//!
//! Exposes the decode bridge to orchestrators that speak JSON stimuli.
//! Results are written to files named by the caller; the response carries
//! dimensions, sizes and, on failure, the typed error kind.
//!
//! ## Available Operations
//!
//! 1. `raw.thumbnail` - Extract the embedded JPEG thumbnail
//! 2. `raw.rgb` - Full decode to the 8-bit RGB result layout (or PNG)
//! 3. `raw.probe` - Sensor dimensions without decoding
//! 4. `raw.version` - LibRaw version
//! 5. `bridge.capabilities` - Capability card query
//!
//! ## Example
//!
//! ```rust,no_run
//! use raw_bridge::organ::{BridgeOrgan, Organ, Stimulus};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let organ = BridgeOrgan::new();
//! let response = organ.stimulate(Stimulus {
//!     op: "raw.thumbnail".to_string(),
//!     input: json!({"input_path": "photo.CR2", "output_path": "/tmp/thumb.jpg"}),
//!     context: HashMap::new(),
//! }).await?;
//! println!("ok={} output={}", response.ok, response.output);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{LibRaw, RawBackend};
use crate::bridge::DecodeBridge;
use crate::convert;
use crate::error::DecodeError;
use crate::frame::RgbFrame;
use crate::metrics::Metrics;
use crate::source::Source;
use crate::validation::validate_input;

/// Stimulus - input to organ operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stimulus {
    pub op: String,
    pub input: Value,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

/// Response - output from organ operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    pub output: Value,
    pub latency_ms: u64,
    pub cost: Option<f64>,
}

#[async_trait]
pub trait Organ: Send + Sync {
    async fn stimulate(&self, stimulus: Stimulus) -> Result<Response, OrganError>;
    fn describe(&self) -> OrganCard;
}

/// Organ-level errors
#[derive(Debug, Error)]
pub enum OrganError {
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing error: {0}")]
    ProcessingError(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrganError {
    /// Name reported in the `error` field of a failed response
    pub fn kind_name(&self) -> &'static str {
        match self {
            OrganError::UnsupportedOperation(_) => "UnsupportedOperation",
            OrganError::InvalidInput(_) => "InvalidInput",
            OrganError::ProcessingError(_) => "ProcessingError",
            OrganError::Decode(e) => e.kind().as_str(),
            OrganError::SerializationError(_) => "SerializationError",
            OrganError::Io(_) => "Io",
        }
    }
}

/// Organ capability card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganCard {
    pub name: String,
    pub version: String,
    pub description: String,
    pub division: String,
    pub subsystem: String,
    pub tags: Vec<String>,
    pub execution_modes: Vec<String>,
    pub functions: Vec<FunctionCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_version: Option<String>,
}

/// Function capability card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCard {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
    pub idempotent: bool,
    pub side_effects: Vec<String>,
    pub input_schema: Option<Value>,
    pub output_schema: Value,
}

const OPERATIONS: &[&str] = &[
    "raw.thumbnail",
    "raw.rgb",
    "raw.probe",
    "raw.version",
    "bridge.capabilities",
    "metrics",
];

/// RAW decode organ
pub struct BridgeOrgan<B = LibRaw> {
    bridge: DecodeBridge<B>,
    metrics: Arc<Metrics>,
}

impl BridgeOrgan<LibRaw> {
    pub fn new() -> Self {
        Self::with_bridge(DecodeBridge::new())
    }
}

impl Default for BridgeOrgan<LibRaw> {
    fn default() -> Self {
        Self::new()
    }
}

fn path_field(input: &Value, key: &str) -> Result<PathBuf, OrganError> {
    input[key]
        .as_str()
        .map(PathBuf::from)
        .ok_or_else(|| OrganError::InvalidInput(format!("Missing {}", key)))
}

impl<B> BridgeOrgan<B>
where
    B: RawBackend + Clone + Send + Sync + 'static,
{
    pub fn with_bridge(bridge: DecodeBridge<B>) -> Self {
        Self {
            bridge,
            metrics: Metrics::new(),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn bridge(&self) -> &DecodeBridge<B> {
        &self.bridge
    }

    /// Run CPU-bound decode work off the async runtime
    async fn blocking<T, F>(&self, f: F) -> Result<T, OrganError>
    where
        T: Send + 'static,
        F: FnOnce(DecodeBridge<B>) -> Result<T, OrganError> + Send + 'static,
    {
        let bridge = self.bridge.clone();
        tokio::task::spawn_blocking(move || f(bridge))
            .await
            .map_err(|e| OrganError::ProcessingError(format!("decode task failed: {}", e)))?
    }

    /// Handle raw.thumbnail operation
    async fn handle_thumbnail(&self, input: Value) -> Result<Value, OrganError> {
        let input_path = path_field(&input, "input_path")?;
        let output_path = path_field(&input, "output_path")?;

        let out = output_path.clone();
        let size = self
            .blocking(move |bridge| {
                let jpeg = bridge.decode_thumbnail(Source::Path(&input_path))?;
                std::fs::write(&out, &jpeg)?;
                Ok(jpeg.len())
            })
            .await?;

        Ok(json!({
            "output_path": output_path.to_string_lossy(),
            "format": "jpeg",
            "size_bytes": size,
        }))
    }

    /// Handle raw.rgb operation
    async fn handle_rgb(&self, input: Value) -> Result<Value, OrganError> {
        let input_path = path_field(&input, "input_path")?;
        let output_path = path_field(&input, "output_path")?;
        let png = input["png"].as_bool().unwrap_or(false);

        let out = output_path.clone();
        let (width, height, size) = self
            .blocking(move |bridge| {
                let rgb = bridge.decode_to_rgb(Source::Path(&input_path))?;
                let frame = RgbFrame::parse_with_limits(&rgb, bridge.limits())?;
                let (width, height) = (frame.width, frame.height);
                if png {
                    convert::frame_to_image(&rgb)?
                        .save_with_format(&out, image::ImageFormat::Png)
                        .map_err(|e| OrganError::ProcessingError(format!("Failed to save PNG: {}", e)))?;
                } else {
                    std::fs::write(&out, &rgb)?;
                }
                Ok((width, height, rgb.len()))
            })
            .await?;

        Ok(json!({
            "output_path": output_path.to_string_lossy(),
            "format": if png { "png" } else { "rgb8" },
            "width": width,
            "height": height,
            "size_bytes": size,
        }))
    }

    /// Handle raw.probe operation
    async fn handle_probe(&self, input: Value) -> Result<Value, OrganError> {
        let input_path = path_field(&input, "input_path")?;

        let (width, height) = self
            .blocking(move |bridge| {
                let data = std::fs::read(&input_path)?;
                Ok(bridge.probe(&data)?)
            })
            .await?;

        Ok(json!({ "width": width, "height": height }))
    }

    fn handle_capabilities(&self) -> Result<Value, OrganError> {
        let card = self.describe();
        serde_json::to_value(&card).map_err(OrganError::SerializationError)
    }

    async fn dispatch(&self, stimulus: Stimulus) -> Result<Value, OrganError> {
        let card = self.describe();
        match card.functions.iter().find(|f| f.name == stimulus.op) {
            Some(func) => {
                if let Some(schema) = &func.input_schema {
                    validate_input(&stimulus.input, schema)?;
                }
            }
            None if stimulus.op == "metrics" => {}
            None => return Err(OrganError::UnsupportedOperation(stimulus.op)),
        }

        match stimulus.op.as_str() {
            "raw.thumbnail" => self.handle_thumbnail(stimulus.input).await,
            "raw.rgb" => self.handle_rgb(stimulus.input).await,
            "raw.probe" => self.handle_probe(stimulus.input).await,
            "raw.version" => Ok(json!({ "version": self.bridge.version() })),
            "bridge.capabilities" => self.handle_capabilities(),
            "metrics" => Ok(json!(self.metrics.snapshot())),
            other => Err(OrganError::UnsupportedOperation(other.to_string())),
        }
    }
}

#[async_trait]
impl<B> Organ for BridgeOrgan<B>
where
    B: RawBackend + Clone + Send + Sync + 'static,
{
    async fn stimulate(&self, stimulus: Stimulus) -> Result<Response, OrganError> {
        let start = Instant::now();
        let op = stimulus.op.clone();

        let result = self.dispatch(stimulus).await;
        let latency = start.elapsed().as_millis() as u64;
        self.metrics.record_request(&op, result.is_ok(), latency);

        match result {
            Ok(output) => {
                debug!("{} succeeded in {}ms", op, latency);
                Ok(Response {
                    ok: true,
                    output,
                    latency_ms: latency,
                    cost: None,
                })
            }
            Err(e) => {
                if let OrganError::Decode(d) = &e {
                    self.metrics.record_failure(d.kind());
                }
                warn!("{} failed: {}", op, e);

                let mut output = json!({
                    "error": e.kind_name(),
                    "message": e.to_string(),
                    "op": op,
                });
                if let OrganError::UnsupportedOperation(_) = e {
                    output["available_operations"] = json!(OPERATIONS);
                }
                Ok(Response {
                    ok: false,
                    output,
                    latency_ms: latency,
                    cost: None,
                })
            }
        }
    }

    fn describe(&self) -> OrganCard {
        let path_prop = |desc: &str| json!({ "type": "string", "minLength": 1, "description": desc });

        OrganCard {
            name: "raw_bridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "LibRaw decode bridge: embedded JPEG thumbnails and 8-bit RGB decodes of RAW camera files".to_string(),
            division: "media".to_string(),
            subsystem: "raw-decode".to_string(),
            tags: vec![
                "raw".to_string(),
                "libraw".to_string(),
                "thumbnail".to_string(),
                "rgb".to_string(),
                "decode".to_string(),
            ],
            execution_modes: vec![
                "embedded".to_string(),
                "server".to_string(),
            ],
            library_version: self.bridge.backend().version(),
            functions: vec![
                FunctionCard {
                    name: "raw.thumbnail".to_string(),
                    description: "Extract the embedded JPEG thumbnail from a RAW file, byte for byte".to_string(),
                    tags: vec!["raw".to_string(), "thumbnail".to_string(), "jpeg".to_string()],
                    examples: vec![
                        "Extract the camera preview from a CR2 for culling".to_string(),
                        "Fetch a JPEG thumbnail without demosaicing".to_string(),
                    ],
                    idempotent: true,
                    side_effects: vec!["writes jpeg file".to_string()],
                    input_schema: Some(json!({
                        "type": "object",
                        "properties": {
                            "input_path": path_prop("Path to RAW file"),
                            "output_path": path_prop("Path to write the JPEG thumbnail")
                        },
                        "required": ["input_path", "output_path"]
                    })),
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "output_path": { "type": "string" },
                            "format": { "type": "string" },
                            "size_bytes": { "type": "integer" }
                        }
                    }),
                },
                FunctionCard {
                    name: "raw.rgb".to_string(),
                    description: "Decode a RAW file to 8-bit sRGB: width/height header followed by interleaved RGB, or PNG".to_string(),
                    tags: vec!["raw".to_string(), "decode".to_string(), "rgb".to_string(), "demosaic".to_string()],
                    examples: vec![
                        "Decode a NEF to RGB for display".to_string(),
                        "Convert a DNG to PNG".to_string(),
                    ],
                    idempotent: true,
                    side_effects: vec!["writes image file".to_string(), "cpu intensive".to_string()],
                    input_schema: Some(json!({
                        "type": "object",
                        "properties": {
                            "input_path": path_prop("Path to RAW file"),
                            "output_path": path_prop("Path to write the result"),
                            "png": { "type": "boolean", "description": "Write PNG instead of the raw RGB layout (default: false)" }
                        },
                        "required": ["input_path", "output_path"]
                    })),
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "output_path": { "type": "string" },
                            "format": { "type": "string" },
                            "width": { "type": "integer" },
                            "height": { "type": "integer" },
                            "size_bytes": { "type": "integer" }
                        }
                    }),
                },
                FunctionCard {
                    name: "raw.probe".to_string(),
                    description: "Report sensor dimensions of a RAW file without decoding it".to_string(),
                    tags: vec!["raw".to_string(), "metadata".to_string()],
                    examples: vec!["Check whether a file is a RAW LibRaw can open".to_string()],
                    idempotent: true,
                    side_effects: vec![],
                    input_schema: Some(json!({
                        "type": "object",
                        "properties": {
                            "input_path": path_prop("Path to RAW file")
                        },
                        "required": ["input_path"]
                    })),
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "width": { "type": "integer" },
                            "height": { "type": "integer" }
                        }
                    }),
                },
                FunctionCard {
                    name: "raw.version".to_string(),
                    description: "Return the LibRaw version string".to_string(),
                    tags: vec!["libraw".to_string(), "version".to_string()],
                    examples: vec!["Report the decoding library version".to_string()],
                    idempotent: true,
                    side_effects: vec![],
                    input_schema: None,
                    output_schema: json!({
                        "type": "object",
                        "properties": { "version": { "type": "string" } }
                    }),
                },
                FunctionCard {
                    name: "bridge.capabilities".to_string(),
                    description: "Return organ capability card with all available functions and metadata".to_string(),
                    tags: vec!["metadata".to_string(), "discovery".to_string()],
                    examples: vec!["Discover available RAW decode operations".to_string()],
                    idempotent: true,
                    side_effects: vec![],
                    input_schema: None,
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "version": { "type": "string" },
                            "functions": { "type": "array" }
                        }
                    }),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockBackend, MockRaw};

    fn stimulus(op: &str, input: Value) -> Stimulus {
        Stimulus {
            op: op.to_string(),
            input,
            context: HashMap::new(),
        }
    }

    fn mock_organ() -> BridgeOrgan<MockBackend> {
        BridgeOrgan::with_bridge(DecodeBridge::with_backend(MockBackend::new(MockRaw::new(
            4, 2, 128,
        ))))
    }

    #[tokio::test]
    async fn test_organ_capabilities() {
        let organ = mock_organ();
        let response = organ
            .stimulate(stimulus("bridge.capabilities", json!({})))
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.output["name"], "raw_bridge");
        assert_eq!(response.output["library_version"], "0.0.0-mock");
    }

    #[tokio::test]
    async fn test_unsupported_operation() {
        let organ = mock_organ();
        let response = organ
            .stimulate(stimulus("invalid.operation", json!({})))
            .await
            .unwrap();
        assert!(!response.ok);
        assert_eq!(response.output["error"], "UnsupportedOperation");
        assert!(response.output["available_operations"].is_array());
    }

    #[tokio::test]
    async fn test_version_and_metrics() {
        let organ = mock_organ();
        let response = organ.stimulate(stimulus("raw.version", json!({}))).await.unwrap();
        assert_eq!(response.output["version"], "0.0.0-mock");

        let response = organ.stimulate(stimulus("metrics", json!({}))).await.unwrap();
        assert!(response.ok);
        assert_eq!(response.output["operations"]["version"], 1);
    }

    #[tokio::test]
    async fn test_write_failure_reports_io() {
        let organ = mock_organ();
        let response = organ
            .stimulate(stimulus(
                "raw.rgb",
                json!({ "input_path": "/a.CR2", "output_path": "/nonexistent/dir/out.rgb" }),
            ))
            .await
            .unwrap();
        // Decode succeeds, writing the result fails
        assert!(!response.ok);
        assert_eq!(response.output["error"], "Io");
    }

    #[test]
    fn test_organ_card() {
        let organ = mock_organ();
        let card = organ.describe();

        assert_eq!(card.name, "raw_bridge");
        assert_eq!(card.functions.len(), 5);
        for op in ["raw.thumbnail", "raw.rgb", "raw.probe", "raw.version"] {
            assert!(card.functions.iter().any(|f| f.name == op), "missing {}", op);
        }
    }
}
