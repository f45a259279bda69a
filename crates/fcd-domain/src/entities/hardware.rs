//! Hardware profile and execution-backend records
//!
//! # Overview
//! The capability probe fills a `HardwareProfile`; the backend selector
//! turns it into an ordered `(ExecutionBackend, BackendConfig)` list for a
//! model load. Backend unavailability is not an error; the list always
//! ends with `Cpu`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GPU vendor family detected on the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GpuKind {
    /// No usable GPU detected
    #[default]
    None,
    /// NVIDIA discrete or mobile GPU
    Nvidia,
    /// Apple silicon integrated GPU
    Apple,
    /// AMD GPU
    Amd,
    /// Intel integrated or discrete GPU
    Intel,
}

/// Acceleration APIs the detected GPU supports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ApiSupport {
    /// Metal is available (Apple platforms)
    pub metal: bool,
    /// Direct3D 12 compute is available (Windows)
    pub d3d12: bool,
    /// Installed CUDA driver version, when present
    pub cuda_version: Option<String>,
}

/// Detected GPU description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GpuInfo {
    /// Vendor family
    pub kind: GpuKind,
    /// Detected VRAM in whole gigabytes, when known
    pub vram_gb: Option<u32>,
    /// API support flags
    pub api_support: ApiSupport,
}

/// Hardware profile produced by the capability probe.
///
/// A partial, CPU-only profile is valid output: probing must never block
/// folder lifecycle start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HardwareProfile {
    /// Operating system family (`linux`, `macos`, `windows`)
    pub os: String,
    /// Logical CPU core count
    pub cpu_cores: usize,
    /// CPU feature flags relevant to inference (avx2, neon, ...)
    pub cpu_features: Vec<String>,
    /// Total RAM in whole gigabytes
    pub ram_gb: u32,
    /// GPU description
    pub gpu: GpuInfo,
}

impl HardwareProfile {
    /// Conservative profile used when probing fails or has not run yet
    #[must_use]
    pub fn cpu_only(os: &str, cpu_cores: usize) -> Self {
        Self {
            os: os.to_owned(),
            cpu_cores,
            cpu_features: Vec::new(),
            ram_gb: 0,
            gpu: GpuInfo::default(),
        }
    }
}

/// Hardware-specific inference backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackend {
    /// Plain CPU inference; always available, always last in the list
    Cpu,
    /// NVIDIA CUDA-accelerated inference
    NvidiaCuda,
    /// Apple CoreML / Metal inference
    AppleCoreMl,
    /// Windows DirectML (Direct3D 12 compute) inference
    DirectMlCompute,
}

impl std::fmt::Display for ExecutionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cpu => "cpu",
            Self::NvidiaCuda => "nvidia-cuda",
            Self::AppleCoreMl => "apple-coreml",
            Self::DirectMlCompute => "directml-compute",
        };
        f.write_str(name)
    }
}

/// Per-backend session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BackendConfig {
    /// Device ordinal for multi-GPU hosts
    pub device_id: u32,
    /// VRAM budget in megabytes (80% of detected VRAM by default); `None`
    /// for CPU
    pub vram_budget_mb: Option<u64>,
    /// Intra-op thread count for the CPU fallback
    pub intra_threads: usize,
}

impl BackendConfig {
    /// Config for the CPU backend with the given thread count
    #[must_use]
    pub fn cpu(intra_threads: usize) -> Self {
        Self {
            device_id: 0,
            vram_budget_mb: None,
            intra_threads,
        }
    }
}
