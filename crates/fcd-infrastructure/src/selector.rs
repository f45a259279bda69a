//! Execution-provider selection
//!
//! # Overview
//! Turns a hardware profile plus a model descriptor into the ordered
//! backend list a model load walks. Platform priorities:
//!
//! - Windows: CUDA (driver present) > DirectML compute (any GPU) > CPU
//! - macOS:   CoreML/Metal (Apple GPU) > CPU
//! - Linux:   CUDA (driver present) > CPU
//!
//! Unavailability is not an error; a backend that fails its lightweight
//! probe is simply absent. The list always ends with CPU.

use tracing::debug;

use fcd_domain::entities::{BackendConfig, ExecutionBackend, GpuKind, HardwareProfile};
use fcd_domain::ports::BackendSelector;
use fcd_domain::registry::ModelDescriptor;

/// Fraction of detected VRAM handed to an accelerated session
const VRAM_BUDGET_FRACTION: f64 = 0.8;

/// Platform-priority backend selector
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformBackendSelector;

impl PlatformBackendSelector {
    /// Construct the selector
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn gpu_config(profile: &HardwareProfile) -> BackendConfig {
        let vram_budget_mb = profile
            .gpu
            .vram_gb
            .map(|gb| ((f64::from(gb) * 1024.0) * VRAM_BUDGET_FRACTION) as u64);
        BackendConfig {
            device_id: 0,
            vram_budget_mb,
            intra_threads: cpu_threads(profile),
        }
    }
}

fn cpu_threads(profile: &HardwareProfile) -> usize {
    // Leave headroom for the lifecycle and store tasks
    (profile.cpu_cores.saturating_sub(1)).clamp(1, 8)
}

impl BackendSelector for PlatformBackendSelector {
    fn select(
        &self,
        profile: &HardwareProfile,
        model: &ModelDescriptor,
    ) -> Vec<(ExecutionBackend, BackendConfig)> {
        let mut backends = Vec::new();
        let has_cuda = profile.gpu.kind == GpuKind::Nvidia
            && profile.gpu.api_support.cuda_version.is_some();

        if model.prefers_gpu || profile.gpu.kind != GpuKind::None {
            match profile.os.as_str() {
                "windows" => {
                    if has_cuda {
                        backends.push((ExecutionBackend::NvidiaCuda, Self::gpu_config(profile)));
                    }
                    if profile.gpu.kind != GpuKind::None && profile.gpu.api_support.d3d12 {
                        backends
                            .push((ExecutionBackend::DirectMlCompute, Self::gpu_config(profile)));
                    }
                }
                "macos" => {
                    if profile.gpu.kind == GpuKind::Apple && profile.gpu.api_support.metal {
                        backends.push((ExecutionBackend::AppleCoreMl, Self::gpu_config(profile)));
                    }
                }
                _ => {
                    if has_cuda {
                        backends.push((ExecutionBackend::NvidiaCuda, Self::gpu_config(profile)));
                    }
                }
            }
        }

        backends.push((
            ExecutionBackend::Cpu,
            BackendConfig::cpu(cpu_threads(profile)),
        ));

        debug!(
            model = model.id,
            order = ?backends.iter().map(|(b, _)| b.to_string()).collect::<Vec<_>>(),
            "execution backends selected"
        );
        backends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcd_domain::entities::{ApiSupport, GpuInfo};
    use fcd_domain::registry;

    fn profile(os: &str, gpu: GpuInfo) -> HardwareProfile {
        HardwareProfile {
            os: os.to_owned(),
            cpu_cores: 8,
            cpu_features: vec![],
            ram_gb: 16,
            gpu,
        }
    }

    fn nvidia() -> GpuInfo {
        GpuInfo {
            kind: GpuKind::Nvidia,
            vram_gb: Some(8),
            api_support: ApiSupport {
                metal: false,
                d3d12: true,
                cuda_version: Some("12.4".to_owned()),
            },
        }
    }

    #[test]
    fn cpu_is_always_last() {
        let selector = PlatformBackendSelector::new();
        for os in ["linux", "macos", "windows"] {
            let list = selector.select(&profile(os, nvidia()), registry::default_model());
            assert_eq!(list.last().map(|(b, _)| *b), Some(ExecutionBackend::Cpu));
        }
    }

    #[test]
    fn linux_nvidia_prefers_cuda() {
        let selector = PlatformBackendSelector::new();
        let list = selector.select(&profile("linux", nvidia()), registry::default_model());
        assert_eq!(list[0].0, ExecutionBackend::NvidiaCuda);
    }

    #[test]
    fn windows_gpu_without_cuda_gets_directml() {
        let selector = PlatformBackendSelector::new();
        let gpu = GpuInfo {
            kind: GpuKind::Amd,
            vram_gb: Some(12),
            api_support: ApiSupport {
                metal: false,
                d3d12: true,
                cuda_version: None,
            },
        };
        let list = selector.select(&profile("windows", gpu), registry::default_model());
        assert_eq!(list[0].0, ExecutionBackend::DirectMlCompute);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn cpu_only_profile_selects_cpu_only() {
        let selector = PlatformBackendSelector::new();
        let list = selector.select(
            &HardwareProfile::cpu_only("linux", 4),
            registry::default_model(),
        );
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].0, ExecutionBackend::Cpu);
        assert!(list[0].1.intra_threads >= 1);
    }

    #[test]
    fn vram_budget_is_80_percent() {
        let selector = PlatformBackendSelector::new();
        let list = selector.select(&profile("linux", nvidia()), registry::default_model());
        let (_, config) = &list[0];
        assert_eq!(config.vram_budget_mb, Some((8 * 1024) * 8 / 10));
    }
}
