//! Hardware capability probe
//!
//! # Overview
//! Detects CPU, RAM and GPU facts once and caches the profile in-process
//! for one hour. Detection failures degrade to a CPU-only profile; a
//! missing accelerator is a selection fact, not an error, and probing
//! never blocks folder lifecycle start.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sysinfo::System;
use tracing::{debug, warn};

use fcd_domain::constants::time::PROBE_CACHE_TTL_SECS;
use fcd_domain::entities::{ApiSupport, GpuInfo, GpuKind, HardwareProfile};
use fcd_domain::ports::CapabilityProbe;

struct CachedProfile {
    taken_at: Instant,
    profile: HardwareProfile,
}

/// sysinfo-backed probe with a one-hour in-process cache
pub struct SysinfoProbe {
    cache: Mutex<Option<CachedProfile>>,
    ttl: Duration,
}

impl SysinfoProbe {
    /// Probe with the default one-hour TTL
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(PROBE_CACHE_TTL_SECS))
    }

    /// Probe with an explicit TTL (tests)
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(None),
            ttl,
        }
    }

    fn detect() -> HardwareProfile {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let cpu_cores = sys.cpus().len().max(1);
        let ram_gb = (sys.total_memory() / (1024 * 1024 * 1024)) as u32;

        HardwareProfile {
            os: std::env::consts::OS.to_owned(),
            cpu_cores,
            cpu_features: detect_cpu_features(),
            ram_gb,
            gpu: detect_gpu(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityProbe for SysinfoProbe {
    async fn profile(&self) -> HardwareProfile {
        if let Ok(guard) = self.cache.lock()
            && let Some(cached) = guard.as_ref()
            && cached.taken_at.elapsed() < self.ttl
        {
            return cached.profile.clone();
        }

        let profile = match tokio::task::spawn_blocking(Self::detect).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "hardware detection task failed; using cpu-only profile");
                HardwareProfile::cpu_only(
                    std::env::consts::OS,
                    std::thread::available_parallelism().map_or(1, |n| n.get()),
                )
            }
        };
        debug!(
            cores = profile.cpu_cores,
            ram_gb = profile.ram_gb,
            gpu = ?profile.gpu.kind,
            "hardware profile refreshed"
        );

        if let Ok(mut guard) = self.cache.lock() {
            *guard = Some(CachedProfile {
                taken_at: Instant::now(),
                profile: profile.clone(),
            });
        }
        profile
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.cache.lock() {
            *guard = None;
        }
    }
}

fn detect_cpu_features() -> Vec<String> {
    let mut features = Vec::new();
    #[cfg(target_arch = "x86_64")]
    {
        if std::arch::is_x86_feature_detected!("avx2") {
            features.push("avx2".to_owned());
        }
        if std::arch::is_x86_feature_detected!("fma") {
            features.push("fma".to_owned());
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        // NEON is baseline on aarch64
        features.push("neon".to_owned());
    }
    features
}

fn detect_gpu() -> GpuInfo {
    if cfg!(target_os = "macos") && cfg!(target_arch = "aarch64") {
        return GpuInfo {
            kind: GpuKind::Apple,
            vram_gb: None,
            api_support: ApiSupport {
                metal: true,
                d3d12: false,
                cuda_version: None,
            },
        };
    }

    if let Some(cuda_version) = detect_nvidia() {
        return GpuInfo {
            kind: GpuKind::Nvidia,
            vram_gb: None,
            api_support: ApiSupport {
                metal: false,
                d3d12: cfg!(windows),
                cuda_version: Some(cuda_version),
            },
        };
    }

    if let Some(kind) = detect_drm_vendor() {
        return GpuInfo {
            kind,
            vram_gb: None,
            api_support: ApiSupport {
                metal: false,
                d3d12: cfg!(windows),
                cuda_version: None,
            },
        };
    }

    GpuInfo::default()
}

/// NVIDIA presence via the kernel driver version file, falling back to a
/// `nvidia-smi` lookup on PATH (covers Windows and container setups).
fn detect_nvidia() -> Option<String> {
    if let Ok(version) = std::fs::read_to_string("/proc/driver/nvidia/version") {
        let cuda = version
            .lines()
            .next()
            .map_or_else(|| "unknown".to_owned(), |l| l.trim().to_owned());
        return Some(cuda);
    }
    let smi = if cfg!(windows) { "nvidia-smi.exe" } else { "nvidia-smi" };
    let on_path = std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(smi).exists())
    });
    on_path.then(|| "unknown".to_owned())
}

/// AMD/Intel detection through DRM vendor ids (Linux only)
fn detect_drm_vendor() -> Option<GpuKind> {
    let drm = Path::new("/sys/class/drm");
    let entries = std::fs::read_dir(drm).ok()?;
    for entry in entries.flatten() {
        let vendor_path = entry.path().join("device/vendor");
        if let Ok(vendor) = std::fs::read_to_string(vendor_path) {
            match vendor.trim() {
                "0x1002" => return Some(GpuKind::Amd),
                "0x8086" => return Some(GpuKind::Intel),
                "0x10de" => return Some(GpuKind::Nvidia),
                _ => {}
            }
        }
    }
    None
}
