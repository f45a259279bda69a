//! Capability probe and backend selector ports

use async_trait::async_trait;

use crate::entities::{BackendConfig, ExecutionBackend, HardwareProfile};
use crate::registry::ModelDescriptor;

/// Detects host hardware, with an in-process one-hour cache.
///
/// Infallible by contract: when detection fails the probe returns a
/// partial CPU-only profile, which downstream treats as conservative
/// defaults. Probing never blocks folder lifecycle start.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Current profile, cached for one hour
    async fn profile(&self) -> HardwareProfile;

    /// Drop the cache so the next call re-probes
    fn invalidate(&self);
}

/// Orders execution backends for a model load.
///
/// The returned list is tried front to back; the final element is always
/// [`ExecutionBackend::Cpu`]. Backends that fail their lightweight probe
/// are absent, not errors.
pub trait BackendSelector: Send + Sync {
    /// Ordered `(backend, config)` pairs for this profile and model
    fn select(
        &self,
        profile: &HardwareProfile,
        model: &ModelDescriptor,
    ) -> Vec<(ExecutionBackend, BackendConfig)>;
}
