//! Execution envelope value objects: compute requirements and container parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ApiError;

pub const DEFAULT_VCPU: u32 = 512;
pub const DEFAULT_MEMORY_MIB: u32 = 1024;
pub const MIN_STORAGE_GIB: u32 = 21;
pub const MAX_STORAGE_GIB: u32 = 200;

/// Allowed memory range per vCPU setting: (vcpu, min MiB, max MiB, step MiB).
const CPU_MEMORY_TABLE: [(u32, u32, u32, u32); 7] = [
    (256, 512, 2048, 512),
    (512, 1024, 4096, 1024),
    (1024, 2048, 8192, 1024),
    (2048, 4096, 16384, 1024),
    (4096, 8192, 30720, 1024),
    (8192, 16384, 61440, 4096),
    (16384, 32768, 122880, 8192),
];

/// Memory values (MiB) accepted for `vcpu`, empty when the vCPU value itself is unknown.
pub fn memory_options(vcpu: u32) -> Vec<u32> {
    CPU_MEMORY_TABLE
        .iter()
        .find(|(cpu, ..)| *cpu == vcpu)
        .map(|&(_, min, max, step)| {
            if vcpu == 256 {
                // 0.25 vCPU is the one irregular row
                vec![512, 1024, 2048]
            } else {
                (min..=max).step_by(step as usize).collect()
            }
        })
        .unwrap_or_default()
}

/// CPU, memory, and ephemeral storage for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawComputeRequirements")]
pub struct ComputeRequirements {
    vcpu: u32,
    memory: u32,
    gpu: bool,
    storage: u32,
}

#[derive(Deserialize)]
struct RawComputeRequirements {
    #[serde(default = "default_vcpu")]
    vcpu: u32,
    #[serde(default = "default_memory")]
    memory: u32,
    #[serde(default)]
    gpu: bool,
    #[serde(default = "default_storage")]
    storage: u32,
}

fn default_vcpu() -> u32 {
    DEFAULT_VCPU
}

fn default_memory() -> u32 {
    DEFAULT_MEMORY_MIB
}

fn default_storage() -> u32 {
    MIN_STORAGE_GIB
}

impl TryFrom<RawComputeRequirements> for ComputeRequirements {
    type Error = ApiError;

    fn try_from(raw: RawComputeRequirements) -> Result<Self, Self::Error> {
        ComputeRequirements::new(raw.vcpu, raw.memory, raw.gpu, raw.storage)
    }
}

impl Default for ComputeRequirements {
    fn default() -> Self {
        Self {
            vcpu: DEFAULT_VCPU,
            memory: DEFAULT_MEMORY_MIB,
            gpu: false,
            storage: MIN_STORAGE_GIB,
        }
    }
}

impl ComputeRequirements {
    pub fn new(vcpu: u32, memory: u32, gpu: bool, storage: u32) -> Result<Self, ApiError> {
        let allowed = memory_options(vcpu);
        if allowed.is_empty() {
            let cpus: Vec<String> = CPU_MEMORY_TABLE.iter().map(|(c, ..)| c.to_string()).collect();
            return Err(ApiError::InvalidRequest(format!(
                "Unsupported vCPU value {} (allowed: {})",
                vcpu,
                cpus.join(", ")
            )));
        }
        if !allowed.contains(&memory) {
            return Err(ApiError::InvalidRequest(format!(
                "Memory {} MiB is not compatible with {} vCPU units (allowed: {:?})",
                memory, vcpu, allowed
            )));
        }
        if gpu {
            return Err(ApiError::InvalidRequest(
                "GPU compute is not supported".to_string(),
            ));
        }
        if !(MIN_STORAGE_GIB..=MAX_STORAGE_GIB).contains(&storage) {
            return Err(ApiError::InvalidRequest(format!(
                "Storage must be between {} and {} GiB, got {}",
                MIN_STORAGE_GIB, MAX_STORAGE_GIB, storage
            )));
        }
        Ok(Self {
            vcpu,
            memory,
            gpu,
            storage,
        })
    }

    pub fn vcpu(&self) -> u32 {
        self.vcpu
    }

    pub fn memory(&self) -> u32 {
        self.memory
    }

    pub fn gpu(&self) -> bool {
        self.gpu
    }

    pub fn storage(&self) -> u32 {
        self.storage
    }

    /// Apply `overrides` and re-validate the combined result.
    pub fn with_overrides(&self, overrides: &ComputeRequirementOverrides) -> Result<Self, ApiError> {
        Self::new(
            overrides.vcpu.unwrap_or(self.vcpu),
            overrides.memory.unwrap_or(self.memory),
            overrides.gpu.unwrap_or(self.gpu),
            overrides.storage.unwrap_or(self.storage),
        )
    }
}

/// Per-invocation compute overrides on top of an action's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeRequirementOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcpu: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<u32>,
}

impl ComputeRequirementOverrides {
    pub fn is_empty(&self) -> bool {
        self.vcpu.is_none() && self.memory.is_none() && self.gpu.is_none() && self.storage.is_none()
    }

    /// Validate against the default envelope so obviously bad values fail before any call.
    pub fn validate(&self) -> Result<(), ApiError> {
        ComputeRequirements::default().with_overrides(self).map(|_| ())
    }
}

/// Container invocation parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
}

impl ContainerParameters {
    /// Fields set in `overrides` replace the corresponding field wholesale.
    pub fn with_overrides(&self, overrides: &ContainerParameterOverrides) -> Self {
        Self {
            command: overrides.command.clone().or_else(|| self.command.clone()),
            entry_point: overrides
                .entry_point
                .clone()
                .or_else(|| self.entry_point.clone()),
            env_vars: overrides.env_vars.clone().or_else(|| self.env_vars.clone()),
            workdir: overrides.workdir.clone().or_else(|| self.workdir.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerParameterOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_vars: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
}

impl ContainerParameterOverrides {
    pub fn is_empty(&self) -> bool {
        self.command.is_none()
            && self.entry_point.is_none()
            && self.env_vars.is_none()
            && self.workdir.is_none()
    }
}
