use serde::{Deserialize, Serialize};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

use crate::prelude::*;

/// Identifies the machine a report was measured on.
#[derive(Eq, PartialEq, Hash, Serialize, Deserialize, Debug, Clone, Default)]
pub struct SystemInfo {
    pub os: String,
    pub os_version: String,
    pub arch: String,
    pub host: String,
    pub cpu_brand: String,
    pub cpu_cores: usize,
    pub total_memory_gb: u64,
}

#[cfg(test)]
impl SystemInfo {
    pub fn test() -> Self {
        SystemInfo {
            os: "ubuntu".to_string(),
            os_version: "24.04".to_string(),
            arch: "x86_64".to_string(),
            host: "bench-01".to_string(),
            cpu_brand: "AMD EPYC 7B13".to_string(),
            cpu_cores: 8,
            total_memory_gb: 32,
        }
    }
}

impl SystemInfo {
    pub fn new() -> Result<Self> {
        let os = System::distribution_id();
        let os_version = System::os_version().ok_or(anyhow!("Failed to get OS version"))?;
        let arch = System::cpu_arch();
        let host = System::host_name().ok_or(anyhow!("Failed to get host name"))?;

        let s = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        let cpu_cores = s
            .physical_core_count()
            .ok_or(anyhow!("Failed to get CPU core count"))?;
        let total_memory_gb = s.total_memory().div_ceil(1024_u64.pow(3));

        let cpu_brand = s
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .ok_or(anyhow!("Failed to get CPU info"))?;

        Ok(SystemInfo {
            os,
            os_version,
            arch,
            host,
            cpu_brand,
            cpu_cores,
            total_memory_gb,
        })
    }
}

/// Name reports are filed under when none is given: the host name.
pub fn default_machine_name() -> String {
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}
