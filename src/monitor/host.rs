use serde::Serialize;
use sysinfo::System;

/// Identity of the machine being monitored, read once at startup.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os_name: String,
    pub kernel_version: String,
    pub cpu_count: usize,
    pub physical_cores: usize,
    pub total_memory_bytes: u64,
    pub boot_time: u64,
}

impl HostInfo {
    pub fn detect() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        HostInfo {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            os_name: System::long_os_version().unwrap_or_default(),
            kernel_version: System::kernel_version().unwrap_or_default(),
            cpu_count: num_cpus::get(),
            physical_cores: num_cpus::get_physical(),
            total_memory_bytes: system.total_memory(),
            boot_time: System::boot_time(),
        }
    }
}
