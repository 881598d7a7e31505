use sysinfo::{ProcessesToUpdate, System};

/// Read-only view of host conditions the resource gate depends on
pub trait HostProbe {
    /// Whether a process with the given name is running
    fn recorder_running(&mut self, process_name: &str) -> bool;

    /// Start or finish a CPU measurement window
    fn refresh_cpu(&mut self);

    /// Aggregate CPU usage in percent over the last refresh window
    fn global_cpu_usage(&self) -> f32;
}

/// Process-name comparison: case-insensitive, `.exe` suffix ignored
pub fn process_name_matches(candidate: &str, wanted: &str) -> bool {
    fn stem(name: &str) -> String {
        let lower = name.trim().to_lowercase();
        match lower.strip_suffix(".exe") {
            Some(s) => s.to_string(),
            None => lower,
        }
    }
    !wanted.trim().is_empty() && stem(candidate) == stem(wanted)
}

/// [`HostProbe`] backed by sysinfo
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SysinfoProbe {
    fn recorder_running(&mut self, process_name: &str) -> bool {
        self.system.refresh_processes(ProcessesToUpdate::All);
        self.system
            .processes()
            .values()
            .any(|p| process_name_matches(&p.name().to_string_lossy(), process_name))
    }

    fn refresh_cpu(&mut self) {
        self.system.refresh_cpu_usage();
    }

    fn global_cpu_usage(&self) -> f32 {
        let raw = self.system.global_cpu_usage();
        if raw.is_nan() || raw.is_infinite() {
            0.0
        } else {
            raw.clamp(0.0, 100.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_name_matches() {
        assert!(process_name_matches("EpgDataCap_Bon.exe", "EpgDataCap_Bon"));
        assert!(process_name_matches("epgdatacap_bon", "EpgDataCap_Bon.exe"));
        assert!(!process_name_matches("EpgTimerSrv.exe", "EpgDataCap_Bon"));
        assert!(!process_name_matches("anything", ""));
    }

    #[test]
    fn test_sysinfo_probe_reports_bounded_usage() {
        let mut probe = SysinfoProbe::new();
        probe.refresh_cpu();
        let usage = probe.global_cpu_usage();
        assert!((0.0..=100.0).contains(&usage));
        assert!(!probe.recorder_running("definitely-not-a-running-process-name"));
    }
}
