#[cfg(target_os = "linux")]
use tracing::warn;

/// Seam for sampling process memory.
///
/// The controller polls usage at stop-condition checkpoints and asks for
/// the environment ceiling during option validation. Implementations must
/// never fail; on platforms or environments where a reading is
/// unavailable they degrade to "no usage" / "no ceiling".
pub trait MemoryProbe: Send + Sync {
    /// Current memory usage of this process, in bytes.
    fn usage_bytes(&self) -> u64;

    /// Maximum memory the environment will allow this process, in bytes.
    /// `None` when no ceiling is configured or it cannot be determined.
    fn ceiling_bytes(&self) -> Option<u64>;
}

/// Default probe backed by cgroup v2 with `/proc` fallbacks.
///
/// Usage comes from `memory.current`, falling back to the `VmRSS` line of
/// `/proc/self/status`. The ceiling comes from `memory.max` (a literal
/// `max` means no cgroup ceiling), falling back to `MemTotal` in
/// `/proc/meminfo`. On non-Linux targets both readings are unavailable.
#[derive(Debug, Clone, Default)]
pub struct ProcMemory;

#[cfg(target_os = "linux")]
impl MemoryProbe for ProcMemory {
    fn usage_bytes(&self) -> u64 {
        if let Some(bytes) = read_u64("/sys/fs/cgroup/memory.current") {
            return bytes;
        }
        match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => parse_kib_field(&status, "VmRSS:").unwrap_or(0),
            Err(e) => {
                warn!("proc memory read failed: {e}");
                0
            }
        }
    }

    fn ceiling_bytes(&self) -> Option<u64> {
        if let Ok(raw) = std::fs::read_to_string("/sys/fs/cgroup/memory.max") {
            if let Some(bytes) = parse_cgroup_max(&raw) {
                return Some(bytes);
            }
        }
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_kib_field(&meminfo, "MemTotal:")
    }
}

#[cfg(not(target_os = "linux"))]
impl MemoryProbe for ProcMemory {
    fn usage_bytes(&self) -> u64 {
        0
    }

    fn ceiling_bytes(&self) -> Option<u64> {
        None
    }
}

#[cfg(target_os = "linux")]
fn read_u64(path: &str) -> Option<u64> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Parse a `key: <n> kB` line out of a /proc status-style file, in bytes.
#[cfg(any(target_os = "linux", test))]
fn parse_kib_field(content: &str, key: &str) -> Option<u64> {
    let line = content.lines().find(|line| line.starts_with(key))?;
    let kib: u64 = line
        .trim_start_matches(key)
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse()
        .ok()?;
    Some(kib * 1024)
}

/// Parse a cgroup v2 `memory.max` value; `max` means no ceiling.
#[cfg(any(target_os = "linux", test))]
fn parse_cgroup_max(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw == "max" {
        return None;
    }
    raw.parse().ok()
}
