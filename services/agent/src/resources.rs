//! Local host probing behind the health RPC.

/// A snapshot of the host the agent runs on.
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    pub os_name: String,
    pub os_version: String,
    pub uptime_seconds: u64,
    pub cpus: i64,
    pub memory_total: i64,
    pub memory_free: i64,
    pub memory_used: i64,
}

impl HostSnapshot {
    pub fn measure() -> Self {
        let (os_name, os_version) = get_os_release();
        let memory = get_memory_info();

        Self {
            os_name,
            os_version,
            uptime_seconds: get_uptime_seconds(),
            cpus: get_cpu_count(),
            memory_total: memory.total,
            memory_free: memory.free,
            memory_used: memory.total - memory.free,
        }
    }
}

fn get_cpu_count() -> i64 {
    if let Ok(parallelism) = std::thread::available_parallelism() {
        return parallelism.get() as i64;
    }

    #[cfg(unix)]
    {
        let count = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if count > 0 {
            return count as i64;
        }
    }

    1
}

#[cfg(target_os = "linux")]
fn get_os_release() -> (String, String) {
    if let Ok(release) = std::fs::read_to_string("/etc/os-release") {
        return parse_os_release(&release);
    }
    (std::env::consts::OS.to_string(), String::new())
}

#[cfg(not(target_os = "linux"))]
fn get_os_release() -> (String, String) {
    (std::env::consts::OS.to_string(), String::new())
}

fn parse_os_release(content: &str) -> (String, String) {
    let mut name = std::env::consts::OS.to_string();
    let mut version = String::new();

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("NAME=") {
            name = value.trim_matches('"').to_string();
        } else if let Some(value) = line.strip_prefix("VERSION_ID=") {
            version = value.trim_matches('"').to_string();
        }
    }

    (name, version)
}

#[cfg(target_os = "linux")]
fn get_uptime_seconds() -> u64 {
    std::fs::read_to_string("/proc/uptime")
        .ok()
        .and_then(|s| {
            s.split_whitespace()
                .next()
                .and_then(|v| v.parse::<f64>().ok())
        })
        .map(|secs| secs as u64)
        .unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn get_uptime_seconds() -> u64 {
    0
}

#[derive(Debug, Clone, Copy, Default)]
struct MemoryInfo {
    total: i64,
    free: i64,
}

#[cfg(target_os = "linux")]
fn get_memory_info() -> MemoryInfo {
    match std::fs::read_to_string("/proc/meminfo") {
        Ok(meminfo) => parse_meminfo(&meminfo),
        Err(_) => sysconf_memory(),
    }
}

#[cfg(not(target_os = "linux"))]
fn get_memory_info() -> MemoryInfo {
    sysconf_memory()
}

#[cfg(unix)]
fn sysconf_memory() -> MemoryInfo {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let total_pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let free_pages = unsafe { libc::sysconf(libc::_SC_AVPHYS_PAGES) };

    if page <= 0 || total_pages <= 0 {
        // Zeros mean "unknown host"; an invented placeholder total would be
        // indistinguishable from a real measurement in peer diagnostics.
        return MemoryInfo::default();
    }

    MemoryInfo {
        total: page * total_pages,
        free: if free_pages > 0 { page * free_pages } else { 0 },
    }
}

#[cfg(not(unix))]
fn sysconf_memory() -> MemoryInfo {
    MemoryInfo::default()
}

/// The numeric value of a `/proc/meminfo` entry, in kibibytes. Entries
/// without the `kB` unit (the hugepage counters) are skipped.
fn meminfo_kib(rest: &str) -> Option<i64> {
    rest.trim()
        .strip_suffix("kB")
        .and_then(|v| v.trim().parse::<i64>().ok())
}

fn parse_meminfo(content: &str) -> MemoryInfo {
    let mut total = 0i64;
    let mut available: Option<i64> = None;
    let mut reclaimable = 0i64;

    for line in content.lines() {
        let Some((field, rest)) = line.split_once(':') else {
            continue;
        };
        let Some(kib) = meminfo_kib(rest) else {
            continue;
        };
        let bytes = kib.saturating_mul(1024);

        match field.trim() {
            "MemTotal" => total = bytes,
            "MemAvailable" => available = Some(bytes),
            // Kernels before 3.14 lack MemAvailable; the classic
            // free-plus-caches sum stands in for it.
            "MemFree" | "Buffers" | "Cached" => reclaimable += bytes,
            _ => {}
        }
    }

    MemoryInfo {
        total,
        free: available.unwrap_or(reclaimable),
    }
}
