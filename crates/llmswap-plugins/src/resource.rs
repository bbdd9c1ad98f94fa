//! Resource admission
//!
//! Detects total system RAM and aggregate VRAM once, then answers whether a
//! model's declared requirements fit. Checks compare against *total* capacity:
//! memory held by models already loaded is not subtracted, so this is advisory
//! capacity reporting rather than a reservation ledger.
//!
//! Detection uses `sysinfo` for RAM and the vendor CLIs (`nvidia-smi`,
//! `rocm-smi`) for VRAM. Missing tooling falls back to configured defaults.

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use llmswap_kernel::ResourceKind;
use llmswap_kernel::ResourceRequirements;
use llmswap_kernel::config::ResourceConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, info, warn};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const MIB_PER_GB: f64 = 1024.0;

/// Where a capacity figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacitySource {
    /// Detection unavailable; configured fallback in use
    Fallback,
    /// Measured on this host
    Detected,
    /// Pinned by configuration
    Configured,
}

/// Total capacity the manager admits models against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceCapacity {
    pub ram_gb: f64,
    pub vram_gb: f64,
    pub ram_source: CapacitySource,
    pub vram_source: CapacitySource,
}

/// First resource a requirement does not fit into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceShortfall {
    pub resource: ResourceKind,
    pub required_gb: f64,
    pub available_gb: f64,
}

/// Raw detection output; `None` means detection found nothing.
#[derive(Debug, Clone, Copy, Default)]
struct HostMemory {
    ram_gb: Option<f64>,
    vram_gb: Option<f64>,
}

/// Detects capacity and checks model requirements against it.
pub struct ResourceManager {
    settings: ResourceConfig,
    capacity: RwLock<ResourceCapacity>,
    initialized: AtomicBool,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(ResourceConfig::default())
    }
}

impl ResourceManager {
    /// Create a manager; capacity holds pinned or fallback values until [`initialize`](Self::initialize).
    pub fn new(settings: ResourceConfig) -> Self {
        let capacity = resolve_capacity(&settings, HostMemory::default());
        Self {
            settings,
            capacity: RwLock::new(capacity),
            initialized: AtomicBool::new(false),
        }
    }

    /// Fixed capacity; detection is skipped entirely.
    pub fn with_capacity(ram_gb: f64, vram_gb: f64) -> Self {
        Self::new(ResourceConfig {
            ram_gb: Some(ram_gb),
            vram_gb: Some(vram_gb),
            ..ResourceConfig::default()
        })
    }

    /// Detect host capacity. Never fails: anything undetectable uses the fallback.
    pub async fn initialize(&self) {
        let pinned = self.settings.ram_gb.is_some() && self.settings.vram_gb.is_some();
        let host = if pinned {
            HostMemory::default()
        } else {
            match tokio::task::spawn_blocking(detect_host_memory).await {
                Ok(host) => host,
                Err(e) => {
                    warn!("Resource detection task failed, using fallback: {}", e);
                    HostMemory::default()
                }
            }
        };

        let capacity = resolve_capacity(&self.settings, host);
        info!(
            ram_gb = capacity.ram_gb,
            vram_gb = capacity.vram_gb,
            ram_source = ?capacity.ram_source,
            vram_source = ?capacity.vram_source,
            "Resource manager initialized"
        );

        *self.capacity.write() = capacity;
        self.initialized.store(true, Ordering::SeqCst);
    }

    /// Capacity is static for the process lifetime; shutdown only flips the flag.
    pub async fn shutdown(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        debug!("Resource manager shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> ResourceCapacity {
        *self.capacity.read()
    }

    pub fn available_ram_gb(&self) -> f64 {
        self.capacity.read().ram_gb
    }

    pub fn available_vram_gb(&self) -> f64 {
        self.capacity.read().vram_gb
    }

    /// First deficient resource, RAM checked before VRAM.
    ///
    /// Unparsable sizes count as zero. A VRAM requirement only applies when
    /// it is positive, so CPU-only hosts still admit models that declare none.
    pub fn shortfall(&self, requirements: &ResourceRequirements) -> Option<ResourceShortfall> {
        let capacity = self.capacity();

        let ram = requirements.ram_gb();
        if ram > capacity.ram_gb {
            return Some(ResourceShortfall {
                resource: ResourceKind::Ram,
                required_gb: ram,
                available_gb: capacity.ram_gb,
            });
        }

        let vram = requirements.vram_gb();
        if vram > 0.0 && vram > capacity.vram_gb {
            return Some(ResourceShortfall {
                resource: ResourceKind::Vram,
                required_gb: vram,
                available_gb: capacity.vram_gb,
            });
        }

        None
    }

    /// Admit `requirements` or return the shortfall, warning with the
    /// deficient resource when rejected.
    pub fn admit(&self, requirements: &ResourceRequirements) -> Result<(), ResourceShortfall> {
        match self.shortfall(requirements) {
            None => Ok(()),
            Some(shortfall) => {
                warn!(
                    resource = %shortfall.resource,
                    required_gb = shortfall.required_gb,
                    available_gb = shortfall.available_gb,
                    "Insufficient {}",
                    shortfall.resource
                );
                Err(shortfall)
            }
        }
    }

    /// Whether `requirements` fit into total capacity.
    pub fn check_resources(&self, requirements: &ResourceRequirements) -> bool {
        self.admit(requirements).is_ok()
    }
}

fn resolve_capacity(settings: &ResourceConfig, host: HostMemory) -> ResourceCapacity {
    let (ram_gb, ram_source) = resolve_one(settings.ram_gb, host.ram_gb, settings.fallback_ram_gb);
    let (vram_gb, vram_source) =
        resolve_one(settings.vram_gb, host.vram_gb, settings.fallback_vram_gb);

    ResourceCapacity {
        ram_gb,
        vram_gb,
        ram_source,
        vram_source,
    }
}

fn resolve_one(
    pinned: Option<f64>,
    detected: Option<f64>,
    fallback: f64,
) -> (f64, CapacitySource) {
    match (pinned, detected) {
        (Some(value), _) => (value, CapacitySource::Configured),
        (None, Some(value)) if value > 0.0 => (value, CapacitySource::Detected),
        _ => (fallback, CapacitySource::Fallback),
    }
}

// ============================================================================
// Host detection
// ============================================================================

fn detect_host_memory() -> HostMemory {
    HostMemory {
        ram_gb: detect_total_ram_gb(),
        vram_gb: detect_total_vram_gb(),
    }
}

fn detect_total_ram_gb() -> Option<f64> {
    let mut sys = System::new_with_specifics(
        RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
    );
    sys.refresh_memory();

    match sys.total_memory() {
        0 => None,
        bytes => Some(bytes as f64 / BYTES_PER_GB),
    }
}

/// Sum of VRAM across every NVIDIA and AMD GPU found.
fn detect_total_vram_gb() -> Option<f64> {
    let nvidia = run_query(
        "nvidia-smi",
        &["--query-gpu=memory.total", "--format=csv,noheader,nounits"],
    )
    .and_then(|out| parse_nvidia_smi(&out));
    let rocm = run_query("rocm-smi", &["--showmeminfo", "vram", "--csv"])
        .and_then(|out| parse_rocm_smi(&out));

    match (nvidia, rocm) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    }
}

fn run_query(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        debug!("{} exited with {}", program, output.status);
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `nvidia-smi` prints one MiB figure per GPU.
fn parse_nvidia_smi(stdout: &str) -> Option<f64> {
    let per_gpu: Vec<f64> = stdout
        .lines()
        .filter_map(|line| line.trim().parse::<f64>().ok())
        .collect();

    if per_gpu.is_empty() {
        return None;
    }
    Some(per_gpu.iter().sum::<f64>() / MIB_PER_GB)
}

/// `rocm-smi` CSV: `device,VRAM Total Memory (B),VRAM Total Used Memory (B)`.
fn parse_rocm_smi(stdout: &str) -> Option<f64> {
    let per_gpu: Vec<f64> = stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split(',').nth(1))
        .filter_map(|total| total.trim().parse::<u64>().ok())
        .map(|bytes| bytes as f64 / BYTES_PER_GB)
        .collect();

    if per_gpu.is_empty() {
        return None;
    }
    Some(per_gpu.iter().sum())
}
