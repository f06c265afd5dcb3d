//! Device context: lifecycle, memory pools and the dtype registry

use crate::allocator::{DeviceBuffer, MemoryPool, MemoryStats};
use npuarray_core::{DType, DTypeLike, NarrowFloatSpec, NpuError, Result, TypeRegistry};
use parking_lot::{Mutex, RwLock};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Context configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Number of addressable devices
    pub device_count: u32,
    /// Per-device pool limit in bytes
    pub memory_limit: Option<usize>,
    /// Seed of the random factories; drawn from the OS when absent
    pub seed: Option<u64>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            memory_limit: None,
            seed: None,
        }
    }
}

impl ContextConfig {
    pub const ENV_DEVICE_COUNT: &'static str = "NPUARRAY_DEVICE_COUNT";
    pub const ENV_MEMORY_LIMIT: &'static str = "NPUARRAY_MEMORY_LIMIT";
    pub const ENV_SEED: &'static str = "NPUARRAY_SEED";

    /// Defaults overridden by `NPUARRAY_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = lookup(Self::ENV_DEVICE_COUNT) {
            config.device_count = parse_var(Self::ENV_DEVICE_COUNT, &v)?;
        }
        if let Some(v) = lookup(Self::ENV_MEMORY_LIMIT) {
            config.memory_limit = Some(parse_var(Self::ENV_MEMORY_LIMIT, &v)?);
        }
        if let Some(v) = lookup(Self::ENV_SEED) {
            config.seed = Some(parse_var(Self::ENV_SEED, &v)?);
        }
        Ok(config)
    }

    pub fn with_device_count(mut self, count: u32) -> Self {
        self.device_count = count;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| NpuError::InvalidArgument(format!("{key}={value:?} is not a valid value")))
}

struct State {
    initialized: bool,
    active: u32,
    generation: u64,
    next_id: u64,
    pools: Vec<MemoryPool>,
}

pub(crate) struct Shared {
    config: ContextConfig,
    state: Mutex<State>,
    registry: RwLock<TypeRegistry>,
    rng: Mutex<SmallRng>,
    launches: AtomicU64,
    pending: AtomicU64,
}

/// Handle to a (software) accelerator context
///
/// Cloning is cheap; clones share devices, pools and the registry. Arrays keep
/// their context alive.
#[derive(Clone)]
pub struct Context {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Context")
            .field("initialized", &state.initialized)
            .field("device", &state.active)
            .field("generation", &state.generation)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(ContextConfig::default())
    }
}

impl Context {
    /// Create an uninitialized context
    pub fn new(config: ContextConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        };
        let pools = (0..config.device_count)
            .map(|device| MemoryPool::new(device, config.memory_limit))
            .collect();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    initialized: false,
                    active: 0,
                    generation: 0,
                    next_id: 0,
                    pools,
                }),
                config,
                registry: RwLock::new(TypeRegistry::new()),
                rng: Mutex::new(rng),
                launches: AtomicU64::new(0),
                pending: AtomicU64::new(0),
            }),
        }
    }

    /// Context configured from the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(ContextConfig::from_env()?))
    }

    /// Create and initialize on `device`
    pub fn with_device(config: ContextConfig, device: u32) -> Result<Self> {
        let ctx = Self::new(config);
        ctx.init(device)?;
        Ok(ctx)
    }

    pub fn config(&self) -> &ContextConfig {
        &self.shared.config
    }

    /// Bring up `device`; repeated calls with the same index are no-ops
    pub fn init(&self, device: u32) -> Result<()> {
        let mut state = self.shared.state.lock();
        self.check_device(device)?;
        if state.initialized && state.active == device {
            return Ok(());
        }
        state.initialized = true;
        state.active = device;
        debug!(device, generation = state.generation, "device context initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().initialized
    }

    /// Switch the target of subsequent allocations
    pub fn set_device(&self, device: u32) -> Result<()> {
        let mut state = self.shared.state.lock();
        if !state.initialized {
            return Err(NpuError::NotInitialized);
        }
        self.check_device(device)?;
        debug!(from = state.active, to = device, "active device switched");
        state.active = device;
        Ok(())
    }

    pub fn current_device(&self) -> Result<u32> {
        let state = self.shared.state.lock();
        if !state.initialized {
            return Err(NpuError::NotInitialized);
        }
        Ok(state.active)
    }

    pub fn device_count(&self) -> u32 {
        self.shared.config.device_count
    }

    /// Release every outstanding buffer
    ///
    /// Arrays created before the teardown fail with `UseAfterTeardown`
    /// afterwards. The context can be initialized again.
    pub fn teardown(&self) {
        let mut state = self.shared.state.lock();
        let live: usize = state.pools.iter().map(|p| p.live_buffers()).sum();
        if live > 0 {
            warn!(live, "teardown with live device buffers");
        }
        for pool in &mut state.pools {
            pool.clear();
        }
        state.initialized = false;
        state.generation += 1;
        self.shared.pending.store(0, Ordering::SeqCst);
        debug!(generation = state.generation, "device context torn down");
    }

    /// Wait for queued launches to complete
    pub fn synchronize(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(NpuError::NotInitialized);
        }
        let drained = self.shared.pending.swap(0, Ordering::SeqCst);
        if drained > 0 {
            trace!(drained, "synchronized launch queue");
        }
        Ok(())
    }

    /// Number of kernels launched since creation
    pub fn launches(&self) -> u64 {
        self.shared.launches.load(Ordering::Relaxed)
    }

    pub fn memory_stats(&self, device: u32) -> Result<MemoryStats> {
        self.check_device(device)?;
        let state = self.shared.state.lock();
        Ok(state.pools[device as usize].stats())
    }

    /// Register a narrow floating dtype with this context
    pub fn register_dtype(&self, spec: NarrowFloatSpec) -> Result<DType> {
        let dtype = self.shared.registry.write().register(spec)?;
        debug!(dtype = dtype.name(), code = dtype.vendor_code(), "registered dtype");
        Ok(dtype)
    }

    /// Resolve a dtype name, handle or scalar against this context's registry
    pub fn resolve_dtype<'a>(&self, like: impl Into<DTypeLike<'a>>) -> Result<DType> {
        self.shared.registry.read().resolve(like)
    }

    /// Snapshot of the registered dtypes
    pub fn dtypes(&self) -> Vec<DType> {
        self.shared.registry.read().iter().collect()
    }

    /// Reseed the random factories
    pub fn seed(&self, seed: u64) {
        *self.shared.rng.lock() = SmallRng::seed_from_u64(seed);
    }

    pub(crate) fn with_rng<R>(&self, f: impl FnOnce(&mut SmallRng) -> R) -> R {
        f(&mut self.shared.rng.lock())
    }

    fn check_device(&self, device: u32) -> Result<()> {
        let count = self.shared.config.device_count;
        if device >= count {
            return Err(NpuError::InvalidDevice { device, count });
        }
        Ok(())
    }

    /// Allocate on the active device
    pub(crate) fn allocate(&self, bytes: Vec<u8>) -> Result<DeviceBuffer> {
        let device = self.current_device()?;
        self.allocate_on(device, bytes)
    }

    /// Allocate on `device` and move `bytes` into the pool
    pub(crate) fn allocate_on(&self, device: u32, bytes: Vec<u8>) -> Result<DeviceBuffer> {
        let mut state = self.shared.state.lock();
        if !state.initialized {
            return Err(NpuError::NotInitialized);
        }
        self.check_device(device)?;
        let id = state.next_id;
        let nbytes = bytes.len();
        state.pools[device as usize].insert(id, bytes)?;
        state.next_id += 1;
        trace!(device, id, nbytes, "allocated device buffer");
        Ok(DeviceBuffer::new(self.clone(), device, id, state.generation, nbytes))
    }

    /// Fail before staging `nbytes` that `device`'s pool could not take
    pub(crate) fn ensure_capacity(&self, device: u32, nbytes: usize) -> Result<()> {
        let state = self.shared.state.lock();
        if !state.initialized {
            return Err(NpuError::NotInitialized);
        }
        self.check_device(device)?;
        state.pools[device as usize].check(nbytes)
    }

    /// Run `f` over the bytes of a live buffer
    ///
    /// The state lock is released before `f` runs.
    pub(crate) fn with_bytes<R>(
        &self,
        buffer: &DeviceBuffer,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R> {
        let bytes = {
            let state = self.shared.state.lock();
            if state.generation != buffer.generation() {
                return Err(NpuError::UseAfterTeardown);
            }
            state.pools[buffer.device() as usize]
                .get(buffer.id())
                .ok_or(NpuError::UseAfterTeardown)?
        };
        Ok(f(&bytes))
    }

    pub(crate) fn is_live(&self, buffer: &DeviceBuffer) -> bool {
        self.shared.state.lock().generation == buffer.generation()
    }

    pub(crate) fn release(&self, buffer: &DeviceBuffer) {
        let mut state = self.shared.state.lock();
        if state.generation == buffer.generation() {
            state.pools[buffer.device() as usize].remove(buffer.id());
            trace!(device = buffer.device(), id = buffer.id(), "released device buffer");
        }
    }

    /// Account for one kernel launch
    pub(crate) fn record_launch(&self, kernel: &str, elements: usize) {
        self.shared.launches.fetch_add(1, Ordering::Relaxed);
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        trace!(kernel, elements, "kernel launch");
    }

    pub(crate) fn same(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
