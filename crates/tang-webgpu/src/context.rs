//! GPU contexts and the registry that owns them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::cache::{ProgramManager, ResolvedProgram};
use crate::config::ProviderOptions;
use crate::device::{ComputeDevice, DeviceLimits};
use crate::error::Result;
use crate::program::{Program, ProgramDescriptor};

/// A device together with its options and compiled program cache.
pub struct GpuContext<D: ComputeDevice> {
    device: D,
    options: ProviderOptions,
    programs: ProgramManager<D::Pipeline>,
}

impl<D: ComputeDevice> GpuContext<D> {
    pub fn new(device: D, options: ProviderOptions) -> Self {
        Self {
            device,
            options,
            programs: ProgramManager::new(),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn limits(&self) -> &DeviceLimits {
        self.device.limits()
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    pub fn programs(&self) -> &ProgramManager<D::Pipeline> {
        &self.programs
    }

    /// Resolve `program` for `descriptor` through this context's cache.
    pub fn get_or_build(
        &self,
        program: &dyn Program,
        descriptor: &ProgramDescriptor,
    ) -> Result<ResolvedProgram<D::Pipeline>> {
        self.programs.get_or_build(&self.device, program, descriptor)
    }
}

/// Contexts keyed by context id.
///
/// Create one registry per session and pass it to whatever needs a context;
/// dropping the registry (or calling [`clear`](Self::clear)) releases every
/// context that is not still borrowed elsewhere.
pub struct ContextRegistry<D: ComputeDevice> {
    contexts: Mutex<HashMap<u16, Arc<GpuContext<D>>>>,
}

impl<D: ComputeDevice> Default for ContextRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: ComputeDevice> ContextRegistry<D> {
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
        }
    }

    /// Return the context for `options.context_id`, creating it with
    /// `create` if it does not exist yet.
    ///
    /// An existing context keeps the options it was created with.
    pub fn get_or_create<F, E>(
        &self,
        options: &ProviderOptions,
        create: F,
    ) -> std::result::Result<Arc<GpuContext<D>>, E>
    where
        F: FnOnce(&ProviderOptions) -> std::result::Result<D, E>,
    {
        let mut contexts = self.contexts.lock();
        if let Some(ctx) = contexts.get(&options.context_id) {
            return Ok(Arc::clone(ctx));
        }
        let device = create(options)?;
        let ctx = Arc::new(GpuContext::new(device, options.clone()));
        contexts.insert(options.context_id, Arc::clone(&ctx));
        info!("created GPU context {}", options.context_id);
        Ok(ctx)
    }

    pub fn get(&self, context_id: u16) -> Option<Arc<GpuContext<D>>> {
        self.contexts.lock().get(&context_id).cloned()
    }

    pub fn remove(&self, context_id: u16) -> Option<Arc<GpuContext<D>>> {
        self.contexts.lock().remove(&context_id)
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    pub fn clear(&self) {
        self.contexts.lock().clear();
    }
}
