//! Compiled program cache.
//!
//! Each key owns a slot holding a once-set build outcome and a build lock.
//! The map lock is only held to find or insert a slot, so slow shader
//! compilation for one key never blocks lookups or builds of other keys,
//! while concurrent requests for the same key wait for a single build.
//! A failed outcome is handed to every waiter of that build and the slot is
//! then removed, so the next request starts a fresh build.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache_key::program_cache_key;
use crate::device::{ComputeDevice, PipelineRequest};
use crate::dispatch::normalize_dispatch;
use crate::error::{ProgramError, Result};
use crate::program::{DispatchSize, Program, ProgramDescriptor, UniformValue};
use crate::shader::{ShaderHelper, ENTRY_POINT};
use crate::uniform::UniformLayout;

/// A compiled pipeline plus the uniform layout it expects.
#[derive(Debug)]
pub struct ProgramArtifact<P> {
    pub name: String,
    pub pipeline: P,
    pub source: String,
    pub workgroup_size: [u32; 3],
    pub uniform_layout: UniformLayout,
}

impl<P> ProgramArtifact<P> {
    /// Pack uniform values into a buffer matching this artifact's layout.
    ///
    /// Fails if `values` differ in count, type or length from the uniforms
    /// the artifact was built with.
    pub fn pack_uniforms(&self, values: &[UniformValue]) -> Result<Vec<u8>> {
        self.uniform_layout.pack(values)
    }
}

/// A cached artifact resolved for one particular descriptor.
#[derive(Debug)]
pub struct ResolvedProgram<P> {
    pub artifact: Arc<ProgramArtifact<P>>,
    /// Normalized dispatch size to run with.
    pub dispatch: DispatchSize,
    pub key: String,
    /// The descriptor's uniforms packed per the artifact's layout.
    pub uniform_data: Vec<u8>,
}

type Outcome<P> = std::result::Result<Arc<ProgramArtifact<P>>, ProgramError>;

struct Slot<P> {
    build: Mutex<()>,
    outcome: OnceLock<Outcome<P>>,
}

impl<P> Slot<P> {
    fn new() -> Self {
        Self {
            build: Mutex::new(()),
            outcome: OnceLock::new(),
        }
    }

    fn artifact(&self) -> Option<&Arc<ProgramArtifact<P>>> {
        self.outcome.get().and_then(|outcome| outcome.as_ref().ok())
    }
}

/// Cache of compiled programs keyed by program cache key.
pub struct ProgramManager<P> {
    slots: Mutex<HashMap<String, Arc<Slot<P>>>>,
}

impl<P> Default for ProgramManager<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ProgramManager<P> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a built artifact. Never builds.
    pub fn get(&self, key: &str) -> Option<Arc<ProgramArtifact<P>>> {
        self.slots
            .lock()
            .get(key)
            .and_then(|slot| slot.artifact().cloned())
    }

    /// Number of built programs.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.artifact().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached program.
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    fn slot(&self, key: &str) -> Arc<Slot<P>> {
        let mut slots = self.slots.lock();
        match slots.get(key) {
            Some(slot) => Arc::clone(slot),
            None => {
                let slot = Arc::new(Slot::new());
                slots.insert(key.to_string(), Arc::clone(&slot));
                slot
            }
        }
    }

    fn discard(&self, key: &str, slot: &Arc<Slot<P>>) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    /// Return the cached artifact for `descriptor`, generating and compiling
    /// it on `device` first if needed.
    ///
    /// Generation and compilation run at most once per key at a time.
    /// Requests that waited on a failed build get the same error; nothing is
    /// cached, and a later request builds again.
    pub fn get_or_build<D>(
        &self,
        device: &D,
        program: &dyn Program,
        descriptor: &ProgramDescriptor,
    ) -> Result<ResolvedProgram<P>>
    where
        D: ComputeDevice<Pipeline = P> + ?Sized,
    {
        let limits = device.limits();
        let dispatch = normalize_dispatch(
            descriptor.dispatch(),
            limits.max_compute_workgroups_per_dimension,
        )?;
        let key = program_cache_key(descriptor, dispatch.is_1d());

        let slot = self.slot(&key);
        let artifact = match slot.outcome.get() {
            Some(outcome) => {
                debug!("program cache hit: {key}");
                outcome.clone()?
            }
            None => {
                let _build = slot.build.lock();
                match slot.outcome.get() {
                    Some(outcome) => {
                        debug!("program cache hit after wait: {key}");
                        outcome.clone()?
                    }
                    None => {
                        info!("building program {key}");
                        let outcome = build(device, program, descriptor, dispatch).map(Arc::new);
                        let _ = slot.outcome.set(outcome.clone());
                        if let Err(e) = &outcome {
                            warn!("failed to build program {key}: {e}");
                            self.discard(&key, &slot);
                        }
                        outcome?
                    }
                }
            }
        };

        let uniform_data = artifact.pack_uniforms(descriptor.uniforms())?;
        Ok(ResolvedProgram {
            artifact,
            dispatch,
            key,
            uniform_data,
        })
    }
}

fn build<D>(
    device: &D,
    program: &dyn Program,
    descriptor: &ProgramDescriptor,
    dispatch: DispatchSize,
) -> Result<ProgramArtifact<D::Pipeline>>
where
    D: ComputeDevice + ?Sized,
{
    let metadata = program.metadata();
    metadata.check_uniforms(descriptor)?;

    let mut sh = ShaderHelper::new(descriptor, metadata, device.limits(), dispatch)?;
    program.generate_shader_code(&mut sh)?;
    let shader = sh.finalize()?;

    debug!(
        "\n=== WebGPU Shader code [{}] Start ===\n\n{}\n=== WebGPU Shader code [{}] End ===\n",
        descriptor.name(),
        shader.source,
        descriptor.name()
    );

    let pipeline = device.create_pipeline(&PipelineRequest {
        label: descriptor.name(),
        source: &shader.source,
        entry_point: ENTRY_POINT,
        constants: &shader.constants,
    })?;

    Ok(ProgramArtifact {
        name: descriptor.name().to_string(),
        pipeline,
        source: shader.source,
        workgroup_size: shader.workgroup_size,
        uniform_layout: UniformLayout::compute(descriptor.uniforms()),
    })
}
