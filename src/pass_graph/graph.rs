//! The pass graph: resources, programs and the ordered pass list of one preset.

use glam::Vec2;

use crate::error::{FrameError, SetupError};
use crate::pass_graph::{
    BindFn, FeedbackBuffer, FrameState, Pass, PassTarget, ProgramHandle, RenderTarget, ResourceId,
    ResourceSpec,
};
use crate::surface::{CompiledProgram, Destination, Precision, Surface, TargetId};
use crate::uniforms::{self, Uniforms};

/// A resource owned by the graph.
#[derive(Debug)]
enum Resource {
    /// Written by one pass per frame, sampled by later passes.
    Target(RenderTarget),
    /// Written and read by the same pass across frames.
    Feedback(FeedbackBuffer),
    /// Filled by the host (e.g. a composed logo). Sampled only.
    External(RenderTarget),
}

impl Resource {
    /// The target a sampler should see right now.
    fn read_id(&self) -> TargetId {
        match self {
            Resource::Target(t) | Resource::External(t) => t.id(),
            Resource::Feedback(f) => f.read().id(),
        }
    }

    fn size(&self) -> (u32, u32) {
        match self {
            Resource::Target(t) | Resource::External(t) => t.size(),
            Resource::Feedback(f) => f.size(),
        }
    }

    fn resize<S: Surface>(&mut self, surface: &mut S, size: (u32, u32)) {
        match self {
            Resource::Target(t) | Resource::External(t) => t.resize(surface, size),
            Resource::Feedback(f) => f.resize(surface, size),
        }
    }

    fn destroy<S: Surface>(self, surface: &mut S) {
        match self {
            Resource::Target(t) | Resource::External(t) => t.destroy(surface),
            Resource::Feedback(f) => f.destroy(surface),
        }
    }
}

/// Swap back every feedback buffer in `swapped`. Swapping is an involution,
/// so a buffer written twice in one frame is restored too.
fn undo_swaps(resources: &mut [Resource], swapped: &[ResourceId]) {
    for id in swapped {
        if let Resource::Feedback(buffer) = &mut resources[id.0] {
            buffer.swap();
        }
    }
}

/// An ordered, statically registered sequence of full-screen passes.
///
/// The graph owns every target, feedback buffer and program it creates, and
/// releases them in [`destroy`](Self::destroy). Passes run in registration
/// order, so a pass that samples another pass's output sees this frame's
/// result as long as it was registered later. A feedback pass samples its
/// own buffer's read side, which still holds the previous frame, and the
/// buffer is swapped right after it draws.
///
/// # Example
///
/// ```
/// use flowline::{
///     FrameState, PassGraph, PassTarget, ResourceSpec, SoftwareEffect, SoftwareSurface,
///     UniformDecl, Uniforms, EffectConfig,
/// };
///
/// let mut surface = SoftwareSurface::new(16, 16);
/// let mut graph = PassGraph::new(surface.size());
///
/// let fade = SoftwareEffect::new(
///     "fade",
///     vec![UniformDecl::texture("uTexture")],
///     |frag| frag.sample("uTexture", frag.uv) * 0.5,
/// );
/// let program = graph.add_program(&mut surface, &fade).unwrap();
/// let trail = graph.add_feedback(&mut surface, ResourceSpec::full_float());
/// graph
///     .register_pass(program, PassTarget::Resource(trail), move |_| {
///         Uniforms::new().texture("uTexture", trail)
///     })
///     .unwrap();
///
/// let config = EffectConfig::default();
/// graph.run_frame(&mut surface, &FrameState::at_rest((16, 16), &config)).unwrap();
/// # use flowline::Surface;
/// ```
#[derive(Debug)]
pub struct PassGraph {
    resources: Vec<Resource>,
    programs: Vec<CompiledProgram>,
    passes: Vec<Pass>,
    size: (u32, u32),
}

impl PassGraph {
    /// An empty graph for a surface of `size` device pixels.
    pub fn new(size: (u32, u32)) -> Self {
        Self {
            resources: Vec::new(),
            programs: Vec::new(),
            passes: Vec::new(),
            size,
        }
    }

    /// Compile `effect` and keep the program for the graph's lifetime.
    ///
    /// Compilation failure is fatal for the preset being built.
    pub fn add_program<S: Surface>(
        &mut self,
        surface: &mut S,
        effect: &S::Effect,
    ) -> Result<ProgramHandle, SetupError> {
        let program = surface.compile_program(effect).inspect_err(|e| {
            log::error!("{e}");
        })?;
        log::debug!(
            "compiled program '{}' with {} uniform slots",
            program.label,
            program.uniforms.len()
        );
        self.programs.push(program);
        Ok(ProgramHandle(self.programs.len() - 1))
    }

    /// Allocate a render target at `spec` relative to the surface.
    pub fn add_target<S: Surface>(&mut self, surface: &mut S, spec: ResourceSpec) -> ResourceId {
        let target = RenderTarget::create(surface, self.size, spec);
        target.clear(surface);
        self.push(Resource::Target(target))
    }

    /// Allocate a feedback buffer at `spec` relative to the surface.
    ///
    /// Several passes may target the same buffer as long as they belong to
    /// one feedback chain; each of them swaps it after drawing.
    pub fn add_feedback<S: Surface>(&mut self, surface: &mut S, spec: ResourceSpec) -> ResourceId {
        let buffer = FeedbackBuffer::create(surface, self.size, spec);
        self.push(Resource::Feedback(buffer))
    }

    /// Allocate a surface-sized 8-bit texture that the host fills through
    /// [`upload`](Self::upload). Passes may sample it but not draw into it.
    pub fn add_external<S: Surface>(&mut self, surface: &mut S) -> ResourceId {
        let target = RenderTarget::create(surface, self.size, ResourceSpec::new(1.0, Precision::Unorm8));
        target.clear(surface);
        self.push(Resource::External(target))
    }

    fn push(&mut self, resource: Resource) -> ResourceId {
        self.resources.push(resource);
        ResourceId(self.resources.len() - 1)
    }

    /// Append a pass. It will run after every pass registered before it.
    ///
    /// # Arguments
    ///
    /// * `program` - A program compiled through [`add_program`](Self::add_program)
    /// * `target` - The screen, or a target or feedback buffer of this graph
    /// * `bind` - Builds the pass's uniform values from the frame state; resource
    ///   references resolve to their read side when the pass runs
    ///
    /// # Errors
    ///
    /// [`SetupError::InvalidTarget`] for a foreign program, an unknown
    /// resource or an external input as the target.
    pub fn register_pass<F>(
        &mut self,
        program: ProgramHandle,
        target: PassTarget,
        bind: F,
    ) -> Result<(), SetupError>
    where
        F: Fn(&FrameState) -> Uniforms + 'static,
    {
        if program.0 >= self.programs.len() {
            return Err(SetupError::InvalidTarget(format!(
                "program {} was not compiled by this graph",
                program.0
            )));
        }
        if let PassTarget::Resource(id) = target {
            match self.resources.get(id.0) {
                Some(Resource::Target(_) | Resource::Feedback(_)) => {}
                Some(Resource::External(_)) => {
                    return Err(SetupError::InvalidTarget(format!(
                        "resource {} is an external input and cannot be drawn into",
                        id.0
                    )));
                }
                None => {
                    return Err(SetupError::InvalidTarget(format!("unknown resource {}", id.0)));
                }
            }
        }

        let bind: BindFn = Box::new(bind);
        self.passes.push(Pass {
            program,
            target,
            bind,
        });
        Ok(())
    }

    /// Execute every pass once, in registration order, then present.
    ///
    /// A feedback buffer swaps right after its pass draws, so later passes
    /// in the same frame sample the fresh image. If a draw or the present
    /// fails, the swaps made so far are undone: a skipped frame leaves every
    /// feedback history where the previous frame left it.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`FrameError`] unchanged.
    pub fn run_frame<S: Surface>(
        &mut self,
        surface: &mut S,
        state: &FrameState,
    ) -> Result<(), FrameError> {
        let Self {
            resources,
            programs,
            passes,
            ..
        } = self;
        let mut swapped = Vec::new();

        for pass in passes.iter() {
            let program = &programs[pass.program.0];

            let destination = match pass.target {
                PassTarget::Screen => Destination::Screen,
                PassTarget::Resource(id) => match &resources[id.0] {
                    Resource::Target(t) => Destination::Target(t.id()),
                    Resource::Feedback(f) => Destination::Target(f.write().id()),
                    Resource::External(_) => {
                        log::warn!("pass draws into external input {}, skipped", id.0);
                        continue;
                    }
                },
            };

            let values = (pass.bind)(state);
            let bound = uniforms::resolve(&program.uniforms, &values, |r| {
                resources.get(r.0).map(Resource::read_id)
            });

            if let Err(e) = surface.draw(program.id, destination, &bound) {
                undo_swaps(resources, &swapped);
                return Err(e);
            }

            if let PassTarget::Resource(id) = pass.target
                && let Resource::Feedback(buffer) = &mut resources[id.0]
            {
                buffer.swap();
                swapped.push(id);
            }
        }

        let presented = surface.present();
        if presented.is_err() {
            undo_swaps(resources, &swapped);
        }
        presented
    }

    /// Reallocate every resource for a surface of `width` x `height`.
    ///
    /// Feedback contents are not reset.
    pub fn resize<S: Surface>(&mut self, surface: &mut S, width: u32, height: u32) {
        self.size = (width, height);
        for resource in &mut self.resources {
            resource.resize(surface, self.size);
        }
    }

    /// Clear every render target and feedback buffer to the cold-start
    /// background. External inputs keep their contents.
    pub fn clear<S: Surface>(&mut self, surface: &mut S) {
        for resource in &self.resources {
            match resource {
                Resource::Target(t) => t.clear(surface),
                Resource::Feedback(f) => f.clear(surface),
                Resource::External(_) => {}
            }
        }
    }

    /// Replace the contents of an external input.
    pub fn upload<S: Surface>(&mut self, surface: &mut S, id: ResourceId, pixels: &image::RgbaImage) {
        match self.resources.get(id.0) {
            Some(Resource::External(t)) => surface.upload_target(t.id(), pixels),
            _ => log::warn!("upload to resource {} ignored: not an external input", id.0),
        }
    }

    /// Clear an external input to the background.
    pub fn clear_external<S: Surface>(&mut self, surface: &mut S, id: ResourceId) {
        if let Some(Resource::External(t)) = self.resources.get(id.0) {
            t.clear(surface);
        }
    }

    /// Release every resource and program. Safe to call more than once.
    pub fn destroy<S: Surface>(&mut self, surface: &mut S) {
        self.passes.clear();
        for resource in self.resources.drain(..) {
            resource.destroy(surface);
        }
        for program in self.programs.drain(..) {
            surface.destroy_program(program.id);
        }
    }

    /// Current size of a resource, in device pixels.
    pub fn resource_size(&self, id: ResourceId) -> Option<(u32, u32)> {
        self.resources.get(id.0).map(Resource::size)
    }

    /// The target a pass sampling `id` would see right now.
    pub fn read_target(&self, id: ResourceId) -> Option<TargetId> {
        self.resources.get(id.0).map(Resource::read_id)
    }

    /// `(read, write)` sides of a feedback buffer.
    pub fn feedback_sides(&self, id: ResourceId) -> Option<(TargetId, TargetId)> {
        match self.resources.get(id.0) {
            Some(Resource::Feedback(f)) => Some((f.read().id(), f.write().id())),
            _ => None,
        }
    }

    /// Every feedback buffer, in registration order.
    pub fn feedback_ids(&self) -> Vec<ResourceId> {
        self.resources
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Resource::Feedback(_)))
            .map(|(i, _)| ResourceId(i))
            .collect()
    }

    /// The compiled program behind `handle`, with its uniform table.
    pub fn program(&self, handle: ProgramHandle) -> Option<&CompiledProgram> {
        self.programs.get(handle.0)
    }

    /// Registered passes, in execution order.
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// Current surface size in device pixels.
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// [`size`](Self::size) as a vector, the `resolution` uniform of every pass.
    pub fn resolution(&self) -> Vec2 {
        Vec2::new(self.size.0 as f32, self.size.1 as f32)
    }

    /// True once [`destroy`](Self::destroy) has released everything.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.programs.is_empty() && self.passes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectConfig;
    use crate::software::{SoftwareEffect, SoftwareSurface};
    use crate::uniforms::UniformDecl;
    use glam::Vec4;

    fn solid(label: &'static str, color: Vec4) -> SoftwareEffect {
        SoftwareEffect::new(label, vec![UniformDecl::scalar("time")], move |_| color)
    }

    #[test]
    fn registering_into_an_external_input_is_rejected() {
        let mut surface = SoftwareSurface::new(8, 8);
        let mut graph = PassGraph::new((8, 8));
        let program = graph.add_program(&mut surface, &solid("a", Vec4::ONE)).unwrap();
        let logo = graph.add_external(&mut surface);

        let err = graph
            .register_pass(program, PassTarget::Resource(logo), |_| Uniforms::new())
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidTarget(_)));

        let err = graph
            .register_pass(program, PassTarget::Resource(ResourceId(42)), |_| Uniforms::new())
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidTarget(_)));
    }

    #[test]
    fn feedback_pass_swaps_once_per_frame() {
        let mut surface = SoftwareSurface::new(8, 8);
        let mut graph = PassGraph::new((8, 8));
        let program = graph.add_program(&mut surface, &solid("a", Vec4::ONE)).unwrap();
        let buffer = graph.add_feedback(&mut surface, ResourceSpec::full_float());
        graph
            .register_pass(program, PassTarget::Resource(buffer), |_| Uniforms::new())
            .unwrap();
        let (read, write) = graph.feedback_sides(buffer).unwrap();
        let config = EffectConfig::default();
        let state = FrameState::at_rest((8, 8), &config);

        graph.run_frame(&mut surface, &state).unwrap();
        assert_eq!(graph.feedback_sides(buffer), Some((write, read)));

        graph.run_frame(&mut surface, &state).unwrap();
        assert_eq!(graph.feedback_sides(buffer), Some((read, write)));
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut surface = SoftwareSurface::new(8, 8);
        let mut graph = PassGraph::new((8, 8));
        graph.add_program(&mut surface, &solid("a", Vec4::ONE)).unwrap();
        graph.add_feedback(&mut surface, ResourceSpec::full_float());
        graph.add_target(&mut surface, ResourceSpec::new(0.5, Precision::Unorm8));
        graph.add_external(&mut surface);
        assert_eq!(surface.live_targets(), 4);

        graph.destroy(&mut surface);
        graph.destroy(&mut surface);

        assert!(graph.is_empty());
        assert_eq!(surface.live_targets(), 0);
        assert_eq!(surface.live_programs(), 0);
        assert_eq!(surface.invalid_releases(), 0);
    }

    #[test]
    fn compile_failure_is_reported() {
        let mut surface = SoftwareSurface::new(8, 8);
        let mut graph = PassGraph::new((8, 8));
        let broken = SoftwareEffect::new(
            "broken",
            vec![UniformDecl::scalar("time"), UniformDecl::vec2("time")],
            |_| Vec4::ZERO,
        );

        let err = graph.add_program(&mut surface, &broken).unwrap_err();

        assert!(matches!(err, SetupError::ProgramCompile { ref label, .. } if label == "broken"));
        assert_eq!(surface.live_programs(), 0);
    }
}
