//! Simulation core and the background worker.
//!
//! Two threads matter: the caller's frame loop and one dedicated worker.
//! All cross-thread traffic funnels through a single mutex guarding the
//! per-step inputs (blockers, pumps, game time, pause flag), the gravity
//! request queue, the query registry, and the published front frame. The
//! particle state is double buffered: the worker fills its private back
//! frame without any lock, then swaps it with the front under the mutex, so
//! readers only ever see fully completed steps.
//!
//! Worker lifecycle: `Stopped -> Presimulating -> Running -> Stopped`.
//! Presimulation steps run back to back with no pacing (and ignore the
//! pause flag) so the fluid settles before the level becomes playable;
//! afterwards the worker paces itself to the fixed step rate.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use glam::Vec3;
use log::{debug, info};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::aabb::{Aabb, Ray, RayHit};
use crate::blocker::WaterBlocker;
use crate::config::WaterConfig;
use crate::error::WaterError;
use crate::gravity::{gravity_byte, GravityDir};
use crate::grid::SpatialHashGrid;
use crate::output::OutputStage;
use crate::pump::{jitter_in_sphere, PumpSystem, WaterPump};
use crate::query::{self, QueryRegistry, QueryResults};
use crate::solver::{CollisionResolver, DensityRelaxationSolver, ViscosityElasticitySolver};
use crate::voxel::SolidVoxels;

/// Everything the level hands the simulator at init.
pub struct WorldDesc {
    /// Simulated world bounds; particles are clamped inside.
    pub bounds: Aabb,
    /// Packed solid-voxel occupancy covering `bounds` (see [`SolidVoxels`]).
    pub solid_bits: Vec<u64>,
    /// Seed particle positions. An empty list yields an inert simulator.
    pub positions: Vec<Vec3>,
    /// Extra particle headroom, seeded around the seed centroid.
    pub extra_particles: usize,
    /// Unpaced settling steps to run before gameplay starts.
    pub presim_iterations: u32,
    /// Seed for the session's deterministic RNG (pump jitter, extras).
    pub seed: u64,
}

/// One published, immutable snapshot of particle state from a completed
/// step. The main thread may hold it across a frame; the worker never
/// mutates a frame a reader can still see.
#[derive(Debug, Clone, Default)]
pub struct ParticleFrame {
    pub positions: Vec<Vec3>,
    /// Packed gravity bytes (see [`gravity_byte`]).
    pub gravity: Vec<u8>,
    /// Bumped whenever any gravity byte changes; gates the GPU re-upload.
    pub gravity_version: u64,
    pub step: u64,
    /// Game time the step observed (frozen while paused).
    pub game_time: f64,
}

/// Per-caller-frame inputs published to the worker.
pub struct UpdateInputs<'a> {
    pub blockers: &'a [WaterBlocker],
    pub pumps: &'a [WaterPump],
    pub game_time: f64,
    pub camera_pos: Vec3,
    pub paused: bool,
}

/// What [`WaterSystem::update`] hands back to the render glue.
#[derive(Debug, Clone, Copy)]
pub struct FrameOutput {
    /// Particles ready to draw this frame.
    pub particle_count: usize,
    /// Staging ring slot holding the sorted vertices.
    pub slot: usize,
    /// Whether the gravity byte buffer needs re-upload.
    pub gravity_dirty: bool,
    /// Step index of the frame being drawn.
    pub step: u64,
    /// Simulation time of the frame being drawn.
    pub sim_time: f64,
    /// Game time the frame observed.
    pub game_time: f64,
}

/// Which particles a gravity change applies to.
#[derive(Debug, Clone, Copy)]
pub enum GravitySelector {
    All,
    InAabb(Aabb),
}

impl GravitySelector {
    fn matches(&self, position: Vec3) -> bool {
        match self {
            GravitySelector::All => true,
            GravitySelector::InAabb(aabb) => aabb.contains(position),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GravityRequest {
    selector: GravitySelector,
    dir: GravityDir,
    highlight_only: bool,
}

/// Mutex-guarded cross-thread state.
struct SharedState {
    run: bool,
    paused: bool,
    blockers: Vec<WaterBlocker>,
    pumps: Vec<WaterPump>,
    game_time: f64,
    gravity_requests: Vec<GravityRequest>,
    queries: QueryRegistry,
    front: Arc<ParticleFrame>,
    presim_remaining: u32,
    sim_time: f64,
    steps_completed: u64,
}

struct Shared {
    state: Mutex<SharedState>,
    step_cv: Condvar,
}

/// Synchronous single-step core. Owns the authoritative particle arrays;
/// the worker loop drives it, and tests drive it directly.
struct Simulator {
    config: WaterConfig,
    voxels: SolidVoxels,
    positions: Vec<Vec3>,
    prev_positions: Vec<Vec3>,
    gravity: Vec<u8>,
    gravity_version: u64,
    velocities: Vec<Vec3>,
    grid: SpatialHashGrid,
    density: DensityRelaxationSolver,
    viscosity: ViscosityElasticitySolver,
    pumps: PumpSystem,
    rng: Xoshiro256PlusPlus,
    step: u64,
}

impl Simulator {
    fn new(config: WaterConfig, voxels: SolidVoxels, positions: Vec<Vec3>, seed: u64) -> Self {
        let count = positions.len();
        Self {
            grid: SpatialHashGrid::new(config.influence_radius),
            config,
            voxels,
            prev_positions: positions.clone(),
            positions,
            gravity: vec![gravity_byte::pack(GravityDir::YNeg, false); count],
            gravity_version: 0,
            velocities: vec![Vec3::ZERO; count],
            density: DensityRelaxationSolver::new(),
            viscosity: ViscosityElasticitySolver::new(),
            pumps: PumpSystem::new(),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            step: 0,
        }
    }

    /// Applies a queued gravity change at the start of a step.
    fn apply_gravity_request(&mut self, request: &GravityRequest) {
        let mut changed = 0usize;
        for (position, byte) in self.positions.iter().zip(self.gravity.iter_mut()) {
            if !request.selector.matches(*position) {
                continue;
            }
            let new_byte = if request.highlight_only {
                *byte | gravity_byte::HIGHLIGHT
            } else {
                gravity_byte::pack(request.dir, false)
            };
            if new_byte != *byte {
                *byte = new_byte;
                changed += 1;
            }
        }
        if changed > 0 {
            self.gravity_version += 1;
            debug!(
                "gravity change {:?} highlight_only={} touched {changed} particles",
                request.dir, request.highlight_only
            );
        }
    }

    /// Advances the fluid by one fixed timestep.
    fn step(&mut self, blockers: &[WaterBlocker], pump_list: &[WaterPump], dt: f32) {
        let Simulator {
            config,
            voxels,
            positions,
            prev_positions,
            gravity,
            velocities,
            grid,
            density,
            viscosity,
            pumps,
            rng,
            ..
        } = self;

        // Verlet-style integration: velocity is the previous tick's
        // position delta, gravity accelerates along each particle's own
        // down direction.
        for i in 0..positions.len() {
            let displacement = (positions[i] - prev_positions[i]) * config.velocity_damping;
            let down = gravity_byte::dir(gravity[i]).unit();
            prev_positions[i] = positions[i];
            positions[i] += displacement + down * (config.gravity_accel * dt * dt);
        }

        grid.build(positions, gravity);

        viscosity.apply(config, grid, positions, prev_positions);

        let resolver = CollisionResolver::new(config, voxels, blockers);
        density.relax(config, grid, positions, |i, p| {
            resolver.resolve_position(p, gravity_byte::dir(gravity[i]))
        });

        for i in 0..positions.len() {
            resolver.resolve(
                &mut positions[i],
                &mut prev_positions[i],
                gravity_byte::dir(gravity[i]),
            );
        }

        pumps.run(config, pump_list, positions, prev_positions, dt, rng);

        let inv_dt = 1.0 / dt;
        for i in 0..positions.len() {
            velocities[i] = (positions[i] - prev_positions[i]) * inv_dt;
        }

        self.step += 1;
    }

    fn compute_query(&self, aabb: Aabb) -> QueryResults {
        query::compute_results(
            &self.config,
            aabb,
            &self.positions,
            &self.velocities,
            &self.gravity,
            self.step,
        )
    }

    fn write_frame(&self, frame: &mut ParticleFrame, game_time: f64) {
        frame.positions.clone_from(&self.positions);
        frame.gravity.clone_from(&self.gravity);
        frame.gravity_version = self.gravity_version;
        frame.step = self.step;
        frame.game_time = game_time;
    }
}

fn worker_loop(shared: Arc<Shared>, mut sim: Simulator) {
    let dt = sim.config.dt();
    let period = Duration::from_secs_f64(dt as f64);
    let mut back = Arc::new(ParticleFrame::default());
    let mut next_deadline = Instant::now();

    loop {
        let (blockers, pump_list, requests, query_boxes, game_time, presimulating) = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if !state.run {
                    return;
                }
                // Presimulation ignores the pause flag; the level is still
                // loading and wants the fluid settled.
                if state.paused && state.presim_remaining == 0 {
                    state = shared.step_cv.wait(state).unwrap();
                    continue;
                }
                break;
            }
            state.queries.prune_dead();
            (
                state.blockers.clone(),
                state.pumps.clone(),
                std::mem::take(&mut state.gravity_requests),
                state.queries.snapshot(),
                state.game_time,
                state.presim_remaining > 0,
            )
        };

        for request in &requests {
            sim.apply_gravity_request(request);
        }
        sim.step(&blockers, &pump_list, dt);

        // Fill the private back frame and answer queries with no lock held.
        // `make_mut` clones only if a reader still holds the old frame.
        sim.write_frame(Arc::make_mut(&mut back), game_time);
        let results: Vec<(u64, QueryResults)> = query_boxes
            .iter()
            .map(|(id, aabb)| (*id, sim.compute_query(*aabb)))
            .collect();

        {
            let mut state = shared.state.lock().unwrap();
            std::mem::swap(&mut state.front, &mut back);
            for (id, result) in results {
                state.queries.store_results(id, result);
            }
            state.sim_time += dt as f64;
            state.steps_completed += 1;
            if state.presim_remaining > 0 {
                state.presim_remaining -= 1;
                if state.presim_remaining == 0 {
                    info!(
                        "water presimulation complete after {} steps",
                        state.steps_completed
                    );
                    next_deadline = Instant::now();
                }
            }
        }

        if !presimulating {
            next_deadline += period;
            let now = Instant::now();
            if next_deadline > now {
                thread::sleep(next_deadline - now);
            } else {
                // Fell behind real time; do not burst to catch up.
                next_deadline = now;
            }
        }
    }
}

/// Public face of the water simulation. Owns the worker thread; dropping
/// (or calling [`stop`](Self::stop)) shuts it down synchronously.
pub struct WaterSystem {
    config: WaterConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    output: OutputStage,
    front_cache: Arc<ParticleFrame>,
}

impl WaterSystem {
    /// Builds the simulator and starts the worker in presimulation.
    ///
    /// With zero seed particles no thread is started: the system is inert,
    /// every query returns neutral results, and presimulation reports
    /// complete immediately.
    pub fn new(config: WaterConfig, desc: WorldDesc) -> Result<Self, WaterError> {
        let voxels = SolidVoxels::new(desc.bounds, desc.solid_bits);
        let mut positions = desc.positions;

        if !positions.is_empty() && desc.extra_particles > 0 {
            let centroid = positions.iter().copied().sum::<Vec3>() / positions.len() as f32;
            let spread = config.influence_radius * 4.0;
            let mut rng = Xoshiro256PlusPlus::seed_from_u64(desc.seed ^ 0x9e37_79b9_7f4a_7c15);
            for _ in 0..desc.extra_particles {
                positions.push(centroid + jitter_in_sphere(&mut rng) * spread);
            }
        }

        let count = positions.len();
        let presim = if count == 0 { 0 } else { desc.presim_iterations };
        let front = Arc::new(ParticleFrame {
            gravity: vec![gravity_byte::pack(GravityDir::YNeg, false); count],
            positions: positions.clone(),
            gravity_version: 0,
            step: 0,
            game_time: 0.0,
        });
        let shared = Arc::new(Shared {
            state: Mutex::new(SharedState {
                run: count > 0,
                paused: true,
                blockers: Vec::new(),
                pumps: Vec::new(),
                game_time: 0.0,
                gravity_requests: Vec::new(),
                queries: QueryRegistry::default(),
                front: Arc::clone(&front),
                presim_remaining: presim,
                sim_time: 0.0,
                steps_completed: 0,
            }),
            step_cv: Condvar::new(),
        });

        let worker = if count == 0 {
            info!("water: no particles seeded, simulator is inert");
            None
        } else {
            let sim = Simulator::new(config, voxels, positions, desc.seed);
            let handle = thread::Builder::new()
                .name("water-sim".into())
                .spawn({
                    let shared = Arc::clone(&shared);
                    move || worker_loop(shared, sim)
                })?;
            info!("water: worker started with {count} particles, presim {presim} steps");
            Some(handle)
        };

        Ok(Self {
            config,
            shared,
            worker,
            output: OutputStage::new(),
            front_cache: front,
        })
    }

    /// Publishes this frame's inputs and stages the most recently completed
    /// step for rendering. Called once per caller frame.
    pub fn update(&mut self, inputs: UpdateInputs<'_>) -> FrameOutput {
        let (front, sim_time) = {
            let mut state = self.shared.state.lock().unwrap();
            state.paused = inputs.paused;
            state.blockers.clear();
            state.blockers.extend_from_slice(inputs.blockers);
            state.pumps.clear();
            state.pumps.extend_from_slice(inputs.pumps);
            state.game_time = inputs.game_time;
            if self.worker.is_none() {
                state.queries.prune_dead();
            }
            let front = Arc::clone(&state.front);
            let sim_time = state.sim_time;
            self.shared.step_cv.notify_all();
            (front, sim_time)
        };

        let staged = self.output.stage(
            &front.positions,
            &front.gravity,
            front.gravity_version,
            inputs.camera_pos,
            self.config.max_particle_radius,
        );
        let out = FrameOutput {
            particle_count: staged.count,
            slot: staged.slot,
            gravity_dirty: staged.gravity_dirty,
            step: front.step,
            sim_time,
            game_time: front.game_time,
        };
        self.front_cache = front;
        out
    }

    /// Staged upload buffers for the renderer.
    pub fn output(&self) -> &OutputStage {
        &self.output
    }

    /// Registers a query box. The returned handle owns the registration;
    /// dropping it removes the entry at the start of the next step.
    pub fn add_query_aabb(&self, aabb: Aabb) -> WaterQueryHandle {
        let id = {
            let mut state = self.shared.state.lock().unwrap();
            // Without a worker there is no step to prune dead entries, so
            // the caller thread does it here.
            if self.worker.is_none() {
                state.queries.prune_dead();
            }
            state.queries.insert(aabb)
        };
        WaterQueryHandle {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queues a one-shot gravity mutation, applied at the start of the
    /// next step. `highlight_only` marks the selected particles for the
    /// renderer without changing their gravity.
    pub fn request_gravity_change(
        &self,
        selector: GravitySelector,
        dir: GravityDir,
        highlight_only: bool,
    ) {
        // Inert or stopped: no step will ever drain the queue.
        if self.worker.is_none() {
            return;
        }
        self.shared
            .state
            .lock()
            .unwrap()
            .gravity_requests
            .push(GravityRequest {
                selector,
                dir,
                highlight_only,
            });
    }

    /// Polled by level-load logic before gameplay starts.
    pub fn is_presim_complete(&self) -> bool {
        self.shared.state.lock().unwrap().presim_remaining == 0
    }

    /// Nearest particle hit along `ray`, scanning the last frame read by
    /// [`update`](Self::update). The frame is an immutable snapshot, so no
    /// lock is taken.
    pub fn ray_intersect(&self, ray: Ray) -> Option<RayHit> {
        let radius = self.config.max_particle_radius;
        let mut best: Option<f32> = None;
        for position in &self.front_cache.positions {
            if let Some(t) = ray.hit_sphere(*position, radius) {
                if best.is_none_or(|b| t < b) {
                    best = Some(t);
                }
            }
        }
        best.map(|distance| RayHit {
            distance,
            position: ray.origin + ray.direction * distance,
        })
    }

    /// Synchronous, idempotent shutdown. The in-flight step (if any)
    /// completes before this returns.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        {
            let mut state = self.shared.state.lock().unwrap();
            state.run = false;
        }
        self.shared.step_cv.notify_all();
        let join = worker.join();
        // Particles live only between Init and Stop; a stopped system draws
        // nothing and hits nothing. The lock may be poisoned if the worker
        // panicked mid-step.
        if let Ok(mut state) = self.shared.state.lock() {
            state.front = Arc::new(ParticleFrame::default());
            state.gravity_requests.clear();
            state.queries.prune_dead();
        }
        self.front_cache = Arc::new(ParticleFrame::default());
        if join.is_err() {
            // The engine cannot run without its worker; a panicked worker
            // is fatal unless we are already unwinding.
            if thread::panicking() {
                log::error!("water worker panicked during shutdown");
            } else {
                panic!("water simulation worker panicked");
            }
        }
        debug!("water: worker stopped");
    }
}

impl Drop for WaterSystem {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Caller-owned handle to a registered query box.
///
/// The simulator holds only the registry entry, never a reference back to
/// the owner; dropping the handle marks the entry dead and the worker
/// prunes it at the start of its next step.
pub struct WaterQueryHandle {
    id: u64,
    shared: Arc<Shared>,
}

impl WaterQueryHandle {
    /// Moves the query box. Cheap: a single guarded write, no solver work.
    pub fn set_aabb(&self, aabb: Aabb) {
        self.shared
            .state
            .lock()
            .unwrap()
            .queries
            .set_aabb(self.id, aabb);
    }

    /// Latest results, always a whole sample from one completed step.
    pub fn results(&self) -> QueryResults {
        self.shared.state.lock().unwrap().queries.results(self.id)
    }
}

impl Drop for WaterQueryHandle {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.queries.mark_dead(self.id);
        }
    }
}
