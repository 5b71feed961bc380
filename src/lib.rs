//! Particle fluid simulation with per-particle switchable gravity.
//!
//! The fluid is a position-based particle system (double density
//! relaxation) stepped at a fixed rate on a dedicated background thread.
//! Every particle carries one of six axis-aligned gravity directions that
//! gameplay can flip at runtime, water collides with the level's solid
//! voxels and with author-placed gravity-masked blocker volumes, pumps
//! relocate particles at a bounded rate, and external objects sample the
//! fluid through registered query boxes.
//!
//! [`WaterSystem`] is the entry point: construct it with a [`WorldDesc`],
//! call [`WaterSystem::update`] once per frame with that frame's
//! [`UpdateInputs`], and read staged render data from
//! [`WaterSystem::output`].

pub mod aabb;
pub mod blocker;
pub mod config;
pub mod error;
pub mod gravity;
pub mod grid;
pub mod output;
pub mod pump;
pub mod query;
pub mod sim;
pub mod solver;
pub mod voxel;

pub use aabb::{Aabb, Ray, RayHit};
pub use blocker::WaterBlocker;
pub use config::WaterConfig;
pub use error::WaterError;
pub use gravity::{GravityDir, GravityMask};
pub use output::{OutputStage, StagedFrame, WaterVertex, MAX_FRAMES_IN_FLIGHT};
pub use pump::WaterPump;
pub use query::QueryResults;
pub use sim::{
    FrameOutput, GravitySelector, ParticleFrame, UpdateInputs, WaterQueryHandle, WaterSystem,
    WorldDesc,
};
pub use voxel::SolidVoxels;
