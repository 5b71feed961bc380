//! Per-step solver passes, run in a fixed order by the simulation step:
//! viscosity/elasticity first, then density relaxation (with collision
//! clamping folded into its displacement resolution), then a final
//! collision pass.

pub mod collision;
pub mod density;
pub mod viscosity;

pub use collision::CollisionResolver;
pub use density::DensityRelaxationSolver;
pub use viscosity::ViscosityElasticitySolver;
