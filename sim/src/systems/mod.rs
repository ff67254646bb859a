//! ECS systems for the foraging simulation.
//!
//! Systems contain the simulation logic that operates on components.
//!
//! ## Tick Order
//!
//! One fixed update runs these systems chained, in this order:
//!
//! 1. `begin_tick_system` - Advances the tick, clears per-tick rewards
//! 2. `steering_system` - Turns pending actions into force and rotation
//! 3. `physics_step_system` - Lets the collision engine integrate and report contacts
//! 4. `feeding_system` - Feeds on nectar contacts, applies boundary penalties
//! 5. `refresh_nearest_target_system` - Retargets foragers whose source ran dry
//! 6. `observation_system` - Encodes the observation for the next decision
//!
//! Episode starts and area resets are not per-tick systems; they run as
//! world functions (see [`episode`]) between ticks.

pub mod episode;
pub mod feeding;
pub mod observation;
pub mod placement;
pub mod serialization;
pub mod steering;
pub mod tracker;

pub use episode::*;
pub use feeding::*;
pub use observation::*;
pub use placement::*;
pub use serialization::*;
pub use steering::*;
pub use tracker::*;
