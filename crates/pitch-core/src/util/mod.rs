//! Shared helpers: refresh budget and layout constants, progress bar styling, and
//! the seeded [`Rng`] every random decision of a campaign is drawn from.

mod constants;
mod named_progress;
mod rng;
mod uid;

pub use self::constants::*;
pub use self::named_progress::NamedProgress;
pub use self::rng::Rng;
pub use self::uid::UidHasher;
