//! Built-in API modules registered into every environment

mod base;
mod explosion;
mod timing;

pub use base::{CoreApi, GAME_VERSION_GLOBAL, HOST_VERSION_GLOBAL};
pub use explosion::ExplosionApi;
pub use timing::TimingApi;
