//! Connected sessions, their entities, and the entity snapshot loop

pub mod entity;
pub mod registry;
pub mod sync;

pub use entity::Entity;
pub use registry::{Line, SessionHandle, SessionRegistry};
pub use sync::EntitySync;
