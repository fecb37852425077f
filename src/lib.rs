//!
//! weave: an archetype-based entity-component-system core.
//!

mod archetype;
mod entity;
mod error;
mod layout;
mod mask;
mod matching;
mod registry;
mod requirement;
mod system;
mod world;

pub use self::{
    entity::Entity,
    error::{Error, Result},
    registry::TypeId,
    system::{SystemCallback, SystemContext},
    world::World,
};
