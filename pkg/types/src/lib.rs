//! API object types shared by the quota admission control plane.

pub mod admission;
pub mod bucket;
pub mod config;
pub mod machine;
pub mod object;
pub mod quantity;
pub mod quota;
pub mod resources;
pub mod validate;
pub mod volume;

pub use quantity::Quantity;
pub use resources::ResourceList;
