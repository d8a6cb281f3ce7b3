pub mod error;
pub mod location;
pub mod persist;
pub mod store;
pub mod transfer;

pub use location::{Coordinates, Location, LocationInput, LocationPatch, MarkerId};
pub use store::{MapState, MapStore, StoreError};
