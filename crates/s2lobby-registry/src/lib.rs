//! Account and room directories for the S2 lobby.
//!
//! [`LobbyRegistry`] is the single shared store. It is constructed once by
//! the server and passed by `Arc` to every session; there is no global
//! state.

mod account;
mod error;
mod registry;
mod room;

pub use account::{Account, Observer, Observers};
pub use error::RegistryError;
pub use registry::{Departure, Joined, LobbyRegistry, RegistryStats};
pub use room::{Room, RoomSettings};
