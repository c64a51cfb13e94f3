pub mod actor;
pub mod controls;
pub mod state;

pub use actor::{ArbitratorHandle, Collaborators};
pub use controls::{ChatSubmit, ListeningControl, PlaybackControl};
pub use state::InteractionState;
