pub mod dialogue;
pub mod media;
pub mod render;
pub mod tags;
pub mod transcript;

pub use dialogue::*;
pub use transcript::*;
