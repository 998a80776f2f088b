pub mod physics;
pub mod room;
