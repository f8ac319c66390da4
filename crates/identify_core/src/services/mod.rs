pub mod classifier;
pub mod controller;
pub mod image_source;
pub mod preview;
pub mod session;
