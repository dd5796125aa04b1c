pub mod artifacts;
pub mod tasks;
pub mod upscale;
