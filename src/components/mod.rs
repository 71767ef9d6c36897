pub mod bounds;
pub mod input;
pub mod magnifier;
pub mod overlay;
pub mod resync;
pub mod scheduler;
