pub mod detection;
pub mod pipeline;
pub mod preprocessing;
pub mod presence;
pub mod recognition;
pub mod session;
pub mod shared;
