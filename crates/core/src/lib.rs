pub mod export;
pub mod shared;
pub mod video;
