pub mod association;
pub mod config;
pub mod constants;
pub mod geodesy;
pub mod octoloc_errors;
pub mod octree;
pub mod origin;
pub mod picks;
pub mod scheduler;
pub mod stations;
pub mod time;
pub mod velocity_model;
