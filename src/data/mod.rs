pub mod dataset;
pub mod kinematics;
pub mod sample;
pub mod series;
pub mod store;
