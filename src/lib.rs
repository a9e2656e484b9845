pub mod config;
pub mod detector;
pub mod estimator;
pub mod feature;
pub mod frame;
pub mod image;
pub mod mask;
pub mod math;
pub mod my_types;
pub mod optical_flow;
pub mod overlapping_window;
pub mod pyramid;
pub mod rigid_box;
pub mod session;
pub mod single_window;
pub mod synthetic;
pub mod transform_hash;
