pub mod anchor;
pub mod body_detector;
pub mod contrast_filter;
pub mod obstruction;
pub mod temperature;
pub mod thermal_frame;
