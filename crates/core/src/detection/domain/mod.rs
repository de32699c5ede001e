pub mod anchors;
pub mod box_decoder;
pub mod coordinate_mapper;
pub mod detection;
pub mod math;
pub mod weighted_suppressor;
