pub mod crop_region;
pub mod input_tensor;
pub mod preprocess_error;
