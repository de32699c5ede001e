pub mod frame_preprocessor;
