pub mod live_detection_loop;
