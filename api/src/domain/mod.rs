pub mod detections;
pub mod reports;
