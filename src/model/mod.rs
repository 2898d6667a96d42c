pub mod blocks;
pub mod heads;
pub mod layer;
pub mod nms;
pub mod yolo;

pub use heads::{Head, HeadOutput, HeadState, RawOutput, RunMode};
pub use layer::{Layer, LayerOutput};
pub use nms::{BBox, Detection, NMS};
pub use yolo::DetectionModel;
