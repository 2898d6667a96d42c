pub mod dataset;
pub mod reorganize;
pub mod transforms;

pub use dataset::{parse_label_file, BoundingBox, DataConfig, YoloDataset};
pub use reorganize::{reorganize_by_class, ReorganizeReport};
pub use transforms::{image_to_input, letterbox, Letterbox};
