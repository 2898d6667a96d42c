use std::cmp::Ordering;

/// One decoded detection in center format, in input-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn to_corners(&self) -> BBox {
        BBox {
            x1: self.x - self.w * 0.5,
            y1: self.y - self.h * 0.5,
            x2: self.x + self.w * 0.5,
            y2: self.y + self.h * 0.5,
        }
    }
}

/// Corner-format box used for overlap tests.
#[derive(Debug, Clone, Copy)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 < x1 || y2 < y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        intersection / union.max(1e-6)
    }
}

/// Class-aware greedy non-maximum suppression.
pub struct NMS;

impl NMS {
    pub fn apply(
        detections: Vec<Detection>,
        iou_threshold: f32,
        confidence_threshold: f32,
    ) -> Vec<Detection> {
        let mut candidates: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .collect();

        candidates.sort_unstable_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        let mut kept: Vec<Detection> = Vec::new();
        let mut kept_boxes: Vec<BBox> = Vec::new();

        for candidate in candidates {
            let bbox = candidate.to_corners();
            let suppressed = kept
                .iter()
                .zip(kept_boxes.iter())
                .any(|(k, kb)| k.class_id == candidate.class_id && kb.iou(&bbox) > iou_threshold);
            if !suppressed {
                kept.push(candidate);
                kept_boxes.push(bbox);
            }
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, w: f32, h: f32, conf: f32, class_id: usize) -> Detection {
        Detection {
            x,
            y,
            w,
            h,
            confidence: conf,
            class_id,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = det(10.0, 10.0, 4.0, 4.0, 1.0, 0).to_corners();
        assert!((b.iou(&b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = det(0.0, 0.0, 2.0, 2.0, 1.0, 0).to_corners();
        let b = det(10.0, 10.0, 2.0, 2.0, 1.0, 0).to_corners();
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn suppresses_overlapping_same_class_boxes() {
        let detections = vec![
            det(10.0, 10.0, 8.0, 8.0, 0.9, 1),
            det(10.5, 10.5, 8.0, 8.0, 0.6, 1),
            det(40.0, 40.0, 8.0, 8.0, 0.8, 1),
        ];
        let kept = NMS::apply(detections, 0.45, 0.25);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert!((kept[1].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn keeps_overlapping_boxes_of_different_classes() {
        let detections = vec![
            det(10.0, 10.0, 8.0, 8.0, 0.9, 0),
            det(10.5, 10.5, 8.0, 8.0, 0.6, 1),
        ];
        let kept = NMS::apply(detections, 0.45, 0.25);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn drops_low_confidence_boxes() {
        let detections = vec![
            det(10.0, 10.0, 8.0, 8.0, 0.1, 0),
            det(40.0, 40.0, 8.0, 8.0, 0.9, 0),
        ];
        let kept = NMS::apply(detections, 0.45, 0.25);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class_id, 0);
    }
}
