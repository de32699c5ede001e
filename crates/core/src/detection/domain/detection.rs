use serde::Serialize;

use crate::shared::rect::Rect;

/// One decoded anchor: a box in source-frame pixels and its confidence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub rect: Rect,
    pub confidence: f32,
}

/// Consensus box of one cluster of overlapping detections.
///
/// `id` is the sequence index within the frame's output, ordered by
/// descending confidence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MergedDetection {
    pub id: u32,
    pub rect: Rect,
    pub confidence: f32,
}

/// What a frame produced. `NoDetection` stands in for an empty result and
/// for frames dropped by a per-frame failure.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "faces", rename_all = "snake_case")]
pub enum FrameDetections {
    NoDetection,
    Faces(Vec<MergedDetection>),
}

impl FrameDetections {
    pub fn from_merged(merged: Vec<MergedDetection>) -> Self {
        if merged.is_empty() {
            Self::NoDetection
        } else {
            Self::Faces(merged)
        }
    }

    pub fn faces(&self) -> &[MergedDetection] {
        match self {
            Self::NoDetection => &[],
            Self::Faces(faces) => faces,
        }
    }

    pub fn len(&self) -> usize {
        self.faces().len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::NoDetection)
    }

    /// Applies a geometric transform to every box, keeping ids and confidences.
    pub fn map_rects(&self, transform: impl Fn(&Rect) -> Rect) -> Self {
        match self {
            Self::NoDetection => Self::NoDetection,
            Self::Faces(faces) => Self::Faces(
                faces
                    .iter()
                    .map(|f| MergedDetection {
                        rect: transform(&f.rect),
                        ..*f
                    })
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merged(id: u32) -> MergedDetection {
        MergedDetection {
            id,
            rect: Rect::new(1.0, 2.0, 3.0, 4.0),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_empty_merge_is_no_detection() {
        let result = FrameDetections::from_merged(Vec::new());
        assert_eq!(result, FrameDetections::NoDetection);
        assert!(result.is_empty());
        assert_eq!(result.len(), 0);
        assert!(result.faces().is_empty());
    }

    #[test]
    fn test_faces_accessor() {
        let result = FrameDetections::from_merged(vec![merged(0), merged(1)]);
        assert!(!result.is_empty());
        assert_eq!(result.len(), 2);
        assert_eq!(result.faces()[1].id, 1);
    }

    #[test]
    fn test_map_rects_preserves_identity() {
        let result = FrameDetections::from_merged(vec![merged(7)]);
        let moved = result.map_rects(|r| r.translate(10.0, 0.0));
        assert_eq!(moved.faces()[0].id, 7);
        assert_eq!(moved.faces()[0].confidence, 0.9);
        assert_eq!(moved.faces()[0].rect.x, 11.0);
    }

    #[test]
    fn test_serialized_shape() {
        let none = serde_json::to_value(FrameDetections::NoDetection).unwrap();
        assert_eq!(none["kind"], "no_detection");

        let faces = serde_json::to_value(FrameDetections::from_merged(vec![merged(0)])).unwrap();
        assert_eq!(faces["kind"], "faces");
        assert_eq!(faces["faces"][0]["id"], 0);
        assert_eq!(faces["faces"][0]["rect"]["width"], 3.0);
    }
}
