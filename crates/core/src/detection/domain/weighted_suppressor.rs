use crate::detection::domain::detection::{Detection, FrameDetections, MergedDetection};
use crate::detection::domain::math::{partition, union};
use crate::shared::rect::Rect;

/// Confidence-weighted merge of overlapping detections.
///
/// Unlike plain NMS, non-maximal boxes are not discarded: every member of a
/// cluster pulls the consensus box toward itself in proportion to its
/// confidence. The consensus confidence is the cluster maximum.
#[derive(Clone, Debug)]
pub struct WeightedSuppressor {
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl WeightedSuppressor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
        }
    }

    pub fn suppress(&self, detections: &[Detection]) -> FrameDetections {
        let mut candidates: Vec<&Detection> = detections
            .iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect();
        if candidates.is_empty() {
            return FrameDetections::NoDetection;
        }
        // stable: equal confidences keep anchor order
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let clusters = self.cluster(&candidates);
        let mut merged = self.consolidate(&candidates, clusters);
        merged.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        FrameDetections::from_merged(
            merged
                .into_iter()
                .enumerate()
                .map(|(id, d)| MergedDetection {
                    id: id as u32,
                    rect: d.rect,
                    confidence: d.confidence,
                })
                .collect(),
        )
    }

    /// Greedy seeding: the best unclaimed detection claims everything
    /// unclaimed that overlaps it by at least the IoU threshold.
    fn cluster(&self, sorted: &[&Detection]) -> Vec<Vec<usize>> {
        let mut claimed = vec![false; sorted.len()];
        let mut clusters = Vec::new();
        for seed in 0..sorted.len() {
            if claimed[seed] {
                continue;
            }
            claimed[seed] = true;
            let mut members = vec![seed];
            for j in (seed + 1)..sorted.len() {
                if !claimed[j] && sorted[seed].rect.iou(&sorted[j].rect) >= self.iou_threshold {
                    claimed[j] = true;
                    members.push(j);
                }
            }
            clusters.push(members);
        }
        clusters
    }

    /// Averaging can pull two consensus boxes onto each other. Fuse such
    /// clusters and re-average until every pair is below the IoU threshold.
    fn consolidate(&self, sorted: &[&Detection], mut clusters: Vec<Vec<usize>>) -> Vec<Detection> {
        loop {
            let merged: Vec<Detection> = clusters
                .iter()
                .map(|members| weighted_average(members.iter().map(|&i| sorted[i])))
                .collect();

            let mut parent: Vec<usize> = (0..merged.len()).collect();
            let mut fused = false;
            for a in 0..merged.len() {
                for b in (a + 1)..merged.len() {
                    if merged[a].rect.iou(&merged[b].rect) >= self.iou_threshold {
                        union(&mut parent, a, b);
                        fused = true;
                    }
                }
            }
            if !fused {
                return merged;
            }

            log::debug!("Fusing {} overlapping consensus boxes", merged.len());
            clusters = partition(&mut parent)
                .into_iter()
                .map(|set| set.into_iter().flat_map(|c| clusters[c].clone()).collect())
                .collect();
        }
    }
}

/// Confidence-weighted mean box; confidence is the member maximum.
fn weighted_average<'a>(members: impl Iterator<Item = &'a Detection>) -> Detection {
    let mut sum = [0.0f64; 4];
    let mut plain = [0.0f64; 4];
    let mut total_weight = 0.0f64;
    let mut count = 0usize;
    let mut best = 0.0f32;

    for d in members {
        let w = d.confidence as f64;
        let coords = [d.rect.x, d.rect.y, d.rect.width, d.rect.height];
        for (k, &c) in coords.iter().enumerate() {
            sum[k] += w * c as f64;
            plain[k] += c as f64;
        }
        total_weight += w;
        count += 1;
        best = best.max(d.confidence);
    }

    // all-zero weights only happen with a zero threshold; fall back to the mean
    let avg = if total_weight > 0.0 {
        sum.map(|s| s / total_weight)
    } else {
        plain.map(|s| s / count.max(1) as f64)
    };

    Detection {
        rect: Rect::new(avg[0] as f32, avg[1] as f32, avg[2] as f32, avg[3] as f32),
        confidence: best,
    }
}
