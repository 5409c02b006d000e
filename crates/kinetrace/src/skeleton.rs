//! Typed view of the pose-estimation predictions file
//! (`results_{stem}.json`).
//!
//! Array fields may arrive either as plain JSON arrays or wrapped as
//! `{"__ndarray__": [...], "dtype": "..."}`; both decode to the same value.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::SkeletonError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseResults {
    #[serde(default)]
    pub meta_info: MetaInfo,
    #[serde(default)]
    pub instance_info: Vec<FrameInstances>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default)]
    pub num_keypoints: Option<usize>,
    /// Pairs of keypoint indices that form the drawn skeleton.
    #[serde(default, deserialize_with = "ndarray")]
    pub skeleton_links: Vec<[usize; 2]>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInstances {
    pub frame_id: u64,
    #[serde(default)]
    pub instances: Vec<PoseInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseInstance {
    /// `[x1, y1, x2, y2]` boxes.
    #[serde(default, deserialize_with = "ndarray")]
    pub bbox: Vec<[f32; 4]>,
    #[serde(default)]
    pub bbox_score: Option<f32>,
    /// `[x, y]` per keypoint.
    #[serde(default, deserialize_with = "ndarray")]
    pub keypoints: Vec<[f32; 2]>,
    #[serde(default, deserialize_with = "ndarray")]
    pub keypoint_scores: Vec<f32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArrayRepr<T> {
    Plain(T),
    Wrapped {
        #[serde(rename = "__ndarray__")]
        data: T,
    },
}

fn ndarray<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match ArrayRepr::deserialize(deserializer)? {
        ArrayRepr::Plain(value) => value,
        ArrayRepr::Wrapped { data } => data,
    })
}

impl PoseResults {
    /// Reads, parses and validates a predictions file.
    pub fn load(path: &Path) -> Result<Self, SkeletonError> {
        let content = std::fs::read_to_string(path).map_err(|e| SkeletonError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Parses and validates predictions JSON.
    pub fn parse(content: &str) -> Result<Self, SkeletonError> {
        let results: PoseResults = serde_json::from_str(content)?;
        results.validate()?;
        Ok(results)
    }

    /// Checks that every instance has one score per keypoint and, when the
    /// dataset declares it, the expected number of keypoints.
    pub fn validate(&self) -> Result<(), SkeletonError> {
        let expected = self.meta_info.num_keypoints;

        for frame in &self.instance_info {
            for (idx, instance) in frame.instances.iter().enumerate() {
                let invalid = |reason: String| SkeletonError::InvalidInstance {
                    frame_id: frame.frame_id,
                    instance: idx,
                    reason,
                };

                if instance.keypoints.len() != instance.keypoint_scores.len() {
                    return Err(invalid(format!(
                        "{} keypoints but {} scores",
                        instance.keypoints.len(),
                        instance.keypoint_scores.len()
                    )));
                }
                if let Some(n) = expected {
                    if instance.keypoints.len() != n {
                        return Err(invalid(format!(
                            "expected {} keypoints, found {}",
                            n,
                            instance.keypoints.len()
                        )));
                    }
                }
                if let Some(link) = self
                    .meta_info
                    .skeleton_links
                    .iter()
                    .find(|[a, b]| *a >= instance.keypoints.len() || *b >= instance.keypoints.len())
                {
                    return Err(invalid(format!(
                        "skeleton link {:?} refers to a missing keypoint",
                        link
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn frame_count(&self) -> usize {
        self.instance_info.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instance_info.iter().map(|f| f.instances.len()).sum()
    }

    pub fn frame(&self, frame_id: u64) -> Option<&FrameInstances> {
        self.instance_info.iter().find(|f| f.frame_id == frame_id)
    }
}
