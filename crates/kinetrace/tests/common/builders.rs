//! Builder patterns for creating test data programmatically.
//!
//! These builders allow creating complete configurations without
//! repetitive boilerplate code.

#![allow(dead_code)]

use std::path::Path;

use kinetrace::config::{
    ActionRecognitionStageConfig, Config, DetectionStageConfig, FoldersConfig,
    FrameExtractionStageConfig, LoggingConfig, PoseEstimationStageConfig, StagesConfig,
};

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    version: String,
    folders: FoldersConfig,
    database_path: Option<String>,
    worker_count: usize,
    history_retention_days: u32,
    save_predictions: bool,
    frame_interval: u32,
    action_recognition: Option<ActionRecognitionStageConfig>,
}

impl ConfigBuilder {
    /// Create a new builder with all folders below `base`.
    pub fn new(base: &Path) -> Self {
        let folder = |name: &str| base.join(name).to_string_lossy().into_owned();
        Self {
            version: "1.0".to_string(),
            folders: FoldersConfig {
                upload: folder("input"),
                processed: folder("output"),
                pose: folder("output_pose"),
                frames: folder("frames"),
                results: folder("results"),
            },
            database_path: Some(folder("kinetrace.db")),
            worker_count: 1,
            history_retention_days: 30,
            save_predictions: false,
            frame_interval: 1,
            action_recognition: None,
        }
    }

    /// Set the config version.
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Set the worker count.
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set how many days uploads stay in the history.
    pub fn history_retention_days(mut self, days: u32) -> Self {
        self.history_retention_days = days;
        self
    }

    /// Ask pose estimation to write its predictions file.
    pub fn save_predictions(mut self, enabled: bool) -> Self {
        self.save_predictions = enabled;
        self
    }

    /// Set the frame extraction interval.
    pub fn frame_interval(mut self, interval: u32) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Configure the action recognition stage.
    pub fn action_recognition(mut self, enabled: bool) -> Self {
        self.action_recognition = Some(ActionRecognitionStageConfig {
            enabled,
            script: "actionpredict.py".to_string(),
            config: "tsn.py".to_string(),
            checkpoint: "tsn.pth".to_string(),
            label_map: "label_map.txt".to_string(),
        });
        self
    }

    /// Build the `Config`.
    pub fn build(self) -> Config {
        Config {
            version: self.version,
            folders: self.folders,
            database_path: self.database_path,
            worker_count: self.worker_count,
            history_retention_days: self.history_retention_days,
            logging: LoggingConfig::default(),
            stages: StagesConfig {
                interpreter: "python".to_string(),
                working_directory: None,
                detection: DetectionStageConfig {
                    script: "ball_detect.py".to_string(),
                    model: "ball_detect.pt".to_string(),
                },
                frame_extraction: FrameExtractionStageConfig {
                    script: "video2frame.py".to_string(),
                    interval: self.frame_interval,
                },
                pose_estimation: PoseEstimationStageConfig {
                    script: "predict.py".to_string(),
                    detector_config: "coco_person.py".to_string(),
                    detector_weights: "model1.pth".to_string(),
                    pose_config: "config.py".to_string(),
                    pose_weights: "model2.pth".to_string(),
                    device: "cpu".to_string(),
                    save_predictions: self.save_predictions,
                },
                action_recognition: self.action_recognition,
            },
        }
    }
}

/// Predictions JSON for `frames` frames with one 17-keypoint person each.
pub fn predictions_json(frames: usize) -> String {
    let instance = serde_json::json!({
        "bbox": [[10.0, 20.0, 110.0, 220.0]],
        "bbox_score": 0.97,
        "keypoints": vec![[50.0, 60.0]; 17],
        "keypoint_scores": vec![0.9; 17],
    });
    let instance_info: Vec<_> = (1..=frames)
        .map(|frame_id| {
            serde_json::json!({
                "frame_id": frame_id,
                "instances": [instance.clone()],
            })
        })
        .collect();

    serde_json::json!({
        "meta_info": {
            "dataset_name": "coco",
            "num_keypoints": 17,
            "skeleton_links": { "__ndarray__": [[15, 13], [13, 11], [16, 14]], "dtype": "int64" }
        },
        "instance_info": instance_info,
    })
    .to_string()
}
