// 该文件是 Wangyan （望眼） 项目的一部分。
// src/model/replay.rs - 回放预录制的检测结果
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! 权重文件是一个 JSON 数组，每个元素对应一帧的检测结果：
//!
//! ```json
//! [
//!   [{ "class_id": 0, "score": 0.91, "bbox": [12.0, 30.0, 200.0, 310.0] }],
//!   []
//! ]
//! ```
//!
//! 每次推理取下一帧，到末尾后从头开始。

use serde::Deserialize;
use tracing::{debug, info};

use super::{DetectResult, Detection, Labels, Model, ModelConfig, ModelError, ModelOptions};
use crate::frame::CameraFrame;

#[derive(Debug, Clone, Deserialize)]
struct ReplayItem {
  class_id: u32,
  score: f32,
  bbox: [f32; 4],
}

pub struct ReplayModel {
  frames: Vec<Vec<ReplayItem>>,
  labels: Labels,
  options: ModelOptions,
  cursor: usize,
  released: bool,
}

impl ReplayModel {
  pub const BACKEND: &'static str = "replay";

  pub fn load(config: &ModelConfig) -> Result<Self, ModelError> {
    let labels = Labels::from_file(&config.labels)?;
    let text = std::fs::read_to_string(&config.weights)
      .map_err(|e| ModelError::Weights(format!("{}: {}", config.weights.display(), e)))?;
    let model = Self::from_json(&text, labels, config.options.clone())?;
    info!("回放模型加载完成，共 {} 帧", model.frames.len());
    Ok(model)
  }

  pub fn from_json(text: &str, labels: Labels, options: ModelOptions) -> Result<Self, ModelError> {
    let frames: Vec<Vec<ReplayItem>> =
      serde_json::from_str(text).map_err(|e| ModelError::Weights(e.to_string()))?;
    if frames.is_empty() {
      return Err(ModelError::Weights("没有可回放的帧".to_string()));
    }

    Ok(Self {
      frames,
      labels,
      options,
      cursor: 0,
      released: false,
    })
  }
}

impl Model for ReplayModel {
  fn infer(&mut self, frame: &CameraFrame) -> Result<DetectResult, ModelError> {
    if self.released {
      return Err(ModelError::Released);
    }

    let items = &self.frames[self.cursor];
    self.cursor = (self.cursor + 1) % self.frames.len();

    let upright = frame.upright_size();
    let candidates = items
      .iter()
      .map(|item| {
        let [l, t, r, b] = item.bbox;
        Detection {
          bbox: [
            l.clamp(0.0, upright.width as f32),
            t.clamp(0.0, upright.height as f32),
            r.clamp(0.0, upright.width as f32),
            b.clamp(0.0, upright.height as f32),
          ],
          score: item.score,
          label: self.labels.get(item.class_id).to_string(),
          class_id: item.class_id,
        }
      })
      .collect();

    let result = DetectResult::from_candidates(candidates, &self.options);
    debug!("第 {} 帧回放 {} 个结果", frame.index, result.len());
    Ok(result)
  }

  fn release(&mut self) {
    if !self.released {
      debug!("释放回放模型");
      self.released = true;
      self.frames.clear();
      self.frames.shrink_to_fit();
    }
  }
}
