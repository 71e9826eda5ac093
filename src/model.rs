// 该文件是 Wangyan （望眼） 项目的一部分。
// src/model.rs - 视觉推理模型
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

//! # 模型模块
//!
//! 推理本身交给外部推理库，这里负责：按 URL 加载模型（权重文件 + 标签文件 + 推理选项），
//! 对一帧执行推理得到检测结果，以及释放模型。
//!
//! ## URL Scheme
//!
//! `<backend>://<权重文件>?labels=<标签文件>&confidence=0.4&max_detections=100&input=640x640`
//!
//! - `replay` 回放 JSON 中预先录制的检测结果
//! - `tract` ONNX 端到端检测模型（需要 `model_tract` 特性）

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::FromUrl;
use crate::frame::CameraFrame;
use crate::geometry::Size;

mod replay;
pub use self::replay::ReplayModel;

#[cfg(feature = "model_tract")]
mod tract;
#[cfg(feature = "model_tract")]
pub use self::tract::TractModel;

const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("不支持的模型后端: {0}")]
  SchemeMismatch(String),
  #[error("缺少参数: {0}")]
  MissingParameter(&'static str),
  #[error("无效参数 {name}: {value}")]
  InvalidParameter { name: &'static str, value: String },
  #[error("无法读取标签文件 {path}: {source}")]
  LabelFile {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("标签文件为空: {0}")]
  EmptyLabels(PathBuf),
  #[error("权重文件错误: {0}")]
  Weights(String),
  #[error("推理错误: {0}")]
  Inference(String),
  #[error("模型已释放")]
  Released,
}

/// 一个检测结果，bbox 为摆正后源帧像素坐标 [left, top, right, bottom]
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: [f32; 4],
  pub score: f32,
  pub label: String,
  pub class_id: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn empty() -> Self {
    Self::default()
  }

  /// 按推理选项整理候选结果：过滤低置信度、按置信度降序、截断数量
  ///
  /// 后端把模型输出交给这里，相当于推理库的输出选项；NMS 仍由模型负责。
  pub fn from_candidates(mut items: Vec<Detection>, options: &ModelOptions) -> Self {
    items.retain(|d| d.score >= options.confidence_threshold);
    items.sort_by(|a, b| b.score.total_cmp(&a.score));
    items.truncate(options.max_detections);
    Self {
      items: items.into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

/// 类别标签，每行一个
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn from_file(path: &Path) -> Result<Self, ModelError> {
    let text = std::fs::read_to_string(path).map_err(|source| ModelError::LabelFile {
      path: path.to_path_buf(),
      source,
    })?;
    let labels = Self::parse(&text);
    if labels.is_empty() {
      return Err(ModelError::EmptyLabels(path.to_path_buf()));
    }
    debug!("加载 {} 个标签: {}", labels.len(), path.display());
    Ok(labels)
  }

  pub fn parse(text: &str) -> Self {
    let names = text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect();
    Self { names }
  }

  pub fn get(&self, class_id: u32) -> &str {
    self
      .names
      .get(class_id as usize)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
  pub confidence_threshold: f32,
  pub max_detections: usize,
  /// 模型输入尺寸
  pub input: Size,
}

impl Default for ModelOptions {
  fn default() -> Self {
    Self {
      confidence_threshold: 0.4,
      max_detections: 100,
      input: Size::new(640, 640),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
  pub backend: String,
  pub weights: PathBuf,
  pub labels: PathBuf,
  pub options: ModelOptions,
}

impl FromUrl for ModelConfig {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let labels = crate::query_value(url, "labels")
      .map(PathBuf::from)
      .ok_or(ModelError::MissingParameter("labels"))?;

    let mut options = ModelOptions::default();
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "confidence" => {
          options.confidence_threshold = value
            .parse::<f32>()
            .ok()
            .filter(|v| (0.0..=1.0).contains(v))
            .ok_or_else(|| ModelError::InvalidParameter {
              name: "confidence",
              value: value.to_string(),
            })?;
        }
        "max_detections" => {
          options.max_detections =
            value
              .parse::<usize>()
              .map_err(|_| ModelError::InvalidParameter {
                name: "max_detections",
                value: value.to_string(),
              })?;
        }
        "input" => {
          options.input = value
            .parse::<Size>()
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ModelError::InvalidParameter {
              name: "input",
              value: value.to_string(),
            })?;
        }
        _ => {}
      }
    }

    Ok(Self {
      backend: url.scheme().to_string(),
      weights: crate::url_path(url),
      labels,
      options,
    })
  }
}

pub trait Model: Send + 'static {
  fn infer(&mut self, frame: &CameraFrame) -> Result<DetectResult, ModelError>;

  /// 释放模型占用的资源，之后的推理返回 [`ModelError::Released`]
  fn release(&mut self) {}
}

pub trait ModelLoader {
  type Model: Model;
  fn load_model(&self, config: &ModelConfig) -> Result<Self::Model, ModelError>;
}

pub enum ModelWrapper {
  Replay(ReplayModel),
  #[cfg(feature = "model_tract")]
  Tract(TractModel),
}

impl Model for ModelWrapper {
  fn infer(&mut self, frame: &CameraFrame) -> Result<DetectResult, ModelError> {
    match self {
      ModelWrapper::Replay(model) => model.infer(frame),
      #[cfg(feature = "model_tract")]
      ModelWrapper::Tract(model) => model.infer(frame),
    }
  }

  fn release(&mut self) {
    match self {
      ModelWrapper::Replay(model) => model.release(),
      #[cfg(feature = "model_tract")]
      ModelWrapper::Tract(model) => model.release(),
    }
  }
}

/// 按 `ModelConfig::backend` 选择后端
#[derive(Debug, Default, Clone, Copy)]
pub struct BackendLoader;

impl ModelLoader for BackendLoader {
  type Model = ModelWrapper;

  fn load_model(&self, config: &ModelConfig) -> Result<Self::Model, ModelError> {
    info!(
      "加载模型: 后端 {}, 权重 {}, 标签 {}",
      config.backend,
      config.weights.display(),
      config.labels.display()
    );
    match config.backend.as_str() {
      ReplayModel::BACKEND => Ok(ModelWrapper::Replay(ReplayModel::load(config)?)),
      #[cfg(feature = "model_tract")]
      TractModel::BACKEND => Ok(ModelWrapper::Tract(TractModel::load(config)?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn detection(score: f32) -> Detection {
    Detection {
      bbox: [0.0, 0.0, 1.0, 1.0],
      score,
      label: "cat".to_string(),
      class_id: 0,
    }
  }

  #[test]
  fn candidates_are_filtered_sorted_and_truncated() {
    let options = ModelOptions {
      confidence_threshold: 0.5,
      max_detections: 2,
      ..ModelOptions::default()
    };
    let result = DetectResult::from_candidates(
      vec![detection(0.6), detection(0.2), detection(0.9), detection(0.7)],
      &options,
    );
    let scores: Vec<f32> = result.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.9, 0.7]);
  }

  #[test]
  fn labels_skip_blank_lines_and_fall_back() {
    let labels = Labels::parse("person\n\n  bicycle  \ncar\n");
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.get(1), "bicycle");
    assert_eq!(labels.get(80), "unknown");
  }

  #[test]
  fn empty_label_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "\n\n").unwrap();
    assert!(matches!(
      Labels::from_file(&path),
      Err(ModelError::EmptyLabels(_))
    ));
    assert!(matches!(
      Labels::from_file(&dir.path().join("missing.txt")),
      Err(ModelError::LabelFile { .. })
    ));
  }

  #[test]
  fn config_from_url() {
    let url = Url::parse(
      "replay:///models/script.json?labels=/models/coco.txt&confidence=0.25&max_detections=5&input=320x320",
    )
    .unwrap();
    let config = ModelConfig::from_url(&url).unwrap();
    assert_eq!(config.backend, "replay");
    assert_eq!(config.weights, PathBuf::from("/models/script.json"));
    assert_eq!(config.labels, PathBuf::from("/models/coco.txt"));
    assert_eq!(config.options.confidence_threshold, 0.25);
    assert_eq!(config.options.max_detections, 5);
    assert_eq!(config.options.input, Size::new(320, 320));
  }

  #[test]
  fn config_requires_labels_and_valid_options() {
    let url = Url::parse("replay:///models/script.json").unwrap();
    assert!(matches!(
      ModelConfig::from_url(&url),
      Err(ModelError::MissingParameter("labels"))
    ));

    let url = Url::parse("replay:///m.json?labels=/l.txt&confidence=1.5").unwrap();
    assert!(matches!(
      ModelConfig::from_url(&url),
      Err(ModelError::InvalidParameter {
        name: "confidence",
        ..
      })
    ));
  }

  #[test]
  fn unknown_backend_is_rejected() {
    let url = Url::parse("coreml:///m.mlmodel?labels=/l.txt").unwrap();
    let config = ModelConfig::from_url(&url).unwrap();
    assert!(matches!(
      BackendLoader.load_model(&config),
      Err(ModelError::SchemeMismatch(s)) if s == "coreml"
    ));
  }
}
