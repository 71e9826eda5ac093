// 该文件是 Wangyan （望眼） 项目的一部分。
// src/model/tract.rs - Tract ONNX 端到端检测模型
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

//! 适用于导出时已包含后处理的端到端模型（如 YOLO26、YOLOv8 end2end），
//! 输出形状为 `[1, N, 6]`，每行 `x1, y1, x2, y2, score, class`，坐标位于模型输入像素空间。
//! 这里只读取模型给出的结果，不再做 NMS。
//! 模型输出已是后处理结果，[`DetectResult::from_candidates`] 只按 [`ModelOptions`]
//! 中的推理选项（置信度阈值、最大数量）挑选输出行，与推理库的输出选项等价。

use image::imageops;
use tract_onnx::prelude::*;
use tracing::{debug, info};

use super::{DetectResult, Detection, Labels, Model, ModelConfig, ModelError, ModelOptions};
use crate::frame::CameraFrame;
use crate::geometry::Size;

const ROW_LEN: usize = 6;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

pub struct TractModel {
  plan: Option<Plan>,
  labels: Labels,
  options: ModelOptions,
}

impl TractModel {
  pub const BACKEND: &'static str = "tract";

  pub fn load(config: &ModelConfig) -> Result<Self, ModelError> {
    let labels = Labels::from_file(&config.labels)?;
    let input = config.options.input;

    info!("加载 ONNX 模型: {}", config.weights.display());
    let plan = tract_onnx::onnx()
      .model_for_path(&config.weights)
      .and_then(|model| {
        model.with_input_fact(
          0,
          InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, 3, input.height as usize, input.width as usize),
          ),
        )
      })
      .and_then(|model| model.into_optimized())
      .and_then(|model| model.into_runnable())
      .map_err(|e| ModelError::Weights(format!("{}: {}", config.weights.display(), e)))?;
    info!("模型加载完成，输入尺寸 {}", input);

    Ok(Self {
      plan: Some(plan),
      labels,
      options: config.options.clone(),
    })
  }

  /// 缩放到模型输入尺寸并转为 NCHW 浮点张量
  fn build_input(&self, frame: &CameraFrame) -> Tensor {
    let input = self.options.input;
    let resized = imageops::resize(
      &frame.to_upright_image(),
      input.width,
      input.height,
      imageops::FilterType::Triangle,
    );

    tract_ndarray::Array4::from_shape_fn(
      (1, 3, input.height as usize, input.width as usize),
      |(_, c, y, x)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
    )
    .into_tensor()
  }
}

/// 把模型输出的行映射回摆正后源帧的像素空间
fn decode_rows(rows: &[f32], input: Size, upright: Size, labels: &Labels) -> Vec<Detection> {
  let scale_x = upright.width as f32 / input.width.max(1) as f32;
  let scale_y = upright.height as f32 / input.height.max(1) as f32;

  rows
    .chunks_exact(ROW_LEN)
    .filter(|row| row[4].is_finite())
    .map(|row| {
      let class_id = row[5].max(0.0) as u32;
      Detection {
        bbox: [
          (row[0] * scale_x).clamp(0.0, upright.width as f32),
          (row[1] * scale_y).clamp(0.0, upright.height as f32),
          (row[2] * scale_x).clamp(0.0, upright.width as f32),
          (row[3] * scale_y).clamp(0.0, upright.height as f32),
        ],
        score: row[4],
        label: labels.get(class_id).to_string(),
        class_id,
      }
    })
    .collect()
}

impl Model for TractModel {
  fn infer(&mut self, frame: &CameraFrame) -> Result<DetectResult, ModelError> {
    let plan = self.plan.as_ref().ok_or(ModelError::Released)?;

    let input = self.build_input(frame);
    let outputs = plan
      .run(tvec!(input.into()))
      .map_err(|e| ModelError::Inference(e.to_string()))?;
    let output = outputs
      .first()
      .ok_or_else(|| ModelError::Inference("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| ModelError::Inference(e.to_string()))?;

    if view.shape().last() != Some(&ROW_LEN) {
      return Err(ModelError::Inference(format!(
        "输出形状 {:?} 不是 [.., N, {}]",
        view.shape(),
        ROW_LEN
      )));
    }

    let rows: Vec<f32> = view.iter().copied().collect();
    let candidates = decode_rows(&rows, self.options.input, frame.upright_size(), &self.labels);
    debug!("模型输出 {} 个候选框", candidates.len());

    Ok(DetectResult::from_candidates(candidates, &self.options))
  }

  fn release(&mut self) {
    if self.plan.take().is_some() {
      debug!("释放 ONNX 模型");
    }
  }
}
