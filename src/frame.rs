// 该文件是 Wangyan （望眼） 项目的一部分。
// src/frame.rs - 摄像头帧定义
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

use image::{RgbImage, imageops};
use thiserror::Error;

use crate::geometry::{Rotation, Size};

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 摄像头推送的一帧 RGB 图像（NHWC 排布）
///
/// `width`/`height` 是传感器原始尺寸，`rotation` 是传感器相对屏幕的方向。
#[derive(Debug, Clone)]
pub struct CameraFrame {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  pub index: u64,
  pub timestamp_ms: u64,
  pub rotation: Rotation,
}

impl CameraFrame {
  pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
      index: 0,
      timestamp_ms: 0,
      rotation: Rotation::Deg0,
    })
  }

  pub fn with_index(mut self, index: u64, timestamp_ms: u64) -> Self {
    self.index = index;
    self.timestamp_ms = timestamp_ms;
    self
  }

  pub fn with_rotation(mut self, rotation: Rotation) -> Self {
    self.rotation = rotation;
    self
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn size(&self) -> Size {
    Size::new(self.width, self.height)
  }

  /// 按传感器方向摆正之后的尺寸
  pub fn upright_size(&self) -> Size {
    if self.rotation.swaps_axes() {
      self.size().transposed()
    } else {
      self.size()
    }
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    // 长度在构造时已校验
    RgbImage::from_raw(self.width, self.height, self.data.to_vec())
      .unwrap_or_else(|| RgbImage::new(self.width, self.height))
  }

  /// 摆正后的图像，检测框坐标都以它为准
  pub fn to_upright_image(&self) -> RgbImage {
    let image = self.to_rgb_image();
    match self.rotation {
      Rotation::Deg0 => image,
      Rotation::Deg90 => imageops::rotate90(&image),
      Rotation::Deg180 => imageops::rotate180(&image),
      Rotation::Deg270 => imageops::rotate270(&image),
    }
  }
}

impl From<RgbImage> for CameraFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      data: image.into_raw().into_boxed_slice(),
      width,
      height,
      index: 0,
      timestamp_ms: 0,
      rotation: Rotation::Deg0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn rejects_short_buffer() {
    let err = CameraFrame::from_rgb(4, 2, vec![0; 10]).unwrap_err();
    assert_eq!(
      err,
      FrameError::LengthMismatch {
        expected: 24,
        actual: 10
      }
    );
  }

  #[test]
  fn upright_image_follows_sensor_rotation() {
    let mut image = RgbImage::new(4, 2);
    image.put_pixel(0, 0, Rgb([255, 0, 0]));
    let frame = CameraFrame::from(image).with_rotation(Rotation::Deg90);

    assert_eq!(frame.size(), Size::new(4, 2));
    assert_eq!(frame.upright_size(), Size::new(2, 4));

    let upright = frame.to_upright_image();
    assert_eq!(upright.dimensions(), (2, 4));
    // 顺时针旋转 90 度后，原左上角落在右上角
    assert_eq!(upright.get_pixel(1, 0), &Rgb([255, 0, 0]));
  }

  #[test]
  fn round_trips_through_rgb_image() {
    let data: Vec<u8> = (0..18).collect();
    let frame = CameraFrame::from_rgb(3, 2, data.clone()).unwrap();
    assert_eq!(frame.to_rgb_image().into_raw(), data);
  }
}
