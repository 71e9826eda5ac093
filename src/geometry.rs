// 该文件是 Wangyan （望眼） 项目的一部分。
// src/geometry.rs - 坐标几何变换
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

//! # 坐标几何
//!
//! 模型输出的检测框位于源帧像素空间（已按传感器方向摆正的图像），
//! 屏幕则有自己的坐标空间。[`BoxScale`] 负责两者之间的映射：
//!
//! ```
//! use wangyan::geometry::{BoxScale, Rotation, Size};
//!
//! // 竖屏设备，横向传感器：帧的宽高相对屏幕是交换的
//! let scale = BoxScale::new(Size::new(480, 640), Size::new(640, 480), Rotation::Deg90);
//! let rect = scale.apply(&[48.0, 64.0, 240.0, 320.0]);
//! assert_eq!((rect.left, rect.top), (48.0, 64.0));
//! assert_eq!((rect.width, rect.height), (192.0, 256.0));
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
  pub width: u32,
  pub height: u32,
}

impl Size {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  /// 宽高互换
  pub const fn transposed(self) -> Self {
    Self {
      width: self.height,
      height: self.width,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }
}

impl fmt::Display for Size {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("无效的尺寸: {0}，格式应为 <宽>x<高>")]
pub struct ParseSizeError(String);

impl FromStr for Size {
  type Err = ParseSizeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (w, h) = s
      .trim()
      .split_once(['x', 'X'])
      .ok_or_else(|| ParseSizeError(s.to_string()))?;
    let width = w.trim().parse().map_err(|_| ParseSizeError(s.to_string()))?;
    let height = h.trim().parse().map_err(|_| ParseSizeError(s.to_string()))?;
    Ok(Size { width, height })
  }
}

/// 屏幕坐标系下的矩形（原点 + 尺寸）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
  pub left: f32,
  pub top: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  pub fn right(&self) -> f32 {
    self.left + self.width
  }

  pub fn bottom(&self) -> f32 {
    self.top + self.height
  }
}

/// 传感器方向，以 90 度为单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
  #[default]
  Deg0,
  Deg90,
  Deg180,
  Deg270,
}

impl Rotation {
  pub fn from_degrees(degrees: u32) -> Option<Self> {
    match degrees % 360 {
      0 => Some(Rotation::Deg0),
      90 => Some(Rotation::Deg90),
      180 => Some(Rotation::Deg180),
      270 => Some(Rotation::Deg270),
      _ => None,
    }
  }

  pub fn degrees(self) -> u32 {
    match self {
      Rotation::Deg0 => 0,
      Rotation::Deg90 => 90,
      Rotation::Deg180 => 180,
      Rotation::Deg270 => 270,
    }
  }

  pub fn swaps_axes(self) -> bool {
    matches!(self, Rotation::Deg90 | Rotation::Deg270)
  }
}

/// 源帧像素空间到屏幕空间的缩放
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxScale {
  pub factor_x: f32,
  pub factor_y: f32,
}

impl BoxScale {
  /// `frame` 是传感器原始输出的尺寸。传感器相对屏幕旋转 90/270 度时，
  /// 帧的宽对应屏幕的高，因此按交换后的轴计算比例。
  pub fn new(screen: Size, frame: Size, rotation: Rotation) -> Self {
    let (frame_w, frame_h) = if rotation.swaps_axes() {
      (frame.height, frame.width)
    } else {
      (frame.width, frame.height)
    };

    Self {
      factor_x: screen.width as f32 / frame_w.max(1) as f32,
      factor_y: screen.height as f32 / frame_h.max(1) as f32,
    }
  }

  /// bbox 为 [left, top, right, bottom]
  pub fn apply(&self, bbox: &[f32; 4]) -> Rect {
    let [left, top, right, bottom] = *bbox;
    Rect {
      left: left * self.factor_x,
      top: top * self.factor_y,
      width: (right - left) * self.factor_x,
      height: (bottom - top) * self.factor_y,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn portrait_screen_swaps_frame_axes() {
    // 720x1280 竖屏，1280x720 横向传感器
    let scale = BoxScale::new(Size::new(720, 1280), Size::new(1280, 720), Rotation::Deg90);
    assert_eq!(scale.factor_x, 1.0);
    assert_eq!(scale.factor_y, 1.0);

    let scale = BoxScale::new(Size::new(360, 640), Size::new(1280, 720), Rotation::Deg270);
    assert_eq!(scale.factor_x, 0.5);
    assert_eq!(scale.factor_y, 0.5);
    let rect = scale.apply(&[100.0, 200.0, 300.0, 600.0]);
    assert_eq!(
      rect,
      Rect {
        left: 50.0,
        top: 100.0,
        width: 100.0,
        height: 200.0
      }
    );
  }

  #[test]
  fn landscape_keeps_axes() {
    let scale = BoxScale::new(Size::new(1280, 720), Size::new(640, 480), Rotation::Deg0);
    assert_eq!(scale.factor_x, 2.0);
    assert_eq!(scale.factor_y, 1.5);
    let rect = scale.apply(&[10.0, 20.0, 110.0, 220.0]);
    assert_eq!(rect.left, 20.0);
    assert_eq!(rect.top, 30.0);
    assert_eq!(rect.right(), 220.0);
    assert_eq!(rect.bottom(), 330.0);
  }

  #[test]
  fn zero_sized_frame_does_not_divide_by_zero() {
    let scale = BoxScale::new(Size::new(100, 200), Size::new(0, 0), Rotation::Deg90);
    assert_eq!(scale.factor_x, 100.0);
    assert_eq!(scale.factor_y, 200.0);
  }

  #[test]
  fn rotation_from_degrees() {
    assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
    assert_eq!(Rotation::from_degrees(45), None);
    assert!(Rotation::Deg270.swaps_axes());
    assert!(!Rotation::Deg180.swaps_axes());
  }

  #[test]
  fn parse_size() {
    assert_eq!("480x640".parse(), Ok(Size::new(480, 640)));
    assert_eq!(" 1280X720 ".parse(), Ok(Size::new(1280, 720)));
    assert!("640".parse::<Size>().is_err());
    assert!("axb".parse::<Size>().is_err());
  }
}
