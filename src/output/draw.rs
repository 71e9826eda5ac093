// 该文件是 Wangyan （望眼） 项目的一部分。
// src/output/draw.rs - 界面画面合成
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::geometry::Rect;
use crate::notify::NotificationLevel;
use crate::screen::{OverlayBox, ScreenView};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const BUTTON_BAR_HEIGHT: u32 = 48;
const PALETTE_SIZE: usize = 80;

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BUTTON_COLOR: Rgb<u8> = Rgb([33, 33, 33]);
const INFO_COLOR: Rgb<u8> = Rgb([48, 63, 159]);
const WARNING_COLOR: Rgb<u8> = Rgb([245, 124, 0]);
const ERROR_COLOR: Rgb<u8> = Rgb([211, 47, 47]);

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件: {0}")]
  Io(#[from] std::io::Error),
  #[error("无效的字体文件")]
  InvalidFont,
}

/// 把 [`ScreenView`] 合成为一张图像：预览、检测框与标签、按钮栏、通知
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 按色相均匀生成类别颜色
    let colors = (0..PALETTE_SIZE)
      .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
      .collect();

    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      colors,
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

impl Draw {
  pub fn with_font_file(mut self, path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data).map_err(|_| DrawError::InvalidFont)?;
    debug!("加载字体: {}", path.display());
    self.font = Some(font);
    Ok(self)
  }

  /// 读取输出 URL 上的 `font=` 参数
  pub fn from_url_query(url: &Url) -> Result<Self, DrawError> {
    match crate::query_value(url, "font") {
      Some(path) => Self::default().with_font_file(Path::new(&path)),
      None => Ok(Self::default()),
    }
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn class_color(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  pub fn draw_view(&self, view: &ScreenView<'_>) -> RgbImage {
    let (w, h) = (view.size.width, view.size.height);
    if w == 0 || h == 0 {
      return RgbImage::new(w, h);
    }

    // 预览铺满屏幕，与检测框使用相同的两轴比例
    let mut canvas = match view.preview {
      Some(frame) => imageops::resize(
        &frame.to_upright_image(),
        w,
        h,
        imageops::FilterType::Triangle,
      ),
      None => RgbImage::new(w, h),
    };

    for overlay in &view.boxes {
      self.draw_overlay(&mut canvas, overlay);
    }

    let bar_height = BUTTON_BAR_HEIGHT.min(h);
    let bar_top = (h - bar_height) as i32;
    self.draw_plate(
      &mut canvas,
      0,
      bar_top,
      w,
      bar_height,
      BUTTON_COLOR,
      view.button,
    );

    let mut plate_top = bar_top;
    for notification in view.notifications.iter().rev() {
      plate_top -= self.label_text_height;
      if plate_top < 0 {
        break;
      }
      let color = match notification.level {
        NotificationLevel::Info => INFO_COLOR,
        NotificationLevel::Warning => WARNING_COLOR,
        NotificationLevel::Error => ERROR_COLOR,
      };
      self.draw_plate(
        &mut canvas,
        0,
        plate_top,
        w,
        self.label_text_height as u32,
        color,
        &notification.message,
      );
    }

    canvas
  }

  fn draw_overlay(&self, image: &mut RgbImage, overlay: &OverlayBox) {
    let color = self.class_color(overlay.class_id);
    let Some((x_min, y_min, x_max, y_max)) = clamp_rect(&overlay.rect, image) else {
      return;
    };

    draw_outline(image, x_min, y_min, x_max, y_max, color);

    // 标签放在框的上方，贴顶时放进框内
    let text_width = self.text_width(&overlay.caption);
    let label_y = if y_min >= self.label_text_height {
      y_min - self.label_text_height
    } else {
      y_min
    };
    let max_width = (image.width() as i32 - x_min).max(0);
    let label_width = text_width.min(max_width) as u32;
    self.draw_plate(
      image,
      x_min,
      label_y,
      label_width,
      self.label_text_height as u32,
      color,
      &overlay.caption,
    );
  }

  fn text_width(&self, text: &str) -> i32 {
    match &self.font {
      Some(font) => text_size(PxScale::from(self.font_size), font, text).0 as i32 + 4,
      None => (text.chars().count() as f32 * self.label_char_width) as i32,
    }
  }

  /// 实心底板，有字体时在其上写字
  #[allow(clippy::too_many_arguments)]
  fn draw_plate(
    &self,
    image: &mut RgbImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Rgb<u8>,
    text: &str,
  ) {
    if width == 0 || height == 0 {
      return;
    }

    let rect = imageproc::rect::Rect::at(x, y).of_size(width, height);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        TEXT_COLOR,
        x + 2,
        y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        text,
      );
    }
  }
}

/// 屏幕矩形转为图像内的整数像素范围，完全在画面外时返回 None
fn clamp_rect(rect: &Rect, image: &RgbImage) -> Option<(i32, i32, i32, i32)> {
  let (w, h) = (image.width() as i32, image.height() as i32);

  let x_min = (rect.left.floor() as i32).clamp(0, w - 1);
  let y_min = (rect.top.floor() as i32).clamp(0, h - 1);
  let x_max = (rect.right().ceil() as i32).clamp(0, w - 1);
  let y_max = (rect.bottom().ceil() as i32).clamp(0, h - 1);

  if x_min >= x_max || y_min >= y_max {
    return None;
  }
  Some((x_min, y_min, x_max, y_max))
}

fn draw_outline(image: &mut RgbImage, x_min: i32, y_min: i32, x_max: i32, y_max: i32, color: Rgb<u8>) {
  let (w, h) = (image.width() as i32, image.height() as i32);

  for thickness in 0..BOX_THICKNESS {
    let x_min_t = (x_min + thickness).min(w - 1);
    let y_min_t = (y_min + thickness).min(h - 1);
    let x_max_t = (x_max - thickness).max(0);
    let y_max_t = (y_max - thickness).max(0);

    for x in x_min_t..=x_max_t {
      image.put_pixel(x as u32, y_min_t as u32, color);
      image.put_pixel(x as u32, y_max_t as u32, color);
    }
    for y in y_min_t..=y_max_t {
      image.put_pixel(x_min_t as u32, y as u32, color);
      image.put_pixel(x_max_t as u32, y as u32, color);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::CameraFrame;
  use crate::geometry::{Rotation, Size};
  use crate::screen::{START_CAPTION, ScreenStats};

  fn view<'a>(preview: Option<&'a CameraFrame>, boxes: Vec<OverlayBox>) -> ScreenView<'a> {
    ScreenView {
      size: Size::new(120, 200),
      preview,
      detections: None,
      boxes,
      button: START_CAPTION,
      notifications: Vec::new(),
      stats: ScreenStats::default(),
    }
  }

  #[test]
  fn canvas_matches_screen_and_draws_box_outline() {
    let draw = Draw::default();
    let overlay = OverlayBox {
      rect: Rect {
        left: 20.0,
        top: 60.0,
        width: 40.0,
        height: 50.0,
      },
      caption: "cat 90%".to_string(),
      class_id: 3,
      score: 0.9,
    };
    let canvas = draw.draw_view(&view(None, vec![overlay]));
    assert_eq!(canvas.dimensions(), (120, 200));

    let color = draw.class_color(3);
    // 左边框与下边框
    assert_eq!(canvas.get_pixel(20, 80), &color);
    assert_eq!(canvas.get_pixel(40, 110), &color);
    // 框内部保持背景色
    assert_eq!(canvas.get_pixel(40, 80), &Rgb([0, 0, 0]));
    // 底部按钮栏
    assert_eq!(canvas.get_pixel(60, 199), &BUTTON_COLOR);
  }

  #[test]
  fn preview_is_rotated_and_stretched() {
    let mut image = RgbImage::from_pixel(8, 4, Rgb([0, 200, 0]));
    image.put_pixel(0, 0, Rgb([200, 0, 0]));
    let frame = CameraFrame::from(image).with_rotation(Rotation::Deg90);
    let canvas = Draw::default().draw_view(&view(Some(&frame), Vec::new()));
    assert_eq!(canvas.dimensions(), (120, 200));
    assert_eq!(canvas.get_pixel(10, 100), &Rgb([0, 200, 0]));
  }

  #[test]
  fn boxes_outside_the_screen_are_skipped() {
    let overlay = OverlayBox {
      rect: Rect {
        left: 500.0,
        top: 500.0,
        width: 10.0,
        height: 10.0,
      },
      caption: "far".to_string(),
      class_id: 0,
      score: 0.5,
    };
    let canvas = Draw::default().draw_view(&view(None, vec![overlay]));
    assert_eq!(canvas.get_pixel(119, 100), &Rgb([0, 0, 0]));
  }

  #[test]
  fn caption_plate_without_font_uses_estimated_width() {
    let draw = Draw::default();
    assert!(!draw.has_font());
    assert_eq!(draw.text_width("cat 90%"), (7.0 * LABEL_CHAR_WIDTH) as i32);

    let overlay = OverlayBox {
      rect: Rect {
        left: 10.0,
        top: 100.0,
        width: 20.0,
        height: 20.0,
      },
      caption: "cat 90%".to_string(),
      class_id: 1,
      score: 0.9,
    };
    let canvas = draw.draw_view(&view(None, vec![overlay]));
    let color = draw.class_color(1);
    // 标签底板位于框上方，宽度按字符数估计
    assert_eq!(canvas.get_pixel(10 + 70, 100 - 10), &color);
    assert_eq!(canvas.get_pixel(10 + 80, 100 - 10), &Rgb([0, 0, 0]));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    assert!(matches!(
      Draw::default().with_font_file(Path::new("/nonexistent/font.ttf")),
      Err(DrawError::Io(_))
    ));
  }
}
