// 该文件是 Wangyan （望眼） 项目的一部分。
// src/output/directory_record.rs - 按日期目录记录画面
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

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{Datelike, Local};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::model::DetectResult;
use crate::output::Render;
use crate::output::draw::{Draw, DrawError};
use crate::screen::ScreenView;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体错误: {0}")]
  DrawError(#[from] DrawError),
}

/// 原始画面加标注文本，供之后整理数据集
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  /// 每个检测一行: `标签, 置信度, 左, 上, 右, 下`，坐标为竖直画面像素
  pub fn annotation(&self, result: &DetectResult) -> String {
    let mut text = String::new();
    for item in result.iter() {
      let [l, t, r, b] = item.bbox;
      let label = if self.label_with_name {
        item.label.clone()
      } else {
        item.class_id.to_string()
      };
      let _ = writeln!(text, "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}", label, item.score, l, t, r, b);
    }
    text
  }

  fn save(&self, view: &ScreenView<'_>, path: &Path) -> Result<bool, DirectoryRecordOutputError> {
    let Some(frame) = view.preview else {
      return Ok(false);
    };
    frame.to_upright_image().save(path)?;

    let annotation = view.detections.map(|r| self.annotation(r)).unwrap_or_default();
    std::fs::write(path.with_extension("txt"), annotation)?;
    Ok(true)
  }
}

pub enum DrawWrapper {
  Draw(Box<Draw>),
  Record(Record),
}

impl DrawWrapper {
  fn save_view(&self, view: &ScreenView<'_>, path: &Path) -> Result<bool, DirectoryRecordOutputError> {
    match self {
      DrawWrapper::Draw(draw) => {
        draw.draw_view(view).save(path)?;
        Ok(true)
      }
      DrawWrapper::Record(record) => record.save(view, path),
    }
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: DrawWrapper,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch(
        uri.scheme().to_string(),
      ));
    }

    let draw = match crate::query_value(uri, "record").as_deref() {
      Some("id") => DrawWrapper::Record(Record {
        label_with_name: false,
      }),
      Some(_) => DrawWrapper::Record(Record {
        label_with_name: true,
      }),
      None => DrawWrapper::Draw(Box::new(Draw::from_url_query(uri)?)),
    };

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: crate::url_path(uri),
      draw,
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn is_record(&self) -> bool {
    matches!(self.draw, DrawWrapper::Record(_))
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_view(&self, view: &ScreenView<'_>) -> Result<(), Self::Error> {
    if view.size.is_empty() || !(self.always || view.has_detections()) {
      return Ok(());
    }

    let path = self.frame_path()?;
    if self.draw.save_view(view, &path)? {
      debug!("记录画面: {}", path.display());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::CameraFrame;
  use crate::geometry::{Rect, Size};
  use crate::model::{Detection, ModelOptions};
  use crate::screen::{OverlayBox, START_CAPTION, ScreenStats};
  use image::{Rgb, RgbImage};

  fn saved_files(root: &Path, extension: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().is_some_and(|e| e == extension) {
          found.push(path);
        }
      }
    }
    found
  }

  fn detections() -> DetectResult {
    DetectResult::from_candidates(
      vec![Detection {
        bbox: [1.0, 2.0, 5.0, 6.0],
        score: 0.75,
        label: "cat".to_string(),
        class_id: 15,
      }],
      &ModelOptions::default(),
    )
  }

  fn overlay() -> OverlayBox {
    OverlayBox {
      rect: Rect {
        left: 2.0,
        top: 4.0,
        width: 8.0,
        height: 8.0,
      },
      caption: "cat 75%".to_string(),
      class_id: 15,
      score: 0.75,
    }
  }

  fn view<'a>(
    frame: &'a CameraFrame,
    detections: Option<&'a DetectResult>,
    boxes: Vec<OverlayBox>,
  ) -> ScreenView<'a> {
    ScreenView {
      size: Size::new(20, 30),
      preview: Some(frame),
      detections,
      boxes,
      button: START_CAPTION,
      notifications: Vec::new(),
      stats: ScreenStats::default(),
    }
  }

  #[test]
  fn annotation_uses_names_or_ids() {
    let result = detections();
    assert_eq!(
      Record {
        label_with_name: true
      }
      .annotation(&result),
      "cat, 0.7500, 1.0, 2.0, 5.0, 6.0\n"
    );
    assert_eq!(
      Record {
        label_with_name: false
      }
      .annotation(&result),
      "15, 0.7500, 1.0, 2.0, 5.0, 6.0\n"
    );
  }

  #[test]
  fn skips_empty_views_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = CameraFrame::from(RgbImage::from_pixel(8, 8, Rgb([9, 9, 9])));

    let url = Url::parse(&format!("folder://{}", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(!output.is_record());
    output.render_view(&view(&frame, None, Vec::new())).unwrap();
    assert!(saved_files(dir.path(), "png").is_empty());

    output.render_view(&view(&frame, None, vec![overlay()])).unwrap();
    assert_eq!(saved_files(dir.path(), "png").len(), 1);

    let always_dir = dir.path().join("always");
    let url = Url::parse(&format!("folder://{}?always", always_dir.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.render_view(&view(&frame, None, Vec::new())).unwrap();
    assert_eq!(saved_files(&always_dir, "png").len(), 1);
  }

  #[test]
  fn record_mode_saves_raw_frame_and_annotation() {
    let dir = tempfile::tempdir().unwrap();
    let frame = CameraFrame::from(RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])));
    let result = detections();

    let url = Url::parse(&format!("folder://{}?record=name", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(output.is_record());
    output
      .render_view(&view(&frame, Some(&result), vec![overlay()]))
      .unwrap();

    let images = saved_files(dir.path(), "png");
    assert_eq!(images.len(), 1);
    let saved = image::open(&images[0]).unwrap();
    assert_eq!((saved.width(), saved.height()), (8, 6));

    let text = std::fs::read_to_string(images[0].with_extension("txt")).unwrap();
    assert_eq!(text, "cat, 0.7500, 1.0, 2.0, 5.0, 6.0\n");
  }
}
