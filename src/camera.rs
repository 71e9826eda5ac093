// 该文件是 Wangyan （望眼） 项目的一部分。
// src/camera.rs - 摄像头访问
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

//! # 摄像头模块
//!
//! 摄像头由外部库负责采集，这里只定义屏幕需要的最小接口：
//! 枚举设备、打开设备、推送帧流、停止。
//!
//! ## URL Scheme
//!
//! - `image:///path/to/still.png?fps=15&rotation=90` 以静态图片模拟摄像头
//! - `v4l:///dev/video0?rotation=0` Video4Linux 设备（需要 `v4l_camera` 特性）

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::FromUrl;
use crate::frame::CameraFrame;
use crate::geometry::{Rotation, Size};

#[cfg(feature = "image_camera")]
mod image_camera;
#[cfg(feature = "image_camera")]
pub use self::image_camera::{ImageCamera, ImageCameraProvider};

#[cfg(feature = "v4l_camera")]
mod v4l_camera;
#[cfg(feature = "v4l_camera")]
pub use self::v4l_camera::{V4lCamera, V4lCameraProvider};

#[derive(Error, Debug)]
pub enum CameraError {
  #[error("没有可用的摄像头")]
  NoCameraAvailable,
  #[error("图像流已经在运行")]
  AlreadyStreaming,
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效参数 {name}: {value}")]
  InvalidParameter { name: &'static str, value: String },
  #[error("图像错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("设备错误: {0}")]
  Device(String),
  #[error("采集线程异常退出")]
  Thread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensDirection {
  Back,
  Front,
  External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDescription {
  pub name: String,
  pub uri: String,
  pub lens_direction: LensDirection,
  pub sensor_orientation: Rotation,
}

/// 采集分辨率预设（传感器原始方向，宽大于高）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionPreset {
  Low,
  #[default]
  Medium,
  High,
}

impl ResolutionPreset {
  pub fn size(self) -> Size {
    match self {
      ResolutionPreset::Low => Size::new(320, 240),
      ResolutionPreset::Medium => Size::new(640, 480),
      ResolutionPreset::High => Size::new(1280, 720),
    }
  }
}

impl FromStr for ResolutionPreset {
  type Err = CameraError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "low" => Ok(ResolutionPreset::Low),
      "medium" => Ok(ResolutionPreset::Medium),
      "high" => Ok(ResolutionPreset::High),
      _ => Err(CameraError::InvalidParameter {
        name: "preset",
        value: s.to_string(),
      }),
    }
  }
}

/// 帧接收端，在采集线程上被调用；返回 `false` 时停止推流。
/// 采集中途失败时以 `Err` 调用一次，随后采集线程退出。
pub type FrameSink = Box<dyn FnMut(Result<CameraFrame, CameraError>) -> bool + Send + 'static>;

pub trait CameraController: Send {
  fn description(&self) -> &CameraDescription;
  fn preview_size(&self) -> Size;
  /// 设备打开失败等启动错误在返回前报告
  fn start_image_stream(&mut self, sink: FrameSink) -> Result<(), CameraError>;
  /// 重复调用无副作用
  fn stop_image_stream(&mut self) -> Result<(), CameraError>;
  fn is_streaming(&self) -> bool;
}

pub trait CameraProvider {
  type Controller: CameraController;

  fn available_cameras(&self) -> Result<Vec<CameraDescription>, CameraError>;
  fn open(
    &self,
    description: &CameraDescription,
    preset: ResolutionPreset,
  ) -> Result<Self::Controller, CameraError>;
}

/// 优先选择后置摄像头，否则取第一个
pub fn select_camera(cameras: &[CameraDescription]) -> Result<&CameraDescription, CameraError> {
  cameras
    .iter()
    .find(|c| c.lens_direction == LensDirection::Back)
    .or_else(|| cameras.first())
    .ok_or(CameraError::NoCameraAvailable)
}

pub(crate) fn parse_rotation(url: &Url) -> Result<Rotation, CameraError> {
  match crate::query_value(url, "rotation") {
    None => Ok(Rotation::Deg0),
    Some(value) => value
      .parse::<u32>()
      .ok()
      .and_then(Rotation::from_degrees)
      .ok_or(CameraError::InvalidParameter {
        name: "rotation",
        value,
      }),
  }
}

/// 后台采集线程，停止时等待线程退出
pub(crate) struct CaptureThread {
  stop: Arc<AtomicBool>,
  handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
  pub(crate) fn spawn<F>(name: &str, body: F) -> Result<Self, CameraError>
  where
    F: FnOnce(Arc<AtomicBool>) + Send + 'static,
  {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = stop.clone();
    let handle = thread::Builder::new()
      .name(name.to_string())
      .spawn(move || body(flag))?;
    debug!("采集线程 {} 已启动", name);

    Ok(Self {
      stop,
      handle: Some(handle),
    })
  }

  pub(crate) fn is_running(&self) -> bool {
    self.handle.as_ref().is_some_and(|h| !h.is_finished())
  }

  pub(crate) fn stop(&mut self) -> Result<(), CameraError> {
    self.stop.store(true, Ordering::SeqCst);
    if let Some(handle) = self.handle.take() {
      handle.join().map_err(|_| CameraError::Thread)?;
    }
    Ok(())
  }
}

impl Drop for CaptureThread {
  fn drop(&mut self) {
    if let Err(e) = self.stop() {
      warn!("停止采集线程失败: {}", e);
    }
  }
}

/// 按 URL 方案选择的摄像头来源
pub enum CameraSource {
  #[cfg(feature = "image_camera")]
  Image(ImageCameraProvider),
  #[cfg(feature = "v4l_camera")]
  V4l(V4lCameraProvider),
}

pub enum CameraWrapper {
  #[cfg(feature = "image_camera")]
  Image(ImageCamera),
  #[cfg(feature = "v4l_camera")]
  V4l(V4lCamera),
}

impl FromUrl for CameraSource {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "image_camera")]
      "image" => Ok(CameraSource::Image(ImageCameraProvider::from_url(url)?)),
      #[cfg(feature = "v4l_camera")]
      "v4l" => Ok(CameraSource::V4l(V4lCameraProvider::from_url(url)?)),
      other => Err(CameraError::SchemeMismatch(other.to_string())),
    }
  }
}

impl CameraProvider for CameraSource {
  type Controller = CameraWrapper;

  fn available_cameras(&self) -> Result<Vec<CameraDescription>, CameraError> {
    match self {
      #[cfg(feature = "image_camera")]
      CameraSource::Image(provider) => provider.available_cameras(),
      #[cfg(feature = "v4l_camera")]
      CameraSource::V4l(provider) => provider.available_cameras(),
    }
  }

  fn open(
    &self,
    description: &CameraDescription,
    preset: ResolutionPreset,
  ) -> Result<Self::Controller, CameraError> {
    match self {
      #[cfg(feature = "image_camera")]
      CameraSource::Image(provider) => provider.open(description, preset).map(CameraWrapper::Image),
      #[cfg(feature = "v4l_camera")]
      CameraSource::V4l(provider) => provider.open(description, preset).map(CameraWrapper::V4l),
    }
  }
}

impl CameraController for CameraWrapper {
  fn description(&self) -> &CameraDescription {
    match self {
      #[cfg(feature = "image_camera")]
      CameraWrapper::Image(camera) => camera.description(),
      #[cfg(feature = "v4l_camera")]
      CameraWrapper::V4l(camera) => camera.description(),
    }
  }

  fn preview_size(&self) -> Size {
    match self {
      #[cfg(feature = "image_camera")]
      CameraWrapper::Image(camera) => camera.preview_size(),
      #[cfg(feature = "v4l_camera")]
      CameraWrapper::V4l(camera) => camera.preview_size(),
    }
  }

  fn start_image_stream(&mut self, sink: FrameSink) -> Result<(), CameraError> {
    match self {
      #[cfg(feature = "image_camera")]
      CameraWrapper::Image(camera) => camera.start_image_stream(sink),
      #[cfg(feature = "v4l_camera")]
      CameraWrapper::V4l(camera) => camera.start_image_stream(sink),
    }
  }

  fn stop_image_stream(&mut self) -> Result<(), CameraError> {
    match self {
      #[cfg(feature = "image_camera")]
      CameraWrapper::Image(camera) => camera.stop_image_stream(),
      #[cfg(feature = "v4l_camera")]
      CameraWrapper::V4l(camera) => camera.stop_image_stream(),
    }
  }

  fn is_streaming(&self) -> bool {
    match self {
      #[cfg(feature = "image_camera")]
      CameraWrapper::Image(camera) => camera.is_streaming(),
      #[cfg(feature = "v4l_camera")]
      CameraWrapper::V4l(camera) => camera.is_streaming(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn describe(name: &str, lens_direction: LensDirection) -> CameraDescription {
    CameraDescription {
      name: name.to_string(),
      uri: format!("test://{name}"),
      lens_direction,
      sensor_orientation: Rotation::Deg90,
    }
  }

  #[test]
  fn select_prefers_back_camera() {
    let cameras = vec![
      describe("front", LensDirection::Front),
      describe("back", LensDirection::Back),
    ];
    assert_eq!(select_camera(&cameras).unwrap().name, "back");
  }

  #[test]
  fn select_falls_back_to_first() {
    let cameras = vec![
      describe("usb", LensDirection::External),
      describe("front", LensDirection::Front),
    ];
    assert_eq!(select_camera(&cameras).unwrap().name, "usb");
    assert!(matches!(
      select_camera(&[]),
      Err(CameraError::NoCameraAvailable)
    ));
  }

  #[test]
  fn preset_parsing() {
    assert_eq!("HIGH".parse::<ResolutionPreset>().unwrap(), ResolutionPreset::High);
    assert_eq!(ResolutionPreset::Low.size(), Size::new(320, 240));
    assert!("ultra".parse::<ResolutionPreset>().is_err());
  }

  #[test]
  fn rotation_query() {
    let url = Url::parse("image:///a.png?rotation=270").unwrap();
    assert_eq!(parse_rotation(&url).unwrap(), Rotation::Deg270);
    let url = Url::parse("image:///a.png?rotation=45").unwrap();
    assert!(parse_rotation(&url).is_err());
    let url = Url::parse("image:///a.png").unwrap();
    assert_eq!(parse_rotation(&url).unwrap(), Rotation::Deg0);
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://camera.local/stream").unwrap();
    assert!(matches!(
      CameraSource::from_url(&url),
      Err(CameraError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
