// 该文件是 Wangyan （望眼） 项目的一部分。
// src/camera/image_camera.rs - 静态图片模拟摄像头
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

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use image::{ImageReader, RgbImage, imageops};
use tracing::{debug, error, info};
use url::Url;

use super::{
  CameraController, CameraDescription, CameraError, CameraProvider, CaptureThread, FrameSink,
  LensDirection, ResolutionPreset, parse_rotation,
};
use crate::frame::CameraFrame;
use crate::geometry::{Rotation, Size};
use crate::{FromUrl, FromUrlWithScheme};

const DEFAULT_FPS: f64 = 15.0;

/// 以固定帧率重复推送同一张图片
pub struct ImageCameraProvider {
  path: PathBuf,
  fps: f64,
  rotation: Rotation,
}

impl FromUrlWithScheme for ImageCameraProvider {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageCameraProvider {
  type Error = CameraError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(CameraError::SchemeMismatch(url.scheme().to_string()));
    }

    let fps = match crate::query_value(url, "fps") {
      None => DEFAULT_FPS,
      Some(value) => match value.parse::<f64>() {
        Ok(fps) if fps > 0.0 && fps.is_finite() => fps,
        _ => {
          return Err(CameraError::InvalidParameter { name: "fps", value });
        }
      },
    };

    Ok(Self {
      path: crate::url_path(url),
      fps,
      rotation: parse_rotation(url)?,
    })
  }
}

impl CameraProvider for ImageCameraProvider {
  type Controller = ImageCamera;

  fn available_cameras(&self) -> Result<Vec<CameraDescription>, CameraError> {
    if !self.path.is_file() {
      debug!("图片不存在: {}", self.path.display());
      return Ok(Vec::new());
    }

    Ok(vec![CameraDescription {
      name: self
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string()),
      uri: format!("image://{}", self.path.display()),
      lens_direction: LensDirection::Back,
      sensor_orientation: self.rotation,
    }])
  }

  fn open(
    &self,
    description: &CameraDescription,
    preset: ResolutionPreset,
  ) -> Result<Self::Controller, CameraError> {
    info!("打开图片摄像头: {}", self.path.display());
    let image = ImageReader::open(&self.path)?.decode()?.to_rgb8();
    let size = preset.size();
    let image = imageops::resize(
      &image,
      size.width,
      size.height,
      imageops::FilterType::Triangle,
    );

    Ok(ImageCamera {
      description: description.clone(),
      image: Arc::new(image),
      interval: Duration::from_secs_f64(1.0 / self.fps),
      capture: None,
    })
  }
}

pub struct ImageCamera {
  description: CameraDescription,
  image: Arc<RgbImage>,
  interval: Duration,
  capture: Option<CaptureThread>,
}

impl ImageCamera {
  pub fn from_image(description: CameraDescription, image: RgbImage, fps: f64) -> Self {
    Self {
      description,
      image: Arc::new(image),
      interval: Duration::from_secs_f64(1.0 / fps.max(f64::EPSILON)),
      capture: None,
    }
  }
}

impl CameraController for ImageCamera {
  fn description(&self) -> &CameraDescription {
    &self.description
  }

  fn preview_size(&self) -> Size {
    let (width, height) = self.image.dimensions();
    Size::new(width, height)
  }

  fn start_image_stream(&mut self, mut sink: FrameSink) -> Result<(), CameraError> {
    if self.is_streaming() {
      return Err(CameraError::AlreadyStreaming);
    }

    let image = self.image.clone();
    let interval = self.interval;
    let rotation = self.description.sensor_orientation;

    let capture = CaptureThread::spawn("image-camera", move |stop| {
      let start = Instant::now();
      let mut index = 0u64;
      while !stop.load(Ordering::SeqCst) {
        let frame = CameraFrame::from(image.as_ref().clone())
          .with_index(index, start.elapsed().as_millis() as u64)
          .with_rotation(rotation);
        if !sink(Ok(frame)) {
          debug!("帧接收端已关闭，停止推流");
          break;
        }
        index += 1;
        std::thread::sleep(interval);
      }
    })
    .inspect_err(|e| error!("启动图像流失败: {}", e))?;

    self.capture = Some(capture);
    Ok(())
  }

  fn stop_image_stream(&mut self) -> Result<(), CameraError> {
    match self.capture.take() {
      Some(mut capture) => capture.stop(),
      None => Ok(()),
    }
  }

  fn is_streaming(&self) -> bool {
    self.capture.as_ref().is_some_and(CaptureThread::is_running)
  }
}
