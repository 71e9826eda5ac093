// 该文件是 Wangyan （望眼） 项目的一部分。
// src/screen/worker.rs - 推理工作线程
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

use std::sync::Arc;
use std::sync::mpsc::{Sender, SyncSender, TrySendError, sync_channel};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{InferenceOutcome, UiEvent};
use crate::frame::CameraFrame;
use crate::model::Model;

struct Job {
  session: u64,
  frame: Arc<CameraFrame>,
}

/// 独占模型的推理线程，结果以 [`UiEvent::InferenceDone`] 发回界面线程
pub struct InferenceWorker {
  jobs: Option<SyncSender<Job>>,
  handle: Option<JoinHandle<()>>,
}

impl InferenceWorker {
  pub fn spawn<M: Model>(mut model: M, events: Sender<UiEvent>) -> std::io::Result<Self> {
    // 只留一个槽位，界面线程的忙标志保证同一时间最多一帧在推理
    let (jobs, rx) = sync_channel::<Job>(1);

    let handle = thread::Builder::new()
      .name("inference".to_string())
      .spawn(move || {
        for Job { session, frame } in rx {
          let now = Instant::now();
          let result = model.infer(&frame);
          debug!("第 {} 帧推理完成，耗时: {:.2?}", frame.index, now.elapsed());

          let outcome = InferenceOutcome {
            session,
            frame_size: frame.size(),
            rotation: frame.rotation,
            result,
          };
          if events.send(UiEvent::InferenceDone(outcome)).is_err() {
            warn!("界面线程已退出，停止推理");
            break;
          }
        }
        model.release();
        info!("推理线程退出，模型已释放");
      })?;

    Ok(Self {
      jobs: Some(jobs),
      handle: Some(handle),
    })
  }

  /// 提交一帧；线程忙或已退出时原样返回该帧
  pub fn submit(&self, session: u64, frame: Arc<CameraFrame>) -> Result<(), Arc<CameraFrame>> {
    let Some(jobs) = &self.jobs else {
      return Err(frame);
    };
    match jobs.try_send(Job { session, frame }) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => Err(job.frame),
    }
  }

  pub fn shutdown(&mut self) {
    // 关闭任务通道后线程会处理完当前帧并退出
    self.jobs.take();
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      warn!("推理线程异常退出");
    }
  }
}

impl Drop for InferenceWorker {
  fn drop(&mut self) {
    self.shutdown();
  }
}
