// 该文件是 Guoyuan （果园） 项目的一部分。
// src/task.rs - 任务流程
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

use tracing::info;
use url::Url;

use crate::{
  FromUrl,
  app::App,
  input::ImageFileInput,
  model::{DetectResult, FruitLabel, Yolov7Builder},
  output::{Render, draw::Canvas},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, app: &mut App, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 单次任务：加载模型、读取一张图像、推理并渲染。
///
/// 每一步都等待上一步完成后才开始，没有重试，也没有中途取消。
pub struct OneShotTask;

impl<'a, O> Task<&'a Url, Yolov7Builder, O> for OneShotTask
where
  O: Render<Canvas, DetectResult<FruitLabel>>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    app: &mut App,
    input: &'a Url,
    model: Yolov7Builder,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let now = std::time::Instant::now();
    app.load_model(model)?;
    info!("模型就绪，耗时: {:.2?}", now.elapsed());

    let input = ImageFileInput::from_url(input)?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let count = app.upload_image(input, &output)?;
    info!(
      "推理与渲染完成，耗时: {:.2?}，检测到 {} 个目标",
      now.elapsed(),
      count
    );

    Ok(())
  }
}
