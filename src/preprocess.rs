// 该文件是 Guoyuan （果园） 项目的一部分。
// src/preprocess.rs - 图像预处理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{Rgb, RgbImage, imageops};
use tracing::debug;

use crate::frame::{LetterboxFrame, NchwTensor, PadRatio};

/// 将图像信箱填充为方形并转为模型输入张量。
///
/// 方形边长取宽高中的较大者，只在底部与右侧补黑边（左上角对齐），
/// 再缩放到 (W, H)，像素按 1/255 归一化并重排为通道优先布局。
/// 返回的比例描述方形相对原图各轴的拉伸量，供后处理把坐标映射回原图。
pub fn letterbox<const W: u32, const H: u32>(image: &RgbImage) -> LetterboxFrame<W, H> {
  let (cols, rows) = image.dimensions();
  let max_size = cols.max(rows);
  let x_pad = max_size - cols;
  let y_pad = max_size - rows;
  let ratio = PadRatio {
    x: max_size as f32 / cols as f32,
    y: max_size as f32 / rows as f32,
  };

  debug!(
    "信箱填充: {}x{} -> {}x{}, 右侧补 {} 像素, 底部补 {} 像素",
    cols, rows, max_size, max_size, x_pad, y_pad
  );

  // 中间缓冲都是本块局部量，块结束即释放
  let data = {
    let mut padded = RgbImage::from_pixel(max_size, max_size, Rgb([0u8, 0, 0]));
    imageops::replace(&mut padded, image, 0, 0);

    let resized = imageops::resize(&padded, W, H, imageops::FilterType::Triangle);

    let plane = (W as usize) * (H as usize);
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = (y as usize) * (W as usize) + (x as usize);
      data[idx] = pixel[0] as f32 / 255.0;
      data[plane + idx] = pixel[1] as f32 / 255.0;
      data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }
    data
  };

  LetterboxFrame {
    tensor: NchwTensor::from(data),
    ratio,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn square_image_has_unit_ratio() {
    let image = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
    let frame = letterbox::<8, 8>(&image);
    assert_eq!(frame.ratio, PadRatio { x: 1.0, y: 1.0 });
  }

  #[test]
  fn landscape_image_pads_bottom_only() {
    // 32x16: 方形边长 32, 只有纵向需要补 16 像素
    let image = RgbImage::from_pixel(32, 16, Rgb([0, 0, 0]));
    let frame = letterbox::<8, 8>(&image);
    assert_eq!(frame.ratio, PadRatio { x: 1.0, y: 2.0 });
  }

  #[test]
  fn portrait_image_pads_right_only() {
    let image = RgbImage::from_pixel(10, 40, Rgb([0, 0, 0]));
    let frame = letterbox::<8, 8>(&image);
    assert_eq!(frame.ratio, PadRatio { x: 4.0, y: 1.0 });
  }

  #[test]
  fn tensor_length_is_fixed_for_any_source() {
    for (w, h) in [(7u32, 13u32), (640, 480), (33, 33)] {
      let image = RgbImage::from_pixel(w, h, Rgb([128, 128, 128]));
      let frame = letterbox::<16, 16>(&image);
      assert_eq!(frame.tensor.len(), 3 * 16 * 16);
    }
  }

  #[test]
  fn values_are_normalized_channel_first() {
    // 全红图像: R 平面为 1.0, G/B 平面为 0.0
    let image = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
    let frame = letterbox::<4, 4>(&image);
    let data = frame.tensor.as_nchw();
    let plane = 4 * 4;
    assert!(data[..plane].iter().all(|&v| v == 1.0));
    assert!(data[plane..].iter().all(|&v| v == 0.0));
  }

  #[test]
  fn padded_region_is_black() {
    // 横向图像的下半部分是填充区, 缩放后应保持黑色
    let image = RgbImage::from_pixel(16, 8, Rgb([255, 255, 255]));
    let frame = letterbox::<8, 8>(&image);
    let data = frame.tensor.as_nchw();
    // 最后一行远离上下边界的插值影响, 必为填充黑
    for x in 0..8 {
      assert_eq!(data[7 * 8 + x], 0.0);
    }
  }
}
