// 该文件是 Shanan （山南西风） 项目的一部分。
// src/kernel.rs - YUV420 到 YYYYUV 张量的转换核
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

use crate::frame::YuvGeometry;

const NORM_CENTER: f32 = 128.0;
const NORM_SCALE: f32 = 1.0 / 128.0;

/// 被测量的转换核
///
/// 调用方保证 `src` 与 `dst` 的长度满足实现要求，实现不得分配内存。
pub trait Kernel {
  fn convert(&self, src: &[u8], dst: &mut [f32]);
}

impl<K: Kernel + ?Sized> Kernel for &K {
  fn convert(&self, src: &[u8], dst: &mut [f32]) {
    (**self).convert(src, dst)
  }
}

/// 将 `[0, 255]` 映射到约 `[-1, 1]`
#[inline(always)]
pub fn normalize(x: u8) -> f32 {
  (x as f32 - NORM_CENTER) * NORM_SCALE
}

/// 固定分辨率的 YUV420 -> Y|Y|Y|Y|U|V 转换
///
/// 每个 2x2 亮度块拆分到四个平面，色度平面原样下采样位置取值，
/// 输出平面内按列主序存放（偏移 `c * H/2 + r`）。
#[derive(Debug, Clone, Copy, Default)]
pub struct Yuv420ToYyyyuv<const W: u32, const H: u32> {
  _geometry: YuvGeometry<W, H>,
}

impl<const W: u32, const H: u32> Yuv420ToYyyyuv<W, H> {
  pub fn new() -> Self {
    Self {
      _geometry: YuvGeometry::new(),
    }
  }
}

impl<const W: u32, const H: u32> Kernel for Yuv420ToYyyyuv<W, H> {
  fn convert(&self, src: &[u8], dst: &mut [f32]) {
    let width = YuvGeometry::<W, H>::WIDTH;
    let half_w = width / 2;
    let half_h = YuvGeometry::<W, H>::HEIGHT / 2;
    let plane = YuvGeometry::<W, H>::PLANE_LEN;
    let u_base = YuvGeometry::<W, H>::LUMA_LEN;
    let v_base = u_base + YuvGeometry::<W, H>::CHROMA_LEN;

    let src = &src[..YuvGeometry::<W, H>::YUV_LEN];
    let dst = &mut dst[..YuvGeometry::<W, H>::TENSOR_LEN];

    for r in 0..half_h {
      let top = 2 * r * width;
      let bottom = top + width;
      let chroma = r * half_w;
      for c in 0..half_w {
        let out = c * half_h + r;
        dst[out] = normalize(src[top + 2 * c]);
        dst[out + plane] = normalize(src[top + 2 * c + 1]);
        dst[out + 2 * plane] = normalize(src[bottom + 2 * c]);
        dst[out + 3 * plane] = normalize(src[bottom + 2 * c + 1]);
        dst[out + 4 * plane] = normalize(src[u_base + chroma + c]);
        dst[out + 5 * plane] = normalize(src[v_base + chroma + c]);
      }
    }
  }
}
