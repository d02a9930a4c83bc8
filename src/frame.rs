// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - YUV420 帧与 YYYYUV 张量缓冲区定义
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

/// 张量中的平面数: Y 左上 | Y 右上 | Y 左下 | Y 右下 | U | V
pub const TENSOR_PLANES: usize = 6;

/// 固定分辨率下 YUV420 帧与 YYYYUV 张量的尺寸关系
#[derive(Debug, Clone, Copy, Default)]
pub struct YuvGeometry<const W: u32, const H: u32>;

impl<const W: u32, const H: u32> YuvGeometry<W, H> {
  const EVEN: () = assert!(
    W > 0 && H > 0 && W % 2 == 0 && H % 2 == 0,
    "YUV420 的宽高必须为非零偶数"
  );

  pub const WIDTH: usize = W as usize;
  pub const HEIGHT: usize = H as usize;
  /// 亮度平面字节数
  pub const LUMA_LEN: usize = Self::WIDTH * Self::HEIGHT;
  /// 单个色度平面字节数
  pub const CHROMA_LEN: usize = (Self::WIDTH / 2) * (Self::HEIGHT / 2);
  /// 缩放后的 YUV420 缓冲区长度
  pub const YUV_LEN: usize = Self::WIDTH * Self::HEIGHT * 3 / 2;
  /// 张量单个平面的元素数
  pub const PLANE_LEN: usize = (Self::WIDTH / 2) * (Self::HEIGHT / 2);
  /// 网络输入张量的元素数
  pub const TENSOR_LEN: usize = Self::PLANE_LEN * TENSOR_PLANES;

  pub fn new() -> Self {
    #[allow(clippy::let_unit_value)]
    let () = Self::EVEN;
    Self
  }

  pub fn width(&self) -> usize {
    Self::WIDTH
  }

  pub fn height(&self) -> usize {
    Self::HEIGHT
  }
}

fn grow<T: Clone + Default>(buf: &mut Vec<T>, len: usize) -> &mut [T] {
  if buf.len() < len {
    buf.resize(len, T::default());
  }
  &mut buf[..len]
}

/// 试验所用的工作缓冲区
///
/// 两个缓冲区在首次使用时分配，此后只增不减，整个进程生命周期内复用。
#[derive(Debug, Default)]
pub struct Workspace<const W: u32, const H: u32> {
  resized: Vec<u8>,
  net_input: Vec<f32>,
}

impl<const W: u32, const H: u32> Workspace<W, H> {
  pub fn new() -> Self {
    YuvGeometry::<W, H>::new();
    Self::default()
  }

  /// 获取（必要时扩容）缩放后的 YUV 缓冲区与网络输入缓冲区
  pub fn buffers(&mut self) -> (&mut [u8], &mut [f32]) {
    let resized = grow(&mut self.resized, YuvGeometry::<W, H>::YUV_LEN);
    let net_input = grow(&mut self.net_input, YuvGeometry::<W, H>::TENSOR_LEN);
    (resized, net_input)
  }

  pub fn resized_capacity(&self) -> usize {
    self.resized.len()
  }

  pub fn net_input_capacity(&self) -> usize {
    self.net_input.len()
  }
}

impl<const W: u32, const H: u32> From<Vec<u8>> for Workspace<W, H> {
  /// 用已有的 YUV 数据预填充工作区，长度不足时会在取用时补零
  fn from(resized: Vec<u8>) -> Self {
    YuvGeometry::<W, H>::new();
    Self {
      resized,
      net_input: Vec::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn geometry_matches_production_size() {
    type G = YuvGeometry<320, 640>;
    assert_eq!(G::YUV_LEN, 320 * 640 * 3 / 2);
    assert_eq!(G::PLANE_LEN, 160 * 320);
    assert_eq!(G::TENSOR_LEN, 160 * 320 * 6);
  }

  #[test]
  fn buffers_are_lazily_sized() {
    let mut ws = Workspace::<4, 4>::new();
    assert_eq!(ws.resized_capacity(), 0);
    assert_eq!(ws.net_input_capacity(), 0);

    let (src, dst) = ws.buffers();
    assert_eq!(src.len(), 24);
    assert_eq!(dst.len(), 24);
  }

  #[test]
  fn buffers_never_shrink() {
    let mut ws = Workspace::<4, 4>::from(vec![7u8; 100]);
    let (src, _) = ws.buffers();
    assert_eq!(src.len(), 24);
    assert!(src.iter().all(|&b| b == 7));
    assert_eq!(ws.resized_capacity(), 100);
  }

  #[test]
  fn buffers_are_reused_between_calls() {
    let mut ws = Workspace::<4, 4>::new();
    {
      let (src, dst) = ws.buffers();
      src[3] = 42;
      dst[5] = 1.5;
    }
    let (src, dst) = ws.buffers();
    assert_eq!(src[3], 42);
    assert_eq!(dst[5], 1.5);
  }
}
