use bytemuck::Pod;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// 数据集文件中单个数值的存储类型
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// 32 位浮点数
    #[value(name = "float", alias = "f32")]
    F32,
    /// 无符号 8 位整数
    #[value(name = "uint8", alias = "u8")]
    U8,
    /// 有符号 8 位整数
    #[value(name = "int8", alias = "i8")]
    I8,
}

impl ElementKind {
    /// 单个数值占用的字节数
    pub fn size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::U8 | Self::I8 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::F32 => "float",
            Self::U8 => "uint8",
            Self::I8 => "int8",
        }
    }
}

/// 可以从数据集文件中直接读取，并转换为 f32 参与训练和编码的数值类型
///
/// 窄整数到浮点数的转换只在这里发生
pub trait VectorElement: Pod + Send + Sync + 'static {
    const KIND: ElementKind;

    fn to_f32(self) -> f32;

    /// 将 src 逐个转换后写入 dst，两者长度必须一致
    fn convert_into(src: &[Self], dst: &mut [f32]) {
        assert_eq!(src.len(), dst.len(), "convert length mismatch");
        for (d, s) in dst.iter_mut().zip(src) {
            *d = s.to_f32();
        }
    }
}

impl VectorElement for f32 {
    const KIND: ElementKind = ElementKind::F32;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }

    fn convert_into(src: &[Self], dst: &mut [f32]) {
        dst.copy_from_slice(src);
    }
}

impl VectorElement for u8 {
    const KIND: ElementKind = ElementKind::U8;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl VectorElement for i8 {
    const KIND: ElementKind = ElementKind::I8;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self as f32
    }
}
