//! 统一错误类型定义.
//!
//! 所有 zhen crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// zhen 统一错误类型
#[derive(Debug, Error)]
pub enum ZhenError {
    /// 无效参数 (空数据块、越界的位数等), 由调用方修正, 内部从不重试
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 内存分配失败, 当前调用中止, 实例仍可继续使用
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 码流格式错误, 只影响当前 NAL 单元
    #[error("码流格式错误: {0}")]
    MalformedBitstream(String),

    /// 数据不足, 需要更多输入
    #[error("数据不足, 需要更多输入")]
    NeedMoreData,

    /// 写入目标空间不足
    #[error("写入缓冲区已满: {0}")]
    BufferExhausted(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),
}

impl ZhenError {
    /// 是否为码流格式错误
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedBitstream(_))
    }
}

/// zhen 统一 Result 类型
pub type ZhenResult<T> = Result<T, ZhenError>;
