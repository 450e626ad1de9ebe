//! Error types for mmap-appender
//!
//! mmap-appender 的错误类型

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// File operation that failed
///
/// 失败的文件操作步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Opening or creating the file
    ///
    /// 打开或创建文件
    Open,
    /// Acquiring the exclusive advisory lock
    ///
    /// 获取排他咨询锁
    Lock,
    /// Reading file metadata
    ///
    /// 读取文件元数据
    Stat,
    /// Growing the file to cover the next mapping
    ///
    /// 扩展文件以覆盖下一个映射
    Resize,
    /// Flushing a mapping or the file to storage
    ///
    /// 将映射或文件刷新到存储
    Sync,
    /// Creating a memory mapping
    ///
    /// 创建内存映射
    Map,
    /// Releasing the advisory lock
    ///
    /// 释放咨询锁
    Unlock,
    Seek,
    Read,
    Write,
    /// Shrinking the file to its logical length
    ///
    /// 将文件截断到逻辑长度
    Truncate,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Open => "open",
            Step::Lock => "lock",
            Step::Stat => "stat",
            Step::Resize => "resize",
            Step::Sync => "sync",
            Step::Map => "map",
            Step::Unlock => "unlock",
            Step::Seek => "seek",
            Step::Read => "read",
            Step::Write => "write",
            Step::Truncate => "truncate",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of an [`AppendLog`](super::AppendLog)
///
/// [`AppendLog`](super::AppendLog) 的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    /// Mapped and accepting appends
    ///
    /// 已映射，可以追加
    Open,
    /// A rotation failed; the log holds no mapping and must be closed
    ///
    /// 轮转失败；日志不再持有映射，必须关闭
    Failed,
    /// Closed explicitly
    ///
    /// 已显式关闭
    Closed,
}

impl fmt::Display for LogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogState::Open => "open",
            LogState::Failed => "failed",
            LogState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One failed step of a close sequence
///
/// close 过程中失败的单个步骤
#[derive(Debug)]
pub struct StepFailure {
    pub step: Step,
    pub source: io::Error,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.source)
    }
}

/// Error type for mmap-appender operations
///
/// mmap-appender 操作的错误类型
#[derive(Debug, Error)]
pub enum Error {
    /// Another writer holds the file's exclusive lock
    ///
    /// 其他写入者持有该文件的排他锁
    #[error("{} is locked by another writer / 文件已被其他写入者锁定", .path.display())]
    AlreadyLocked { path: PathBuf },

    /// An OS-level file operation failed
    ///
    /// 系统级文件操作失败
    #[error("{step} failed: {source}")]
    Io {
        step: Step,
        #[source]
        source: io::Error,
    },

    /// One or more close steps failed; every step was still attempted
    ///
    /// 一个或多个关闭步骤失败；所有步骤仍然都已执行
    #[error("close failed: {}", display_failures(.failures))]
    Close { failures: Vec<StepFailure> },

    /// Operation attempted on a closed or failed log
    ///
    /// 在已关闭或已失败的日志上执行操作
    #[error("log is {state} / 日志状态无效")]
    InvalidState { state: LogState },

    /// Tail scan found no boundary between data and zero padding
    ///
    /// 尾部扫描未找到数据与零填充之间的边界
    #[error("no data/padding boundary found in {} ({file_len} bytes)", .path.display())]
    RepairNotFound { path: PathBuf, file_len: u64 },

    /// `page_count * page_size` does not fit in memory
    ///
    /// `page_count * page_size` 超出可映射范围
    #[error("mapping of {page_count} pages of {page_size} bytes is too large")]
    MappingTooLarge { page_count: usize, page_size: usize },
}

fn display_failures(failures: &[StepFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Attach the failing step to an I/O error
    ///
    /// 为 I/O 错误附加失败的步骤
    pub(crate) fn io(step: Step) -> impl FnOnce(io::Error) -> Self {
        move |source| Error::Io { step, source }
    }

    /// Step that failed, if this error came from a single file operation
    ///
    /// 若错误来自单个文件操作，返回失败的步骤
    pub fn step(&self) -> Option<Step> {
        match self {
            Error::Io { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Convert from Error to io::Error for callers that surface a single I/O error type
///
/// 从 Error 转换到 io::Error，供只暴露单一 I/O 错误类型的调用方使用
impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io { source, .. } => source,
            Error::AlreadyLocked { .. } => {
                io::Error::new(io::ErrorKind::WouldBlock, err.to_string())
            }
            Error::InvalidState { .. } => {
                io::Error::new(io::ErrorKind::NotConnected, err.to_string())
            }
            Error::RepairNotFound { .. } => {
                io::Error::new(io::ErrorKind::NotFound, err.to_string())
            }
            Error::MappingTooLarge { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
            }
            Error::Close { .. } => io::Error::other(err.to_string()),
        }
    }
}

/// Result type alias using our custom Error type
///
/// 使用自定义 Error 类型的 Result 类型别名
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_error_lists_every_failed_step() {
        let err = Error::Close {
            failures: vec![
                StepFailure { step: Step::Truncate, source: io::Error::other("disk gone") },
                StepFailure { step: Step::Unlock, source: io::Error::other("bad fd") },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("truncate: disk gone"));
        assert!(msg.contains("unlock: bad fd"));
    }

    #[test]
    fn io_conversion_keeps_os_error() {
        let err = Error::Io {
            step: Step::Map,
            source: io::Error::from_raw_os_error(12),
        };
        assert_eq!(err.step(), Some(Step::Map));
        let io_err: io::Error = err.into();
        assert_eq!(io_err.raw_os_error(), Some(12));
    }

    #[test]
    fn lock_contention_maps_to_would_block() {
        let err = Error::AlreadyLocked { path: PathBuf::from("app.log") };
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::WouldBlock);
    }
}
