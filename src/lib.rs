//! Memory-mapped append-only log writer
//!
//! 基于内存映射的只追加日志写入器
//!
//! This library appends bytes to a file through a fixed-size memory mapping that
//! is transparently remapped as the file grows, and repairs files left
//! over-allocated by a writer that never closed.
//!
//! 本库通过固定大小的内存映射向文件追加字节，文件增长时透明地重新映射；
//! 并可修复因写入者未关闭而留下预分配空间的文件。
//!
//! # Features
//!
//! - **Plain memory copies**: Appends are `memcpy`s into mapped memory
//! - **Transparent growth**: Full mappings are flushed and replaced by the next region
//! - **Exact length on close**: Over-allocated pages are trimmed away
//! - **Single writer**: An exclusive advisory lock rejects a second open
//! - **Crash repair**: [`repair_tail`] trims the zero padding a crash leaves behind
//!
//! # 特性
//!
//! - **纯内存拷贝**：追加即向映射内存 `memcpy`
//! - **透明增长**：写满的映射被刷新并替换为下一个区域
//! - **关闭时长度精确**：预分配的页会被裁剪
//! - **单一写入者**：排他咨询锁拒绝第二次打开
//! - **崩溃修复**：[`repair_tail`] 裁剪崩溃留下的零填充
//!
//! # Quick Start
//!
//! ```
//! use mmap_appender::{AppendLog, repair_tail, RepairOutcome};
//! # use tempfile::tempdir;
//! # use std::num::NonZeroUsize;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dir = tempdir()?;
//! # let path = dir.path().join("app.log");
//!
//! // Crash-free run
//! // 正常运行
//! let mut log = AppendLog::open(&path, NonZeroUsize::new(2).unwrap())?;
//! log.append(b"hello\n")?;
//! log.close()?;
//! assert_eq!(std::fs::read(&path)?, b"hello\n");
//!
//! // A log dropped without close leaves padding; repair it
//! // 未关闭就被 drop 的日志会留下填充；修复它
//! let mut log = AppendLog::open(&path, NonZeroUsize::new(2).unwrap())?;
//! log.append(b"world\n")?;
//! drop(log);
//! assert!(std::fs::metadata(&path)?.len() > 12);
//!
//! assert!(matches!(repair_tail(&path, b"")?, RepairOutcome::Repaired { .. }));
//! assert_eq!(std::fs::read(&path)?, b"hello\nworld\n");
//! # Ok(())
//! # }
//! ```
//!
//! # Main Types
//!
//! - [`AppendLog`]: Memory-mapped append-only writer
//! - [`AppendLogOptions`]: Open configuration (page count, repair on open)
//! - [`repair_tail`]: Crash tail repair
//! - [`Error`]: Error type naming the failing step
//!
//! # 主要类型
//!
//! - [`AppendLog`]: 基于内存映射的只追加写入器
//! - [`AppendLogOptions`]: 打开配置（页数、打开时修复）
//! - [`repair_tail`]: 崩溃尾部修复
//! - [`Error`]: 标明失败步骤的错误类型

mod log;

pub use log::{
    find_boundary, page_size, repair_tail, AppendLog, AppendLogOptions, Error, LogState,
    RepairOutcome, Result, Step, StepFailure, DEFAULT_PAGE_COUNT,
};
