//! Append-only log writer based on memmap2
//!
//! 基于 memmap2 的只追加日志写入器
//!
//! Provides:
//! - [`AppendLog`]: Sequential writer backed by a fixed-size mapping that is
//!   remapped as the file grows
//! - [`repair_tail`]: Standalone recovery for files left zero-padded by a log
//!   that was never closed
//!
//! 提供：
//! - [`AppendLog`]: 由固定大小映射支撑的顺序写入器，文件增长时重新映射
//! - [`repair_tail`]: 独立的恢复函数，修复未关闭的日志留下的零填充文件
//!
//! # Lifecycle
//!
//! 1. [`AppendLog::open`] locks the file, grows it to cover one mapping past the
//!    last page boundary, and maps that region
//! 2. [`AppendLog::append`] copies into the mapping, rotating to the next region
//!    whenever it fills
//! 3. [`AppendLog::close`] truncates the file to exactly the bytes appended
//!
//! # 生命周期
//!
//! 1. [`AppendLog::open`] 锁定文件，将其扩展到最后一个页边界之后一个映射的大小，并映射该区域
//! 2. [`AppendLog::append`] 复制数据到映射中，映射写满时轮转到下一个区域
//! 3. [`AppendLog::close`] 将文件截断到恰好等于已追加的字节数
//!
//! Skipping step 3 leaves zero padding after the data. Run [`repair_tail`] on
//! the next start, or open with [`AppendLogOptions::repair_marker`].
//!
//! 跳过第 3 步会在数据之后留下零填充。可在下次启动时运行 [`repair_tail`]，
//! 或使用 [`AppendLogOptions::repair_marker`] 打开。

mod append_log;
mod error;
mod mapping;
mod options;
mod page;
mod repair;


// Re-export public API
// 重新导出公共 API
pub use append_log::AppendLog;
pub use error::{Error, LogState, Result, Step, StepFailure};
pub use options::{AppendLogOptions, DEFAULT_PAGE_COUNT};
pub use page::page_size;
pub use repair::{find_boundary, repair_tail, RepairOutcome};
