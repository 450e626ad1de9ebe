//! Open-time configuration for [`AppendLog`]
//!
//! [`AppendLog`] 的打开配置

use super::append_log::AppendLog;
use super::error::{Error, Result};
use super::repair::{repair_tail, RepairOutcome};
use std::num::NonZeroUsize;
use std::path::Path;
use tracing::{debug, warn};

/// Default mapping size in pages
///
/// 默认映射大小（内存页数）
pub const DEFAULT_PAGE_COUNT: NonZeroUsize = NonZeroUsize::new(5).unwrap();

/// Options for opening an [`AppendLog`]
///
/// 打开 [`AppendLog`] 的选项
///
/// # Examples
///
/// ```
/// # use mmap_appender::AppendLogOptions;
/// # use tempfile::tempdir;
/// # use std::num::NonZeroUsize;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let dir = tempdir()?;
/// # let path = dir.path().join("service.log");
/// let mut log = AppendLogOptions::new()
///     .page_count(NonZeroUsize::new(16).unwrap())
///     .repair_marker(b"\n--- recovered ---\n".to_vec())
///     .open(&path)?;
///
/// log.append(b"started\n")?;
/// log.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppendLogOptions {
    /// Mapping size in pages
    ///
    /// 映射大小（内存页数）
    page_count: NonZeroUsize,

    /// Marker written by a tail repair run before opening, `None` to skip it
    ///
    /// 打开前执行尾部修复时写入的标记；`None` 表示跳过修复
    repair_marker: Option<Vec<u8>>,
}

impl Default for AppendLogOptions {
    fn default() -> Self {
        Self {
            page_count: DEFAULT_PAGE_COUNT,
            repair_marker: None,
        }
    }
}

impl AppendLogOptions {
    /// Options with the default page count and no repair
    ///
    /// 默认页数且不修复的选项
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_count(mut self, page_count: NonZeroUsize) -> Self {
        self.page_count = page_count;
        self
    }

    /// Repair a zero-padded tail before opening, writing `marker` in its place
    ///
    /// 打开前修复零填充尾部，并在该位置写入 `marker`
    ///
    /// Without this, a file left padded by a crash is reopened at its padded
    /// length and new appends land after the zeros. An empty marker only trims.
    ///
    /// 不设置时，因崩溃而留有填充的文件会以填充后的长度重新打开，
    /// 新追加的数据会位于零字节之后。空标记表示只裁剪。
    pub fn repair_marker(mut self, marker: Vec<u8>) -> Self {
        self.repair_marker = Some(marker);
        self
    }

    #[inline]
    pub fn get_page_count(&self) -> NonZeroUsize {
        self.page_count
    }

    #[inline]
    pub fn get_repair_marker(&self) -> Option<&[u8]> {
        self.repair_marker.as_deref()
    }

    /// Open the log at `path` with these options
    ///
    /// 使用这些选项打开 `path` 处的日志
    ///
    /// When a repair marker is set and the file exists, [`repair_tail`] runs
    /// first. A tail with no detectable boundary is left as is and logged;
    /// other repair errors are returned.
    ///
    /// 设置了修复标记且文件存在时，会先执行 [`repair_tail`]。
    /// 无法检测到边界的尾部保持原样并记录日志；其他修复错误会被返回。
    pub fn open(&self, path: impl AsRef<Path>) -> Result<AppendLog> {
        let path = path.as_ref();

        if let Some(marker) = &self.repair_marker {
            if path.exists() {
                match repair_tail(path, marker) {
                    Ok(RepairOutcome::Repaired { boundary, removed }) => {
                        debug!(
                            path = %path.display(),
                            boundary,
                            removed,
                            "repaired tail before open"
                        );
                    }
                    Ok(_) => {}
                    Err(Error::RepairNotFound { file_len, .. }) => {
                        warn!(
                            path = %path.display(),
                            file_len,
                            "tail left unrepaired, opening as is"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        AppendLog::open(path, self.page_count)
    }
}
