//! Tail repair for logs left zero-padded by an unclean shutdown
//!
//! 修复因非正常关闭而留下零填充尾部的日志文件
//!
//! A log that is dropped or killed before [`AppendLog::close`](super::AppendLog::close)
//! keeps its over-allocated length: the true data is followed by NUL bytes up
//! to the end of the last mapping. [`repair_tail`] finds the end of the data
//! and replaces the padding with a marker.
//!
//! 在 [`AppendLog::close`](super::AppendLog::close) 之前被 drop 或被终止的日志
//! 会保留预分配的长度：真实数据之后跟着直到最后一个映射末尾的 NUL 字节。
//! [`repair_tail`] 找到数据末尾并用标记替换填充。
//!
//! # Heuristic
//!
//! The boundary is a byte that is non-zero followed by two zero bytes, located
//! by binary search. Content that itself contains "non-zero, zero, zero" can
//! be mistaken for the boundary, and everything after it is then discarded.
//!
//! # 启发式
//!
//! 边界定义为一个非零字节后跟两个零字节，通过二分查找定位。
//! 若内容本身包含"非零、零、零"序列，可能被误判为边界，其后的数据将被丢弃。

use super::append_log::lock_exclusive;
use super::error::{Error, Result, Step};
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Result of a successful [`repair_tail`]
///
/// [`repair_tail`] 成功后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The file is empty
    ///
    /// 文件为空
    Empty,
    /// The last byte is non-zero; the file was closed cleanly or already repaired
    ///
    /// 最后一个字节非零；文件已正常关闭或已修复
    Clean,
    /// Padding starting at `boundary` was replaced by the marker
    ///
    /// 从 `boundary` 开始的填充已被标记替换
    Repaired {
        /// Offset of the first padding byte
        ///
        /// 第一个填充字节的偏移
        boundary: u64,
        /// Bytes dropped from the end of the file, before the marker was written
        ///
        /// 写入标记之前从文件末尾移除的字节数
        removed: u64,
    },
}

/// Trim the zero padding at the end of `path` and write `marker` in its place
///
/// 裁剪 `path` 末尾的零填充并在该位置写入 `marker`
///
/// Succeeds without changes if the file is empty or its last byte is non-zero,
/// so running it twice is the same as running it once. An empty `marker`
/// truncates only.
///
/// 若文件为空或最后一个字节非零，则不做修改直接成功，因此重复执行与执行一次效果相同。
/// 空的 `marker` 表示只截断。
///
/// # Examples
///
/// ```
/// # use mmap_appender::{repair_tail, RepairOutcome};
/// # use tempfile::tempdir;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let dir = tempdir()?;
/// # let path = dir.path().join("crashed.log");
/// let mut bytes = b"0123456789".to_vec();
/// bytes.resize(32, 0);
/// std::fs::write(&path, &bytes)?;
///
/// let outcome = repair_tail(&path, b"\n")?;
/// assert_eq!(outcome, RepairOutcome::Repaired { boundary: 10, removed: 22 });
/// assert_eq!(std::fs::read(&path)?, b"0123456789\n");
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - `AlreadyLocked` if an [`AppendLog`](super::AppendLog) has the file open
/// - `RepairNotFound` if no boundary is located
/// - `Io` with the failing step for any file operation error
///
/// # Errors
/// - 文件正被 [`AppendLog`](super::AppendLog) 打开时返回 `AlreadyLocked`
/// - 找不到边界时返回 `RepairNotFound`
/// - 文件操作出错时返回带失败步骤的 `Io`
pub fn repair_tail(path: impl AsRef<Path>, marker: &[u8]) -> Result<RepairOutcome> {
    let path = path.as_ref();

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(Error::io(Step::Open))?;
    // Refuse to trim a file an open log is still writing
    lock_exclusive(&file, path)?;

    let file_len = file.metadata().map_err(Error::io(Step::Stat))?.len();
    if file_len == 0 {
        return Ok(RepairOutcome::Empty);
    }

    file.seek(SeekFrom::End(-1)).map_err(Error::io(Step::Seek))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).map_err(Error::io(Step::Read))?;
    if last[0] != 0 {
        debug!(path = %path.display(), file_len, "last byte is not NUL, nothing to repair");
        return Ok(RepairOutcome::Clean);
    }

    let boundary = match find_boundary(&mut file, file_len).map_err(Error::io(Step::Read))? {
        Some(boundary) => boundary,
        None => {
            warn!(path = %path.display(), file_len, "no data/padding boundary found");
            return Err(Error::RepairNotFound {
                path: path.to_path_buf(),
                file_len,
            });
        }
    };

    file.set_len(boundary + marker.len() as u64)
        .map_err(Error::io(Step::Truncate))?;
    if !marker.is_empty() {
        file.seek(SeekFrom::Start(boundary)).map_err(Error::io(Step::Seek))?;
        file.write_all(marker).map_err(Error::io(Step::Write))?;
    }
    file.sync_data().map_err(Error::io(Step::Sync))?;

    let removed = file_len - boundary;
    debug!(
        path = %path.display(),
        boundary,
        removed,
        marker_len = marker.len(),
        "tail repaired"
    );
    Ok(RepairOutcome::Repaired { boundary, removed })
}

/// Binary-search `[0, len]` of `reader` for the end of the data
///
/// 在 `reader` 的 `[0, len]` 范围内二分查找数据末尾
///
/// Returns the offset just past a non-zero byte that is followed by two zero
/// bytes, or `None` when the search range is exhausted. Bytes past the end of
/// the reader count as zero.
///
/// 返回后跟两个零字节的非零字节之后的偏移；搜索范围耗尽时返回 `None`。
/// 超出 reader 末尾的字节按零处理。
pub fn find_boundary<R: Read + Seek>(reader: &mut R, len: u64) -> io::Result<Option<u64>> {
    let mut low = 0u64;
    let mut high = len;

    while low <= high {
        let middle = low + (high - low) / 2;
        let sample = read_sample(reader, middle)?;

        if sample[0] != 0 && sample[1] == 0 && sample[2] == 0 {
            return Ok(Some(middle + 1));
        }

        if sample[0] == 0 {
            match middle.checked_sub(1) {
                Some(next) => high = next,
                None => break,
            }
        } else {
            low = middle + 1;
        }
    }

    Ok(None)
}

/// Read up to three bytes at `pos`, zero-filling anything past EOF
fn read_sample<R: Read + Seek>(reader: &mut R, pos: u64) -> io::Result<[u8; 3]> {
    let mut sample = [0u8; 3];
    reader.seek(SeekFrom::Start(pos))?;

    let mut filled = 0;
    while filled < sample.len() {
        match reader.read(&mut sample[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(sample)
}
