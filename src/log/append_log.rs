//! Memory-mapped append-only log writer
//!
//! 基于内存映射的只追加日志写入器

use super::error::{Error, LogState, Result, Step, StepFailure};
use super::mapping::MappedWindow;
use super::page::{align_down, offset_in_page, page_size};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Append-only log file written through a fixed-size memory mapping
///
/// 通过固定大小内存映射写入的只追加日志文件
///
/// Appends are copied into a mapping of `page_count` pages. When the mapping is
/// full, the file is grown by one more mapping, the full mapping is flushed and
/// unmapped, and a new mapping is created after it.
///
/// 追加的数据被复制到 `page_count` 个内存页大小的映射中。映射写满后，
/// 文件再扩展一个映射的大小，写满的映射被刷新并解除映射，然后在其后创建新的映射。
///
/// # File Length
///
/// While open, the file is longer than the data written to it: it always covers
/// the whole current mapping. [`close`](Self::close) truncates it to the logical
/// length. A log that is dropped without `close` (or a process that dies) leaves
/// the zero padding in place; [`repair_tail`](super::repair_tail) removes it.
///
/// # 文件长度
///
/// 打开期间文件长度大于已写入的数据：始终覆盖整个当前映射。
/// [`close`](Self::close) 会将其截断到逻辑长度。未调用 `close` 就被 drop
/// （或进程异常退出）的日志会保留零填充；[`repair_tail`](super::repair_tail) 可以将其移除。
///
/// # Exclusivity
///
/// Opening takes a non-blocking exclusive advisory lock on the file. A second
/// open of the same path, from this or another process, fails with
/// [`Error::AlreadyLocked`] until the first log is closed or dropped.
///
/// # 排他性
///
/// 打开时对文件加非阻塞排他咨询锁。在第一个日志关闭或 drop 之前，
/// 从本进程或其他进程再次打开同一路径会返回 [`Error::AlreadyLocked`]。
///
/// # Examples
///
/// ```
/// # use mmap_appender::AppendLog;
/// # use tempfile::tempdir;
/// # use std::num::NonZeroUsize;
/// # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
/// # let dir = tempdir()?;
/// # let path = dir.path().join("app.log");
/// let mut log = AppendLog::open(&path, NonZeroUsize::new(4).unwrap())?;
/// log.append(b"first line\n")?;
/// log.append(b"second line\n")?;
/// log.close()?;
///
/// assert_eq!(std::fs::read(&path)?, b"first line\nsecond line\n");
/// # Ok(())
/// # }
/// ```
pub struct AppendLog {
    /// Current mapping, `None` once closed or after a failed rotation
    ///
    /// 当前映射；关闭后或轮转失败后为 `None`
    ///
    /// Declared before `file` so it is unmapped before the descriptor closes.
    ///
    /// 声明在 `file` 之前，保证先解除映射再关闭文件描述符。
    window: Option<MappedWindow>,

    /// Locked file handle, `None` once closed
    ///
    /// 已加锁的文件句柄；关闭后为 `None`
    file: Option<File>,

    path: PathBuf,

    /// Size of every mapping in bytes, a whole number of pages
    ///
    /// 每个映射的字节大小，为内存页的整数倍
    mapping_size: u64,

    /// File offset where the current mapping starts, page aligned
    ///
    /// 当前映射在文件中的起始偏移，按页对齐
    mapped_offset: u64,

    /// Bytes written into the current mapping, `0..=mapping_size`
    ///
    /// 当前映射中已写入的字节数，范围 `0..=mapping_size`
    written_in_mapping: u64,

    /// Bytes committed before the current mapping
    ///
    /// 当前映射之前已提交的字节数
    total_logical_bytes: u64,

    state: LogState,
}

impl AppendLog {
    /// Open or create the log at `path` with a mapping of `page_count` pages
    ///
    /// 打开或创建 `path` 处的日志，映射大小为 `page_count` 个内存页
    ///
    /// Existing content is kept. Appends continue right after the last byte:
    /// the bytes of a trailing partial page are mapped again and are not
    /// overwritten.
    ///
    /// 已有内容会被保留。追加从最后一个字节之后继续：
    /// 末尾不完整页中的字节会被重新映射，不会被覆盖。
    ///
    /// # Errors
    /// - [`Error::AlreadyLocked`] if another log holds the file
    /// - [`Error::Io`] naming the failing step (open, lock, stat, resize, sync, map)
    /// - [`Error::MappingTooLarge`] if the mapping size overflows
    ///
    /// Nothing is held when an error is returned.
    ///
    /// # Errors
    /// - 文件已被其他日志持有时返回 [`Error::AlreadyLocked`]
    /// - 任一步骤（open、lock、stat、resize、sync、map）失败时返回对应的 [`Error::Io`]
    /// - 映射大小溢出时返回 [`Error::MappingTooLarge`]
    ///
    /// 返回错误时不持有任何资源。
    pub fn open(path: impl AsRef<Path>, page_count: NonZeroUsize) -> Result<Self> {
        let path = path.as_ref();
        let page = page_size();
        let mapping_len = page
            .checked_mul(page_count.get())
            .ok_or(Error::MappingTooLarge {
                page_count: page_count.get(),
                page_size: page,
            })?;
        let mapping_size = mapping_len as u64;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(Error::io(Step::Open))?;

        lock_exclusive(&file, path)?;

        // From here on, dropping `file` on an error path releases the lock
        // 此后在错误路径上 drop `file` 会释放锁
        let file_len = file.metadata().map_err(Error::io(Step::Stat))?.len();
        let written_in_mapping = offset_in_page(file_len, page as u64);
        let mapped_offset = align_down(file_len, page as u64);

        let allocated = mapped_offset
            .checked_add(mapping_size)
            .ok_or(Error::MappingTooLarge {
                page_count: page_count.get(),
                page_size: page,
            })?;
        file.set_len(allocated).map_err(Error::io(Step::Resize))?;
        file.sync_all().map_err(Error::io(Step::Sync))?;

        let window = MappedWindow::map(&file, mapped_offset, mapping_len)
            .map_err(Error::io(Step::Map))?;

        debug!(
            path = %path.display(),
            file_len,
            mapped_offset,
            written_in_mapping,
            mapping_size,
            "append log opened"
        );

        Ok(Self {
            window: Some(window),
            file: Some(file),
            path: path.to_path_buf(),
            mapping_size,
            mapped_offset,
            written_in_mapping,
            total_logical_bytes: mapped_offset,
            state: LogState::Open,
        })
    }

    /// Append `data` to the log
    ///
    /// 将 `data` 追加到日志
    ///
    /// Data that does not fit in the current mapping fills it exactly, the
    /// mapping is rotated, and the rest continues in the new mapping, as many
    /// times as needed. The bytes are only copied into memory; they reach
    /// storage when their mapping is rotated out, on [`flush`](Self::flush) /
    /// [`sync_all`](Self::sync_all), or on [`close`](Self::close).
    ///
    /// 当前映射放不下的数据会先填满映射，然后轮转映射，剩余部分在新映射中继续写入，
    /// 必要时重复多次。数据仅被复制到内存；在所在映射被轮转出去、调用
    /// [`flush`](Self::flush) / [`sync_all`](Self::sync_all) 或 [`close`](Self::close)
    /// 时才会写入存储。
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if the log is closed or a rotation failed earlier
    /// - [`Error::Io`] with the failing rotation step; the prefix written before
    ///   the failure stays counted and the log becomes [`LogState::Failed`]
    ///
    /// # Errors
    /// - 日志已关闭或之前的轮转失败时返回 [`Error::InvalidState`]
    /// - 轮转失败时返回带失败步骤的 [`Error::Io`]；失败前写入的前缀仍被计入，
    ///   日志进入 [`LogState::Failed`] 状态
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        let mut rest = data;

        loop {
            let pos = self.written_in_mapping as usize;
            let room = self.mapping_size as usize - pos;
            let state = self.state;
            let window = self.window.as_mut().ok_or(Error::InvalidState { state })?;
            debug_assert_eq!(window.len() as u64, self.mapping_size);

            if rest.len() <= room {
                window.write_at(pos, rest);
                self.written_in_mapping += rest.len() as u64;
                return Ok(());
            }

            let (head, tail) = rest.split_at(room);
            window.write_at(pos, head);
            self.written_in_mapping = self.mapping_size;
            trace!(copied = head.len(), remaining = tail.len(), "mapping full, rotating");

            self.rotate()?;
            rest = tail;
        }
    }

    /// Replace the full mapping with one covering the next region of the file
    ///
    /// 用覆盖文件下一区域的映射替换已写满的映射
    fn rotate(&mut self) -> Result<()> {
        debug_assert_eq!(self.written_in_mapping, self.mapping_size);

        let outgoing = self.window.take().ok_or(Error::InvalidState { state: self.state })?;
        let file = self.file.as_ref().ok_or(Error::InvalidState { state: self.state })?;
        let next_offset = self.mapped_offset + self.mapping_size;

        // Outgoing bytes count as committed even if the remap fails
        // 即使重新映射失败，旧映射中的字节也计为已提交
        self.total_logical_bytes += self.written_in_mapping;
        self.written_in_mapping = 0;
        self.mapped_offset = next_offset;

        match Self::remap(file, outgoing, next_offset, self.mapping_size) {
            Ok(window) => {
                debug_assert_eq!(window.offset(), self.mapped_offset);
                debug!(
                    path = %self.path.display(),
                    mapped_offset = self.mapped_offset,
                    total_logical_bytes = self.total_logical_bytes,
                    "mapping rotated"
                );
                self.window = Some(window);
                Ok(())
            }
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "rotation failed, log is unusable"
                );
                self.state = LogState::Failed;
                Err(err)
            }
        }
    }

    /// Grow the file, flush and unmap `outgoing`, and map `[offset, offset + size)`
    ///
    /// 扩展文件，刷新并解除 `outgoing` 的映射，然后映射 `[offset, offset + size)`
    fn remap(file: &File, outgoing: MappedWindow, offset: u64, size: u64) -> Result<MappedWindow> {
        file.set_len(offset + size).map_err(Error::io(Step::Resize))?;
        outgoing.flush_async().map_err(Error::io(Step::Sync))?;
        drop(outgoing);
        MappedWindow::map(file, offset, size as usize).map_err(Error::io(Step::Map))
    }

    /// Truncate the file to its logical length and release every resource
    ///
    /// 将文件截断到逻辑长度并释放所有资源
    ///
    /// Steps: truncate, flush the mapping, unmap, unlock, close the descriptor.
    /// Every step runs even if an earlier one fails. Counters are reset to zero.
    /// Closing a log whose rotation failed still truncates to the bytes that
    /// were committed.
    ///
    /// 步骤：截断、刷新映射、解除映射、解锁、关闭文件描述符。
    /// 即使前面的步骤失败，后续步骤也都会执行。计数器会被清零。
    /// 对轮转失败的日志调用 close 仍会截断到已提交的字节数。
    ///
    /// # Errors
    /// - [`Error::InvalidState`] if already closed
    /// - [`Error::Close`] listing every failed step
    ///
    /// # Errors
    /// - 已经关闭时返回 [`Error::InvalidState`]
    /// - 返回 [`Error::Close`]，列出所有失败的步骤
    pub fn close(&mut self) -> Result<()> {
        let file = match self.file.take() {
            Some(file) => file,
            None => return Err(Error::InvalidState { state: LogState::Closed }),
        };

        let logical_len = self.logical_len();
        let mut failures = Vec::new();

        if let Err(source) = file.set_len(logical_len) {
            failures.push(StepFailure { step: Step::Truncate, source });
        }

        if let Some(window) = self.window.take() {
            if let Err(source) = window.flush_async() {
                failures.push(StepFailure { step: Step::Sync, source });
            }
            drop(window);
        }

        if let Err(source) = FileExt::unlock(&file) {
            failures.push(StepFailure { step: Step::Unlock, source });
        }
        drop(file);

        debug!(
            path = %self.path.display(),
            logical_len,
            failed_steps = failures.len(),
            "append log closed"
        );

        self.mapped_offset = 0;
        self.written_in_mapping = 0;
        self.total_logical_bytes = 0;
        self.state = LogState::Closed;

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Close { failures })
        }
    }

    /// Start an asynchronous flush of the current mapping
    ///
    /// 发起当前映射的异步刷新
    pub fn flush(&self) -> Result<()> {
        self.window_ref()?.flush_async().map_err(Error::io(Step::Sync))
    }

    /// Flush the current mapping and wait until it reaches storage
    ///
    /// 刷新当前映射并等待写入存储
    ///
    /// Slower than [`flush`](Self::flush). The file stays over-allocated; only
    /// [`close`](Self::close) trims it.
    ///
    /// 比 [`flush`](Self::flush) 慢。文件仍保持预分配长度；只有 [`close`](Self::close) 会裁剪。
    pub fn sync_all(&self) -> Result<()> {
        self.window_ref()?.flush().map_err(Error::io(Step::Sync))
    }

    /// Bytes written into the current mapping only, 0 once closed
    ///
    /// 仅当前映射中已写入的字节数，关闭后为 0
    #[inline]
    pub fn written_in_mapping(&self) -> u64 {
        self.written_in_mapping
    }

    /// Total bytes in the log: the length the file will have after [`close`](Self::close)
    ///
    /// 日志中的总字节数，即 [`close`](Self::close) 之后文件的长度
    #[inline]
    pub fn logical_len(&self) -> u64 {
        self.total_logical_bytes + self.written_in_mapping
    }

    /// File offset of the current mapping
    ///
    /// 当前映射在文件中的偏移
    #[inline]
    pub fn mapped_offset(&self) -> u64 {
        self.mapped_offset
    }

    #[inline]
    pub fn mapping_size(&self) -> u64 {
        self.mapping_size
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn state(&self) -> LogState {
        self.state
    }

    /// Bytes of the current mapping written so far
    ///
    /// 当前映射中已写入的字节
    ///
    /// After a reopen this starts with the bytes of the file's trailing partial
    /// page.
    ///
    /// 重新打开后，这部分以文件末尾不完整页中的字节开头。
    pub fn pending(&self) -> Result<&[u8]> {
        let window = self.window_ref()?;
        Ok(window.head(self.written_in_mapping as usize))
    }

    fn window_ref(&self) -> Result<&MappedWindow> {
        self.window
            .as_ref()
            .ok_or(Error::InvalidState { state: self.state })
    }
}

/// Take the non-blocking exclusive advisory lock on `file`
///
/// 对 `file` 加非阻塞排他咨询锁
pub(crate) fn lock_exclusive(file: &File, path: &Path) -> Result<()> {
    match FileExt::try_lock_exclusive(file) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
            Err(Error::AlreadyLocked { path: path.to_path_buf() })
        }
        Err(source) => Err(Error::Io { step: Step::Lock, source }),
    }
}

/// Stream surface over [`AppendLog::append`]
///
/// 基于 [`AppendLog::append`] 的流式接口
///
/// A `write` whose rotation fails after part of the buffer was committed
/// returns `Ok` with the committed length; the next call reports the failure.
///
/// 若 `write` 在部分数据已提交后轮转失败，返回 `Ok` 及已提交的长度；
/// 下一次调用会报告该失败。
///
/// ```
/// # use mmap_appender::AppendLog;
/// # use tempfile::tempdir;
/// # use std::io::Write;
/// # use std::num::NonZeroUsize;
/// # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
/// # let dir = tempdir()?;
/// # let path = dir.path().join("fmt.log");
/// let mut log = AppendLog::open(&path, NonZeroUsize::new(1).unwrap())?;
/// writeln!(log, "request {} took {}ms", 42, 7)?;
/// log.close()?;
///
/// assert_eq!(std::fs::read_to_string(&path)?, "request 42 took 7ms\n");
/// # Ok(())
/// # }
/// ```
impl io::Write for AppendLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let before = self.logical_len();
        match self.append(buf) {
            Ok(()) => Ok(buf.len()),
            Err(err) => match self.logical_len() - before {
                0 => Err(err.into()),
                committed => Ok(committed as usize),
            },
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        AppendLog::flush(self)?;
        Ok(())
    }
}

/// Dropping without [`AppendLog::close`] unmaps and unlocks but leaves the
/// file at its over-allocated length
///
/// 未调用 [`AppendLog::close`] 就 drop 时，会解除映射并解锁，但文件保持预分配长度
impl Drop for AppendLog {
    fn drop(&mut self) {
        if self.file.is_some() {
            warn!(
                path = %self.path.display(),
                logical_len = self.logical_len(),
                "append log dropped without close, tail left zero-padded"
            );
        }
        // Unmap before the descriptor closes and releases the lock
        // 在文件描述符关闭并释放锁之前解除映射
        drop(self.window.take());
        drop(self.file.take());
    }
}

impl std::fmt::Debug for AppendLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendLog")
            .field("path", &self.path)
            .field("state", &self.state)
            .field("mapping_size", &self.mapping_size)
            .field("mapped_offset", &self.mapped_offset)
            .field("written_in_mapping", &self.written_in_mapping)
            .field("total_logical_bytes", &self.total_logical_bytes)
            .field("window", &self.window)
            .finish()
    }
}
