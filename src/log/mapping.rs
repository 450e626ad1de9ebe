//! Fixed-size memory-mapped window over a file region, based on memmap2
//!
//! 基于 memmap2 的文件区域固定大小内存映射窗口

use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::io;

/// Owned shared read/write mapping of `[offset, offset + len)`
///
/// 对 `[offset, offset + len)` 的独占共享读写映射
///
/// The region is unmapped exactly once, when the window is dropped. Rotation
/// replaces a window by dropping the old one and mapping a new one; a window is
/// never resized.
///
/// 区域只会在窗口被 drop 时解除映射一次。轮转时丢弃旧窗口并映射新窗口；
/// 窗口大小永不改变。
pub(crate) struct MappedWindow {
    /// Underlying mapping
    ///
    /// 底层映射
    mmap: MmapMut,

    /// File offset of the first mapped byte
    ///
    /// 第一个映射字节在文件中的偏移
    offset: u64,
}

impl MappedWindow {
    /// Map `len` bytes of `file` starting at the page-aligned `offset`
    ///
    /// 从页对齐的 `offset` 开始映射 `file` 的 `len` 字节
    ///
    /// The file must already be at least `offset + len` bytes long.
    ///
    /// 文件长度必须已至少为 `offset + len` 字节。
    pub(crate) fn map(file: &File, offset: u64, len: usize) -> io::Result<Self> {
        // Safety: the file is exclusively locked by the owning log, so no other
        // cooperating writer truncates it underneath the mapping
        // Safety: 文件由所属日志排他锁定，其他协作写入者不会在映射期间截断文件
        let mmap = unsafe { MmapOptions::new().offset(offset).len(len).map_mut(file)? };
        Ok(Self { mmap, offset })
    }

    /// Copy `data` into the window at `pos`
    ///
    /// 将 `data` 复制到窗口的 `pos` 位置
    ///
    /// Callers split writes so they never cross the end of the window.
    ///
    /// 调用方负责拆分写入，保证不会越过窗口末尾。
    #[inline]
    pub(crate) fn write_at(&mut self, pos: usize, data: &[u8]) {
        debug_assert!(pos + data.len() <= self.mmap.len());
        self.mmap[pos..pos + data.len()].copy_from_slice(data);
    }

    /// Bytes `[0, len)` of the window
    ///
    /// 窗口中 `[0, len)` 的字节
    #[inline]
    pub(crate) fn head(&self, len: usize) -> &[u8] {
        &self.mmap[..len]
    }

    /// Start an asynchronous flush of the whole window
    ///
    /// 发起整个窗口的异步刷新
    pub(crate) fn flush_async(&self) -> io::Result<()> {
        self.mmap.flush_async()
    }

    /// Flush the whole window and wait for completion
    ///
    /// 同步刷新整个窗口并等待完成
    pub(crate) fn flush(&self) -> io::Result<()> {
        self.mmap.flush()
    }

    #[inline]
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.mmap.len()
    }
}

impl std::fmt::Debug for MappedWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedWindow")
            .field("offset", &self.offset)
            .field("len", &self.mmap.len())
            .finish()
    }
}
