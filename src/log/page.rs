//! Page size and alignment helpers
//!
//! 内存页大小与对齐辅助函数

use std::sync::OnceLock;

/// Fallback when the OS does not report a page size
///
/// 无法获取系统页大小时的默认值
const DEFAULT_PAGE_SIZE: usize = 4096;

/// OS memory page size in bytes, queried once
///
/// 系统内存页大小（字节），只查询一次
///
/// Mapping offsets must be multiples of this value.
///
/// 映射偏移必须是该值的整数倍。
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // Safety: sysconf has no preconditions
    // Safety: sysconf 没有前置条件
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        DEFAULT_PAGE_SIZE
    }
}

#[cfg(not(unix))]
fn query_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Round `pos` down to a multiple of `align`
///
/// 将 `pos` 向下对齐到 `align` 的整数倍
#[inline]
pub(crate) const fn align_down(pos: u64, align: u64) -> u64 {
    pos - pos % align
}

/// Bytes past the last `align` boundary at or below `pos`
///
/// `pos` 超出其下方最近对齐边界的字节数
#[inline]
pub(crate) const fn offset_in_page(pos: u64, align: u64) -> u64 {
    pos % align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_power_of_two() {
        let size = page_size();
        assert!(size >= 512);
        assert!(size.is_power_of_two());
        assert_eq!(size, page_size());
    }

    #[test]
    fn test_alignment() {
        assert_eq!(align_down(0, 4096), 0);
        assert_eq!(align_down(4095, 4096), 0);
        assert_eq!(align_down(4096, 4096), 4096);
        assert_eq!(align_down(10_000, 4096), 8192);

        assert_eq!(offset_in_page(10_000, 4096), 10_000 - 8192);
        assert_eq!(offset_in_page(8192, 4096), 0);
    }
}
