//! 扇区的抽象
//!
//! 设备读写不经过缓存：每次访问都直接落到块设备上。

use core::fmt;

use block_dev::BlockDevice;
use derive_more::{From, Into};

use crate::{DataBlock, SECTOR_SIZE, WORD_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct SectorId(u32);

impl SectorId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// 扇区号即块设备上的块ID
    #[inline]
    pub const fn block(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[inline]
pub fn read(dev: &dyn BlockDevice, id: SectorId, buf: &mut [u8]) {
    debug_assert_eq!(buf.len(), SECTOR_SIZE);
    dev.read_block(id.block(), buf);
}

#[inline]
pub fn write(dev: &dyn BlockDevice, id: SectorId, buf: &[u8]) {
    debug_assert_eq!(buf.len(), SECTOR_SIZE);
    dev.write_block(id.block(), buf);
}

#[inline]
pub fn zeroed() -> DataBlock {
    [0; SECTOR_SIZE]
}

/// 读出`pos`处的小端字
#[inline]
pub fn get_word(buf: &[u8], pos: usize) -> u32 {
    let mut word = [0; WORD_SIZE];
    word.copy_from_slice(&buf[pos..pos + WORD_SIZE]);
    u32::from_le_bytes(word)
}

#[inline]
pub fn put_word(buf: &mut [u8], pos: usize, word: u32) {
    buf[pos..pos + WORD_SIZE].copy_from_slice(&word.to_le_bytes());
}

/// 容纳`size`字节需要的扇区数
#[inline]
pub fn count_sectors(size: usize) -> usize {
    size.div_ceil(SECTOR_SIZE)
}
