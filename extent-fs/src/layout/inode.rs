//! inode 的磁盘映像
//!
//! 头部占5个字：文件大小、类型、硬链接数、extent 表长、溢出表长；
//! 其后先是溢出扇区表，再是 extent 表（数据扇区表）。
//!
//! 头部扇区放不下时，按溢出表的顺序依次写入溢出扇区：
//!
//! 头部扇区 -> overflow[0] -> overflow[1] -> ...
//!
//! 溢出表排在 extent 表之前，因此读取第`k`个溢出扇区之前，
//! 它的扇区号必然已经读出。

use alloc::vec::Vec;
use core::iter;

use block_dev::BlockDevice;

use crate::sector::{self, SectorId};
use crate::{DataBlock, SECTOR_SIZE, WORD_SIZE, WORDS_PER_SECTOR};

const HEADER_WORDS: usize = 5;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    /// 系统文件，目前只有空闲扇区表
    System,
    Folder,
    #[default]
    File,
    Symlink,
}

impl InodeKind {
    pub const fn code(self) -> u32 {
        match self {
            Self::System => 0,
            Self::Folder => 1,
            Self::File => 2,
            Self::Symlink => 4,
        }
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::System),
            1 => Some(Self::Folder),
            2 => Some(Self::File),
            4 => Some(Self::Symlink),
            _ => None,
        }
    }
}

impl From<InodeKind> for vfs::DirEntryType {
    fn from(kind: InodeKind) -> Self {
        match kind {
            InodeKind::Folder => Self::Directory,
            InodeKind::Symlink => Self::SymLink,
            InodeKind::File | InodeKind::System => Self::Regular,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiskInode {
    pub size: u32,
    pub kind: InodeKind,
    /// 硬链接个数
    pub links: u32,
    /// 按逻辑顺序排列的数据扇区
    pub extents: Vec<SectorId>,
    /// 存放头部与两张表的后续扇区
    pub overflow: Vec<SectorId>,
}

impl DiskInode {
    /// 给定 extent 表长，计算至少需要多少个溢出扇区
    pub fn overflow_needed(extents: usize) -> usize {
        let mut overflow = 0;
        while HEADER_WORDS + overflow + extents > (1 + overflow) * WORDS_PER_SECTOR {
            overflow += 1;
        }
        overflow
    }

    /// 写入磁盘，调用者需保证溢出扇区已经足够
    pub fn store(&self, addr: SectorId, dev: &dyn BlockDevice) {
        debug_assert!(self.overflow.len() >= Self::overflow_needed(self.extents.len()));

        let words: Vec<u32> = [
            self.size,
            self.kind.code(),
            self.links,
            self.extents.len() as u32,
            self.overflow.len() as u32,
        ]
        .into_iter()
        .chain(self.overflow.iter().map(|&sid| sid.raw()))
        .chain(self.extents.iter().map(|&sid| sid.raw()))
        .collect();

        let sectors = iter::once(addr).chain(self.overflow.iter().copied());
        let mut block: DataBlock = sector::zeroed();
        for (chunk, sid) in words.chunks(WORDS_PER_SECTOR).zip(sectors) {
            block.fill(0);
            for (i, &word) in chunk.iter().enumerate() {
                sector::put_word(&mut block, i * WORD_SIZE, word);
            }
            sector::write(dev, sid, &block);
        }
    }

    /// 从磁盘读出，映像残缺时返回空
    pub fn load(addr: SectorId, dev: &dyn BlockDevice) -> Option<Self> {
        let mut reader = WordReader::new(addr, dev);

        let size = reader.next(&[])?;
        let kind = InodeKind::from_code(reader.next(&[])?)?;
        let links = reader.next(&[])?;
        let extent_count = reader.next(&[])?;
        let overflow_count = reader.next(&[])?;

        let mut overflow = Vec::new();
        for _ in 0..overflow_count {
            let sid = reader.next(&overflow)?;
            overflow.push(SectorId::new(sid));
        }

        let mut extents = Vec::new();
        for _ in 0..extent_count {
            let sid = reader.next(&overflow)?;
            extents.push(SectorId::new(sid));
        }

        // 文件大小不能超出 extent 表的覆盖范围
        if sector::count_sectors(size as usize) > extents.len() {
            return None;
        }

        Some(Self {
            size,
            kind,
            links,
            extents,
            overflow,
        })
    }
}

/// 沿着头部扇区与溢出扇区顺序读字
struct WordReader<'a> {
    dev: &'a dyn BlockDevice,
    block: DataBlock,
    pos: usize,
    /// 下一个要读的溢出扇区的序号
    next_overflow: usize,
}

impl<'a> WordReader<'a> {
    fn new(addr: SectorId, dev: &'a dyn BlockDevice) -> Self {
        let mut block = sector::zeroed();
        sector::read(dev, addr, &mut block);
        Self {
            dev,
            block,
            pos: 0,
            next_overflow: 0,
        }
    }

    fn next(&mut self, overflow: &[SectorId]) -> Option<u32> {
        if self.pos == SECTOR_SIZE {
            let &sid = overflow.get(self.next_overflow)?;
            sector::read(self.dev, sid, &mut self.block);
            self.next_overflow += 1;
            self.pos = 0;
        }

        let word = sector::get_word(&self.block, self.pos);
        self.pos += WORD_SIZE;
        Some(word)
    }
}
