use alloc::string::String;

use crate::DirEntryType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// 路径的最后一项，根目录为`/`
    pub name: String,
    pub mode: DirEntryType,
    /// File size
    pub size: u64,
    /// Occupying data sectors
    pub sectors: u64,
    /// Inode number，即 inode 所在的扇区号
    pub inode: u64,
    /// 硬链接个数
    pub links: u32,
}
