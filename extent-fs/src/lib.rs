#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* extent-fs 的整体架构，自上而下 */

// 文件系统层：路径解析、命名空间操作、启动与关闭
mod fs;
mod path;
mod seed;

// 目录层：名称到 inode 地址的映射，按绝对路径缓存
mod directory;

// 文件句柄层：按字节寻址的读写游标
mod file;

// 索引节点层：extent 表与引用计数生命周期
mod inode;

// 空闲扇区管理
mod free_map;

// 卷：设备、空闲扇区表、inode 表与目录缓存的集合
mod volume;

// 磁盘数据结构层
mod layout;

// 扇区
mod sector;

pub use self::{
    directory::{Directory, DirectoryGuard},
    file::FileHandle,
    free_map::FreeSpaceMap,
    fs::{FileSystem, PathResolution, Session, SpaceReport},
    inode::{Inode, InodeData, InodeTable, Lifecycle},
    layout::InodeKind,
    path::canonicalize,
    seed::{EmptySeed, SeedSource},
    sector::SectorId,
    volume::FsConfig,
};

pub use block_dev::BlockDevice;
pub use vfs::Error;

pub type Result<T> = core::result::Result<T, Error>;

pub const SECTOR_SIZE: usize = 512;
/// 磁盘上的一个字：4字节，小端序
pub const WORD_SIZE: usize = 4;
pub const WORDS_PER_SECTOR: usize = SECTOR_SIZE / WORD_SIZE;
/// 目录项中名称字段的定长
pub const NAME_MAX: usize = 256;

/// 空闲扇区表所在 inode 的保留地址
pub const FREE_MAP_SECTOR: SectorId = SectorId::new(0);
/// 根目录 inode 的保留地址
pub const ROOT_SECTOR: SectorId = SectorId::new(1);

type DataBlock = [u8; SECTOR_SIZE];
