//! # 磁盘数据结构层
//!
//! extent-fs 的磁盘布局没有固定分区：
//!
//! - 0号扇区：空闲扇区表的 inode，其内容为位图
//! - 1号扇区：根目录的 inode
//! - 其余扇区：空闲，或归属于某个 inode（头部扇区、溢出扇区、数据扇区）

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, InodeKind};

/// 目录项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;
