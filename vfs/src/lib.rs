//! 文件系统与调用者之间交换的公共类型：错误、目录项与文件状态

#![no_std]

extern crate alloc;

mod dirent;
mod error;
mod stat;

pub use self::{
    dirent::{DirEntry, DirEntryType},
    error::Error,
    stat::Stat,
};
