use alloc::string::String;

use crate::sector::{self, SectorId};
use crate::{NAME_MAX, WORD_SIZE};

/// 目录项：定长名称 + inode 地址
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// 不足定长的部分以 \0 填充；恰好占满时没有结尾的 \0
    name: [u8; NAME_MAX],
    inode_id: u32,
}

impl DirEntry {
    /// 目录项大小恒为260字节
    pub const SIZE: usize = NAME_MAX + WORD_SIZE;

    /// 调用者需保证名称不超过[`NAME_MAX`]字节
    pub fn new(name: &str, inode_id: SectorId) -> Self {
        let bytes = name.as_bytes();
        let mut name = [0; NAME_MAX];
        name[..bytes.len()].copy_from_slice(bytes);

        Self {
            name,
            inode_id: inode_id.raw(),
        }
    }

    pub fn name(&self) -> String {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    #[inline]
    pub fn inode_id(&self) -> SectorId {
        SectorId::new(self.inode_id)
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[..NAME_MAX].copy_from_slice(&self.name);
        sector::put_word(buf, NAME_MAX, self.inode_id);
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut name = [0; NAME_MAX];
        name.copy_from_slice(&buf[..NAME_MAX]);

        Self {
            name,
            inode_id: sector::get_word(buf, NAME_MAX),
        }
    }
}
