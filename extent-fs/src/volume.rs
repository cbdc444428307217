use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::SECTOR_SIZE;
use crate::directory::DirectoryCache;
use crate::free_map::FreeSpaceMap;
use crate::inode::InodeTable;

/// 卷的配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    /// 设备的扇区总数
    pub total_sectors: u32,
}

impl FsConfig {
    pub const fn new(total_sectors: u32) -> Self {
        Self { total_sectors }
    }

    /// 镜像的字节数
    #[inline]
    pub const fn image_bytes(&self) -> usize {
        self.total_sectors as usize * SECTOR_SIZE
    }
}

impl Default for FsConfig {
    /// 8 MiB
    fn default() -> Self {
        Self::new(16 * 1024)
    }
}

/// 挂载期间共享的全部状态
pub(crate) struct Volume {
    pub dev: Arc<dyn BlockDevice>,
    pub free_map: FreeSpaceMap,
    pub inodes: InodeTable,
    pub dirs: DirectoryCache,
    pub config: FsConfig,
}

impl Volume {
    pub fn new(
        dev: Arc<dyn BlockDevice>,
        free_map: FreeSpaceMap,
        inodes: InodeTable,
        config: FsConfig,
    ) -> Self {
        Self {
            dev,
            free_map,
            inodes,
            dirs: DirectoryCache::new(),
            config,
        }
    }

    #[inline]
    pub fn dev(&self) -> &dyn BlockDevice {
        &*self.dev
    }
}
