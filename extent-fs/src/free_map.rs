//! # 空闲扇区管理
//!
//! 内存中以位图记录全部扇区的空闲情况，落盘时通过0号扇区上的系统 inode
//! 写成每扇区一位的映像（1 表示空闲）。
//!
//! 分配与回收共用一把锁，以免并发分配时把同一扇区发给两个调用者。

use alloc::vec::Vec;

use spin::Mutex;

use crate::file;
use crate::inode::Inode;
use crate::layout::Bitmap;
use crate::sector::SectorId;
use crate::volume::Volume;
use crate::{BlockDevice, Error, Result};

#[derive(Debug)]
pub struct FreeSpaceMap {
    bitmap: Mutex<Bitmap>,
}

impl FreeSpaceMap {
    /// 格式化：除两个保留扇区外全部空闲
    pub fn format(total_sectors: u32) -> Self {
        let mut bitmap = Bitmap::new(total_sectors as usize);
        for id in 2..total_sectors {
            bitmap.dealloc(id);
        }

        Self {
            bitmap: Mutex::new(bitmap),
        }
    }

    pub fn from_image(image: &[u8], total_sectors: u32) -> Self {
        Self {
            bitmap: Mutex::new(Bitmap::from_image(image, total_sectors as usize)),
        }
    }

    /// 取出一个空闲扇区；空间耗尽时返回空
    pub fn allocate(&self) -> Option<SectorId> {
        let sid = self.bitmap.lock().alloc().map(SectorId::new);
        if sid.is_none() {
            log::warn!("free space exhausted");
        }
        sid
    }

    /// 调用者需保证该扇区不再被任何 inode 引用
    pub fn deallocate(&self, sid: SectorId) {
        self.bitmap.lock().dealloc(sid.raw());
    }

    #[inline]
    pub fn is_free(&self, sid: SectorId) -> bool {
        self.bitmap.lock().is_free(sid.raw())
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.bitmap.lock().count_free()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.bitmap.lock().capacity()
    }

    #[inline]
    pub fn image_len(&self) -> usize {
        Bitmap::image_len(self.capacity())
    }

    /// 生成落盘映像，`released`中的扇区一并视为空闲
    pub fn image(&self, released: &[SectorId]) -> Vec<u8> {
        let mut bitmap = self.bitmap.lock().clone();
        for &sid in released {
            bitmap.dealloc(sid.raw());
        }
        bitmap.to_image()
    }

    /// 载入：读出系统 inode 的全部内容作为映像
    pub(crate) fn load(
        inode: &Inode,
        total_sectors: u32,
        dev: &dyn BlockDevice,
    ) -> Result<Self> {
        let image = file::read_all(inode, dev)?;
        let map = Self::from_image(&image, total_sectors);
        log::debug!(
            "free space map loaded: {}/{} sectors free",
            map.free_count(),
            total_sectors
        );
        Ok(map)
    }

    /// 令系统 inode 先长到映像的大小。
    /// 此后再生成映像，映像所占的扇区就不会被误记为空闲。
    pub(crate) fn prepare(&self, inode: &Inode, vol: &Volume) -> Result<()> {
        let len = self.image_len() as u32;
        if inode.grow_to(len, self, &*vol.dev)? < len {
            return Err(Error::DiskFull);
        }
        Ok(())
    }

    pub(crate) fn save(&self, inode: &Inode, released: &[SectorId], vol: &Volume) -> Result<()> {
        let image = self.image(released);
        if file::write_at(inode, 0, &image, vol)? < image.len() {
            return Err(Error::DiskFull);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_sectors_are_never_issued() {
        let map = FreeSpaceMap::format(6);
        let issued: Vec<_> = core::iter::from_fn(|| map.allocate()).collect();

        assert_eq!(issued, [2, 3, 4, 5].map(SectorId::new));
        assert_eq!(map.free_count(), 0);
    }

    #[test]
    fn deallocated_sector_is_reissued() {
        let map = FreeSpaceMap::format(8);
        let a = map.allocate().unwrap();
        let b = map.allocate().unwrap();
        assert_ne!(a, b);

        map.deallocate(a);
        assert!(map.is_free(a));
        assert_eq!(map.allocate(), Some(a));
    }

    #[test]
    fn image_marks_released_sectors_free() {
        let map = FreeSpaceMap::format(16);
        let sid = map.allocate().unwrap();

        let image = map.image(&[]);
        assert!(!FreeSpaceMap::from_image(&image, 16).is_free(sid));

        let image = map.image(&[sid]);
        assert!(FreeSpaceMap::from_image(&image, 16).is_free(sid));
        // 生成映像不影响内存中的状态
        assert!(!map.is_free(sid));
    }

    #[test]
    fn concurrent_allocation_never_double_issues() {
        use std::sync::Arc;
        use std::thread;

        let map = Arc::new(FreeSpaceMap::format(4096));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let map = map.clone();
                thread::spawn(move || {
                    core::iter::from_fn(|| map.allocate()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut issued: Vec<SectorId> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        issued.sort();
        issued.dedup();

        assert_eq!(issued.len(), 4094);
    }
}
