//! # 文件句柄层
//!
//! 字节粒度的读写落实为扇区粒度的设备访问：
//! 对齐的整扇区直接传输，不足一扇区的部分先读出整扇区再拼接。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use block_dev::BlockDevice;

use crate::inode::{Inode, InodeData};
use crate::sector::{self, SectorId};
use crate::volume::Volume;
use crate::{Error, Result, SECTOR_SIZE};

/// 从`offset`处读出，返回读到的字节数；到达文件末尾时为0
pub(crate) fn read_at(
    inode: &Inode,
    offset: usize,
    buf: &mut [u8],
    dev: &dyn BlockDevice,
) -> Result<usize> {
    let data = inode.read()?;
    let size = data.size() as usize;
    if offset >= size {
        return Ok(0);
    }

    let len = buf.len().min(size - offset);
    copy_out(&data, offset, &mut buf[..len], dev)?;
    Ok(len)
}

/// 从`offset`处写入，必要时扩张文件，返回写入的字节数。
///
/// 空间不足时写入扩张所达到的部分；一个字节也写不进时返回[`Error::DiskFull`]。
pub(crate) fn write_at(inode: &Inode, offset: usize, buf: &[u8], vol: &Volume) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }

    let mut data = inode.write()?;
    let end = offset
        .checked_add(buf.len())
        .and_then(|end| u32::try_from(end).ok())
        .ok_or(Error::DiskFull)?;
    let size = data.grow_to(end, &vol.free_map, vol.dev()) as usize;
    if offset >= size {
        return Err(Error::DiskFull);
    }

    let len = buf.len().min(size - offset);
    copy_in(&data, offset, &buf[..len], vol.dev())?;
    Ok(len)
}

/// 读出全部内容
pub(crate) fn read_all(inode: &Inode, dev: &dyn BlockDevice) -> Result<Vec<u8>> {
    let mut buf = vec![0; inode.size()? as usize];
    let len = read_at(inode, 0, &mut buf, dev)?;
    buf.truncate(len);
    Ok(buf)
}

fn copy_out(data: &InodeData, mut pos: usize, buf: &mut [u8], dev: &dyn BlockDevice) -> Result<()> {
    let mut block = sector::zeroed();
    let mut done = 0;

    while done < buf.len() {
        let sid = data.sector_of(pos)?;
        let in_sector = pos % SECTOR_SIZE;
        let count = (buf.len() - done).min(SECTOR_SIZE - in_sector);

        if count == SECTOR_SIZE {
            sector::read(dev, sid, &mut buf[done..done + SECTOR_SIZE]);
        } else {
            sector::read(dev, sid, &mut block);
            buf[done..done + count].copy_from_slice(&block[in_sector..in_sector + count]);
        }

        done += count;
        pos += count;
    }

    Ok(())
}

fn copy_in(data: &InodeData, mut pos: usize, buf: &[u8], dev: &dyn BlockDevice) -> Result<()> {
    let mut block = sector::zeroed();
    let mut done = 0;

    while done < buf.len() {
        let sid = data.sector_of(pos)?;
        let in_sector = pos % SECTOR_SIZE;
        let count = (buf.len() - done).min(SECTOR_SIZE - in_sector);

        if count == SECTOR_SIZE {
            sector::write(dev, sid, &buf[done..done + SECTOR_SIZE]);
        } else {
            sector::read(dev, sid, &mut block);
            block[in_sector..in_sector + count].copy_from_slice(&buf[done..done + count]);
            sector::write(dev, sid, &block);
        }

        done += count;
        pos += count;
    }

    Ok(())
}

/// 打开的普通文件。
///
/// 持有期间计入 inode 的打开数；关闭或析构时释放，
/// 若此时文件已被删除，其扇区随即被回收。
pub struct FileHandle {
    vol: Arc<Volume>,
    inode: Option<Arc<Inode>>,
    pos: usize,
}

impl FileHandle {
    /// 调用者需已为`inode`增加打开数
    pub(crate) fn new(vol: Arc<Volume>, inode: Arc<Inode>) -> Self {
        Self {
            vol,
            inode: Some(inode),
            pos: 0,
        }
    }

    fn inode(&self) -> Result<&Arc<Inode>> {
        self.inode.as_ref().ok_or(Error::InvalidState)
    }

    pub fn inode_id(&self) -> Option<SectorId> {
        self.inode.as_ref().map(|inode| inode.addr())
    }

    /// 文件的当前大小
    pub fn len(&self) -> usize {
        self.inode()
            .and_then(|inode| inode.size())
            .map_or(0, |size| size as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize> {
        read_at(self.inode()?, offset, buf, self.vol.dev())
    }

    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize> {
        write_at(self.inode()?, offset, buf, &self.vol)
    }

    /// 从游标处读出并前移游标
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let len = self.read_at(self.pos, buf)?;
        self.pos += len;
        Ok(len)
    }

    /// 从游标处写入并前移游标
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let len = self.write_at(self.pos, buf)?;
        self.pos += len;
        Ok(len)
    }

    /// 移动游标，越过文件末尾的请求被忽略。返回移动后的游标。
    pub fn seek(&mut self, pos: usize) -> usize {
        if pos <= self.len() {
            self.pos = pos;
        }
        self.pos
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(inode) = self.inode.take() {
            inode.decrease_open_count();
            inode.try_reclaim(&self.vol.inodes, &self.vol.free_map);
        }
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("inode", &self.inode_id())
            .field("pos", &self.pos)
            .finish()
    }
}
