//! # 索引节点层
//!
//! inode 的内存对象，同一地址在[`InodeTable`]中至多有一个。
//!
//! 生命周期：
//!
//! ```text
//! Created --链接--> Linked --链接数归零且仍被打开--> UnlinkedOpen
//!    |                 |                                 |
//!    +-----------------+------ 链接数与打开数均为0 ------> Reclaimed
//! ```
//!
//! 回收后的 inode 交还全部扇区，任何读写都会失败。
//!
//! 锁的顺序：数据锁在元数据锁之前；表锁不与二者嵌套。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::{iter, mem};

use block_dev::BlockDevice;
use spin::{Mutex, Once, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::free_map::FreeSpaceMap;
use crate::layout::{DiskInode, InodeKind};
use crate::sector::{self, SectorId};
use crate::{Error, FREE_MAP_SECTOR, ROOT_SECTOR, Result, SECTOR_SIZE};

pub struct Inode {
    addr: SectorId,
    /// 首次被引用时才读取磁盘映像
    loaded: Once<Result<()>>,
    data: RwLock<InodeData>,
    meta: Mutex<InodeMeta>,
}

/// 受读写锁保护的部分：大小与两张扇区表
#[derive(Debug, Default)]
pub struct InodeData {
    size: u32,
    extents: Vec<SectorId>,
    overflow: Vec<SectorId>,
}

#[derive(Debug)]
struct InodeMeta {
    kind: InodeKind,
    links: u32,
    opens: u32,
    status: Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Live,
    /// 链接数已归零，等待最后一个句柄关闭
    Unlinked,
    Reclaimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Linked,
    UnlinkedOpen,
    Reclaimed,
}

impl InodeData {
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// 数据扇区数
    #[inline]
    pub fn sectors(&self) -> usize {
        self.extents.len()
    }

    /// 字节偏移所在的数据扇区
    pub fn sector_of(&self, offset: usize) -> Result<SectorId> {
        self.extents
            .get(offset / SECTOR_SIZE)
            .copied()
            .ok_or(Error::InvalidState)
    }

    /// 扩张到`new_size`字节，返回实际达到的大小。
    ///
    /// 空间不足时尽量扩张：大小停在已分配扇区的末尾。
    /// 新分配的扇区会被清零。
    ///
    /// 头部落盘所需的溢出扇区与数据扇区一同分配，
    /// 因此已扩张的 inode 写回头部时不再需要空间。
    pub fn grow_to(
        &mut self,
        new_size: u32,
        free_map: &FreeSpaceMap,
        dev: &dyn BlockDevice,
    ) -> u32 {
        if new_size <= self.size {
            return self.size;
        }

        let needed = sector::count_sectors(new_size as usize);
        let zero = sector::zeroed();
        while self.extents.len() < needed {
            let overflow = DiskInode::overflow_needed(self.extents.len() + 1)
                .saturating_sub(self.overflow.len());
            let Some((sid, overflow)) = allocate_extent(free_map, overflow) else {
                self.size = (self.extents.len() * SECTOR_SIZE) as u32;
                log::warn!("partial growth: wanted {new_size} bytes, got {}", self.size);
                return self.size;
            };

            sector::write(dev, sid, &zero);
            self.overflow.extend(overflow);
            self.extents.push(sid);
        }

        self.size = new_size;
        self.size
    }
}

/// 分配一个数据扇区及`overflow`个溢出扇区；不足时交还已分配的部分
fn allocate_extent(
    free_map: &FreeSpaceMap,
    overflow: usize,
) -> Option<(SectorId, Vec<SectorId>)> {
    let mut sids = Vec::with_capacity(overflow);
    while sids.len() < overflow {
        let Some(sid) = free_map.allocate() else {
            break;
        };
        sids.push(sid);
    }

    match free_map.allocate() {
        Some(sid) if sids.len() == overflow => Some((sid, sids)),
        extent => {
            for sid in sids.into_iter().chain(extent) {
                free_map.deallocate(sid);
            }
            None
        }
    }
}

impl Inode {
    fn new(addr: SectorId, kind: InodeKind, loaded: Once<Result<()>>) -> Self {
        Self {
            addr,
            loaded,
            data: RwLock::new(InodeData::default()),
            meta: Mutex::new(InodeMeta {
                kind,
                links: 0,
                opens: 0,
                status: Status::Live,
            }),
        }
    }

    #[inline]
    pub fn addr(&self) -> SectorId {
        self.addr
    }

    #[inline]
    pub fn kind(&self) -> InodeKind {
        self.meta.lock().kind
    }

    #[inline]
    pub fn links(&self) -> u32 {
        self.meta.lock().links
    }

    #[inline]
    pub fn opens(&self) -> u32 {
        self.meta.lock().opens
    }

    /// 保留 inode 永不回收，其头部扇区也不计入占用
    #[inline]
    pub fn is_reserved(&self) -> bool {
        self.addr == FREE_MAP_SECTOR || self.addr == ROOT_SECTOR
    }

    pub fn lifecycle(&self) -> Lifecycle {
        let meta = self.meta.lock();
        match meta.status {
            Status::Reclaimed => Lifecycle::Reclaimed,
            Status::Unlinked => Lifecycle::UnlinkedOpen,
            Status::Live if meta.links > 0 => Lifecycle::Linked,
            Status::Live => Lifecycle::Created,
        }
    }

    pub fn size(&self) -> Result<u32> {
        Ok(self.read()?.size())
    }

    pub fn get_sector(&self, offset: usize) -> Result<SectorId> {
        self.read()?.sector_of(offset)
    }

    pub fn grow_to(
        &self,
        new_size: u32,
        free_map: &FreeSpaceMap,
        dev: &dyn BlockDevice,
    ) -> Result<u32> {
        Ok(self.write()?.grow_to(new_size, free_map, dev))
    }

    /// 共享地访问数据，已回收时失败
    pub fn read(&self) -> Result<RwLockReadGuard<'_, InodeData>> {
        let data = self.data.read();
        self.check_alive()?;
        Ok(data)
    }

    /// 独占地访问数据，已回收时失败
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, InodeData>> {
        let data = self.data.write();
        self.check_alive()?;
        Ok(data)
    }

    fn check_alive(&self) -> Result<()> {
        if self.meta.lock().status == Status::Reclaimed {
            return Err(Error::InvalidState);
        }
        Ok(())
    }

    pub fn increase_link_count(&self) -> Result<()> {
        let mut meta = self.meta.lock();
        match meta.status {
            Status::Live => {
                meta.links += 1;
                Ok(())
            }
            Status::Unlinked => Err(Error::NotFound),
            Status::Reclaimed => Err(Error::InvalidState),
        }
    }

    pub fn decrease_link_count(&self) {
        let mut meta = self.meta.lock();
        debug_assert!(meta.links > 0);
        meta.links = meta.links.saturating_sub(1);
        if meta.links == 0 && meta.status == Status::Live && !self.is_reserved() {
            meta.status = Status::Unlinked;
        }
    }

    pub fn increase_open_count(&self) -> Result<()> {
        let mut meta = self.meta.lock();
        match meta.status {
            Status::Live => {
                meta.opens += 1;
                Ok(())
            }
            Status::Unlinked => Err(Error::NotFound),
            Status::Reclaimed => Err(Error::InvalidState),
        }
    }

    pub fn decrease_open_count(&self) {
        let mut meta = self.meta.lock();
        debug_assert!(meta.opens > 0);
        meta.opens = meta.opens.saturating_sub(1);
    }

    /// 链接数与打开数均为0时回收：移出 inode 表，交还全部扇区。
    /// 返回本次调用是否完成了回收。
    pub fn try_reclaim(&self, table: &InodeTable, free_map: &FreeSpaceMap) -> bool {
        {
            let mut meta = self.meta.lock();
            if meta.status == Status::Reclaimed
                || meta.links != 0
                || meta.opens != 0
                || self.is_reserved()
            {
                return false;
            }
            meta.status = Status::Reclaimed;
        }

        table.remove(self.addr);
        let data = mem::take(&mut *self.data.write());
        let released = data.extents.len() + data.overflow.len() + 1;
        for sid in data
            .extents
            .into_iter()
            .chain(data.overflow)
            .chain(iter::once(self.addr))
        {
            free_map.deallocate(sid);
        }

        log::debug!("inode {} reclaimed, {released} sectors released", self.addr);
        true
    }

    /// 本 inode 占据的全部扇区：头部（保留 inode 除外）、溢出扇区与数据扇区
    pub fn occupied(&self) -> Vec<SectorId> {
        let Ok(data) = self.read() else {
            return Vec::new();
        };
        let header = (!self.is_reserved()).then_some(self.addr);

        header
            .into_iter()
            .chain(data.overflow.iter().copied())
            .chain(data.extents.iter().copied())
            .collect()
    }

    /// 补足头部落盘所需的溢出扇区
    pub(crate) fn reserve_overflow(&self, free_map: &FreeSpaceMap) -> Result<()> {
        let Ok(mut data) = self.write() else {
            return Ok(());
        };

        let needed = DiskInode::overflow_needed(data.extents.len());
        while data.overflow.len() < needed {
            let sid = free_map.allocate().ok_or(Error::DiskFull)?;
            data.overflow.push(sid);
        }
        Ok(())
    }

    /// 写回头部；已回收的 inode 不写
    pub(crate) fn save(&self, dev: &dyn BlockDevice) -> Result<()> {
        let Ok(data) = self.read() else {
            return Ok(());
        };
        if data.overflow.len() < DiskInode::overflow_needed(data.extents.len()) {
            return Err(Error::DiskFull);
        }

        let meta = self.meta.lock();
        let disk = DiskInode {
            size: data.size,
            kind: meta.kind,
            links: meta.links,
            extents: data.extents.clone(),
            overflow: data.overflow.clone(),
        };
        drop(meta);

        disk.store(self.addr, dev);
        Ok(())
    }

    fn load(&self, dev: &dyn BlockDevice) -> Result<()> {
        let Some(disk) = DiskInode::load(self.addr, dev) else {
            log::error!("inode {} has a malformed header", self.addr);
            return Err(Error::InvalidState);
        };

        let mut data = self.data.write();
        data.size = disk.size;
        data.extents = disk.extents;
        data.overflow = disk.overflow;

        let mut meta = self.meta.lock();
        meta.kind = disk.kind;
        meta.links = disk.links;

        log::trace!(
            "inode {} loaded: {:?}, {} bytes, {} links",
            self.addr,
            meta.kind,
            data.size,
            meta.links
        );
        Ok(())
    }

    #[inline]
    fn ensure_loaded(&self, dev: &dyn BlockDevice) -> Result<()> {
        *self.loaded.call_once(|| self.load(dev))
    }

    /// 按期望的类型检查可达性
    fn check(&self, expected: Option<InodeKind>) -> Result<()> {
        let meta = self.meta.lock();
        match (meta.status, expected) {
            (Status::Reclaimed, _) => Err(Error::NotFound),
            (Status::Unlinked, Some(_)) => Err(Error::NotFound),
            (_, Some(kind)) if kind != meta.kind => Err(Error::TypeMismatch),
            _ => Ok(()),
        }
    }
}

/// 地址到 inode 的映射，保证同一地址只有一个内存对象
#[derive(Default)]
pub struct InodeTable {
    map: Mutex<BTreeMap<SectorId, Arc<Inode>>>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个新建的 inode，调用者需保证地址刚刚分配
    pub fn create(&self, addr: SectorId, kind: InodeKind) -> Arc<Inode> {
        let inode = Arc::new(Inode::new(addr, kind, Once::initialized(Ok(()))));
        let old = self.map.lock().insert(addr, inode.clone());
        debug_assert!(old.is_none(), "inode {addr} already in table");
        inode
    }

    /// 取得`addr`处的 inode，必要时从磁盘载入。
    ///
    /// 给出`expected`时，类型不符返回[`Error::TypeMismatch`]，
    /// 已不可达（链接数归零或已回收）返回[`Error::NotFound`]。
    pub fn get(
        &self,
        addr: SectorId,
        expected: Option<InodeKind>,
        dev: &dyn BlockDevice,
    ) -> Result<Arc<Inode>> {
        let inode = self
            .map
            .lock()
            .entry(addr)
            .or_insert_with(|| Arc::new(Inode::new(addr, InodeKind::default(), Once::new())))
            .clone();

        // 载入在表锁之外进行
        if let Err(err) = inode.ensure_loaded(dev) {
            let mut map = self.map.lock();
            if map.get(&addr).is_some_and(|cur| Arc::ptr_eq(cur, &inode)) {
                map.remove(&addr);
            }
            return Err(err);
        }

        inode.check(expected)?;
        Ok(inode)
    }

    pub fn remove(&self, addr: SectorId) -> Option<Arc<Inode>> {
        self.map.lock().remove(&addr)
    }

    /// 当前在内存中的全部 inode
    pub fn live(&self) -> Vec<Arc<Inode>> {
        self.map.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }
}
