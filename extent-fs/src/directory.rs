//! # 目录层
//!
//! 目录内容在内存中是名称到 inode 地址的表，同步时才写回：
//! 首字为目录项个数，其后依次是定长的目录项。
//!
//! 目录对象按规范绝对路径缓存，一个目录至多对应一个对象。
//! 同时持有两把目录锁时，按路径升序获取。

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use block_dev::BlockDevice;
use spin::{Mutex, MutexGuard};

use crate::inode::Inode;
use crate::layout::{DirEntry, InodeKind};
use crate::sector::{self, SectorId};
use crate::volume::Volume;
use crate::{Error, Result, WORD_SIZE, file, path};

pub struct Directory {
    path: String,
    inode: Arc<Inode>,
    table: Mutex<EntryTable>,
}

#[derive(Debug, Default)]
struct EntryTable {
    entries: BTreeMap<String, SectorId>,
    /// 目录已被删除，不再接受新的目录项
    removed: bool,
}

/// 持有目录锁期间的视图，用于把查找与修改合成一步
pub struct DirectoryGuard<'a> {
    dir: &'a Directory,
    table: MutexGuard<'a, EntryTable>,
}

impl Directory {
    pub(crate) fn empty(path: String, inode: Arc<Inode>) -> Self {
        Self {
            path,
            inode,
            table: Mutex::new(EntryTable::default()),
        }
    }

    /// 读出目录内容，大小不足一个字的目录视为空目录
    pub(crate) fn load(path: String, inode: Arc<Inode>, dev: &dyn BlockDevice) -> Result<Self> {
        let bytes = file::read_all(&inode, dev)?;
        let mut entries = BTreeMap::new();

        if bytes.len() >= WORD_SIZE {
            let count = sector::get_word(&bytes, 0) as usize;
            for record in bytes[WORD_SIZE..].chunks_exact(DirEntry::SIZE).take(count) {
                let entry = DirEntry::decode(record);
                entries.insert(entry.name(), entry.inode_id());
            }
            if entries.len() < count {
                log::warn!("directory {path} lists {count} entries, {} readable", entries.len());
            }
        }

        log::trace!("directory {path} loaded with {} entries", entries.len());
        Ok(Self {
            path,
            inode,
            table: Mutex::new(EntryTable {
                entries,
                removed: false,
            }),
        })
    }

    /// 规范绝对路径
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn addr(&self) -> SectorId {
        self.inode.addr()
    }

    #[inline]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    pub fn lock(&self) -> DirectoryGuard<'_> {
        DirectoryGuard {
            dir: self,
            table: self.table.lock(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<SectorId> {
        self.lock().lookup(name)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<(String, SectorId)> {
        self.lock().entries()
    }

    pub(crate) fn add_entry(
        &self,
        name: &str,
        addr: SectorId,
        kind: InodeKind,
        vol: &Volume,
    ) -> Result<Arc<Inode>> {
        self.lock().add_entry(name, addr, kind, vol)
    }

    pub(crate) fn remove_entry(&self, name: &str, kind: InodeKind, vol: &Volume) -> bool {
        self.lock().remove_entry(name, kind, vol)
    }

    /// 把目录文件扩张到足以写回当前内容，不写设备
    pub(crate) fn reserve(&self, vol: &Volume) -> Result<()> {
        let table = self.table.lock();
        if table.removed {
            return Ok(());
        }
        reserve_image(&self.inode, table.entries.len(), vol)
    }

    /// 写回目录内容；已删除的目录不写
    pub(crate) fn save(&self, vol: &Volume) -> Result<()> {
        let table = self.table.lock();
        if table.removed {
            return Ok(());
        }

        let mut bytes = vec![0; image_len(table.entries.len())];
        sector::put_word(&mut bytes, 0, table.entries.len() as u32);
        for ((name, &addr), record) in table
            .entries
            .iter()
            .zip(bytes[WORD_SIZE..].chunks_exact_mut(DirEntry::SIZE))
        {
            DirEntry::new(name, addr).encode(record);
        }

        if file::write_at(&self.inode, 0, &bytes, vol)? < bytes.len() {
            return Err(Error::DiskFull);
        }
        Ok(())
    }
}

impl DirectoryGuard<'_> {
    #[inline]
    pub fn directory(&self) -> &Directory {
        self.dir
    }

    pub fn lookup(&self, name: &str) -> Option<SectorId> {
        self.table.entries.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.table.entries.is_empty()
    }

    pub fn is_removed(&self) -> bool {
        self.table.removed
    }

    pub fn entries(&self) -> Vec<(String, SectorId)> {
        self.table
            .entries
            .iter()
            .map(|(name, &addr)| (name.clone(), addr))
            .collect()
    }

    /// 加入目录项并为目标 inode 增加链接数。
    ///
    /// 目标的类型须为`kind`；名称已存在时返回[`Error::AlreadyExists`]。
    pub(crate) fn add_entry(
        &mut self,
        name: &str,
        addr: SectorId,
        kind: InodeKind,
        vol: &Volume,
    ) -> Result<Arc<Inode>> {
        if self.table.removed {
            return Err(Error::NotFound);
        }
        path::validate_name(name)?;
        if self.table.entries.contains_key(name) {
            return Err(Error::AlreadyExists);
        }

        let inode = vol.inodes.get(addr, Some(kind), vol.dev())?;
        // 先为写回新目录项留出空间，之后的同步不会因此失败
        reserve_image(&self.dir.inode, self.table.entries.len() + 1, vol)?;
        inode.increase_link_count()?;
        self.table.entries.insert(name.to_string(), addr);

        log::debug!("{}: link {name:?} -> {addr}", self.dir.path);
        Ok(inode)
    }

    /// 移除类型为`kind`的目录项，并为目标减少链接数，可能就此回收。
    /// 名称不存在或类型不符时返回`false`。
    pub(crate) fn remove_entry(&mut self, name: &str, kind: InodeKind, vol: &Volume) -> bool {
        let Some(addr) = self.lookup(name) else {
            return false;
        };
        let Ok(inode) = vol.inodes.get(addr, Some(kind), vol.dev()) else {
            return false;
        };

        self.table.entries.remove(name);
        inode.decrease_link_count();
        inode.try_reclaim(&vol.inodes, &vol.free_map);

        log::debug!("{}: unlink {name:?} -> {addr}", self.dir.path);
        true
    }

    pub(crate) fn mark_removed(&mut self) {
        self.table.removed = true;
    }
}

/// 含`entries`个目录项的目录文件的字节数
fn image_len(entries: usize) -> usize {
    WORD_SIZE + entries * DirEntry::SIZE
}

fn reserve_image(inode: &Inode, entries: usize, vol: &Volume) -> Result<()> {
    let len = image_len(entries) as u32;
    if inode.grow_to(len, &vol.free_map, vol.dev())? < len {
        return Err(Error::DiskFull);
    }
    Ok(())
}

/// 按规范绝对路径缓存的目录对象
#[derive(Default)]
pub(crate) struct DirectoryCache {
    dirs: Mutex<BTreeMap<String, Arc<Directory>>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Arc<Directory>> {
        self.dirs.lock().get(path).cloned()
    }

    pub fn insert(&self, dir: Directory) -> Arc<Directory> {
        let dir = Arc::new(dir);
        self.dirs.lock().insert(dir.path.clone(), dir.clone());
        dir
    }

    /// 取得`path`处的目录对象，未缓存时从`inode`载入。
    ///
    /// 按路径与 inode 地址两者查找，保证同一目录只有一个对象。
    pub fn get_or_load(
        &self,
        path: &str,
        inode: Arc<Inode>,
        dev: &dyn BlockDevice,
    ) -> Result<Arc<Directory>> {
        if let Some(dir) = self.find(path, inode.addr()) {
            return Ok(dir);
        }

        // 设备读取在缓存锁之外进行，并发载入时保留先登记的对象
        let loaded = Arc::new(Directory::load(path.to_string(), inode, dev)?);
        let mut dirs = self.dirs.lock();
        if let Some(dir) = dirs.values().find(|dir| dir.addr() == loaded.addr()) {
            return Ok(dir.clone());
        }
        Ok(dirs.entry(path.to_string()).or_insert(loaded).clone())
    }

    fn find(&self, path: &str, addr: SectorId) -> Option<Arc<Directory>> {
        let dirs = self.dirs.lock();
        dirs.get(path)
            .or_else(|| dirs.values().find(|dir| dir.addr() == addr))
            .cloned()
    }

    pub fn evict(&self, path: &str) -> Option<Arc<Directory>> {
        self.dirs.lock().remove(path)
    }

    pub fn all(&self) -> Vec<Arc<Directory>> {
        self.dirs.lock().values().cloned().collect()
    }
}
