//! # 文件系统层
//!
//! 所有命名空间操作的入口。路径先按会话的工作目录规范化，
//! 再从最深的已缓存祖先目录逐级向下解析。
//!
//! 查找与修改在同一把目录锁下完成；需要两把目录锁时按路径升序获取。

use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use vfs::{DirEntry, Stat};

use crate::directory::Directory;
use crate::file::{self, FileHandle};
use crate::free_map::FreeSpaceMap;
use crate::inode::{Inode, InodeTable, Lifecycle};
use crate::layout::InodeKind;
use crate::path::{self, Path};
use crate::seed::SeedSource;
use crate::volume::{FsConfig, Volume};
use crate::{BlockDevice, Error, FREE_MAP_SECTOR, ROOT_SECTOR, Result};

/// 挂载的文件系统
pub struct FileSystem {
    vol: Arc<Volume>,
    root: Arc<Directory>,
}

/// 一个调用者的上下文，目前只有工作目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    cwd: String,
}

impl Session {
    pub fn new() -> Self {
        Self {
            cwd: String::from("/"),
        }
    }

    /// 规范绝对路径
    #[inline]
    pub fn cwd(&self) -> &str {
        &self.cwd
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// 路径解析的结果
pub enum PathResolution {
    Root,
    /// 父目录已存在；`name`本身可以不存在
    Child { parent: Arc<Directory>, name: String },
}

impl PathResolution {
    pub fn parent(&self) -> Option<&Arc<Directory>> {
        match self {
            Self::Root => None,
            Self::Child { parent, .. } => Some(parent),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Child { name, .. } => Some(name),
        }
    }
}

/// 扇区占用的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceReport {
    pub total: usize,
    pub free: usize,
    /// 0号与1号扇区
    pub reserved: usize,
    /// 全部可达的 inode 以及已删除但仍被打开的文件占据的扇区
    pub in_use: usize,
}

impl SpaceReport {
    /// 每个扇区恰好处于空闲、保留、占用之一
    pub fn is_conserved(&self) -> bool {
        self.free + self.reserved + self.in_use == self.total
    }
}

impl FileSystem {
    /// 在设备上建立新的文件系统，并把`seed`中的文件导入根目录
    pub fn format(
        dev: Arc<dyn BlockDevice>,
        config: FsConfig,
        seed: &dyn SeedSource,
    ) -> Result<Self> {
        if config.total_sectors <= ROOT_SECTOR.raw() {
            return Err(Error::DiskFull);
        }

        let vol = Arc::new(Volume::new(
            dev,
            FreeSpaceMap::format(config.total_sectors),
            InodeTable::new(),
            config,
        ));

        // 保留 inode 的链接数恒为1，永不回收
        let system = vol.inodes.create(FREE_MAP_SECTOR, InodeKind::System);
        system.increase_link_count()?;
        let root = vol.inodes.create(ROOT_SECTOR, InodeKind::Folder);
        root.increase_link_count()?;
        let root = vol.dirs.insert(Directory::empty(String::from("/"), root));
        // 空闲扇区表的大小只取决于扇区总数，在导入文件之前占好位置
        vol.free_map.prepare(&system, &vol)?;

        let fs = Self { vol, root };
        fs.import(seed)?;
        fs.sync()?;

        log::info!(
            "formatted {} sectors, {} free",
            config.total_sectors,
            fs.free_sectors()
        );
        Ok(fs)
    }

    /// 挂载设备上已有的文件系统
    pub fn mount(dev: Arc<dyn BlockDevice>, config: FsConfig) -> Result<Self> {
        let inodes = InodeTable::new();
        let system = inodes.get(FREE_MAP_SECTOR, Some(InodeKind::System), &*dev)?;
        let free_map = FreeSpaceMap::load(&system, config.total_sectors, &*dev)?;

        let vol = Arc::new(Volume::new(dev, free_map, inodes, config));
        let root = vol.inodes.get(ROOT_SECTOR, Some(InodeKind::Folder), vol.dev())?;
        let root = vol.dirs.get_or_load("/", root, vol.dev())?;

        log::info!(
            "mounted {} sectors, {} free",
            config.total_sectors,
            vol.free_map.free_count()
        );
        Ok(Self { vol, root })
    }

    fn import(&self, seed: &dyn SeedSource) -> Result<()> {
        let session = Session::new();
        for name in seed.file_names() {
            let Some(bytes) = seed.read_file(&name) else {
                log::warn!("seed file {name:?} is unreadable, skipped");
                continue;
            };

            let handle = self.open(&session, &name, true)?;
            if handle.write_at(0, &bytes)? < bytes.len() {
                return Err(Error::DiskFull);
            }
            log::debug!("imported {name:?}, {} bytes", bytes.len());
        }
        Ok(())
    }

    /// 把内存中的全部状态写回设备。
    ///
    /// 先完成全部扩张：各目录文件、空闲扇区表、溢出扇区，
    /// 任何一步空间不足都在写设备之前返回[`Error::DiskFull`]，
    /// 设备保持上一次同步的状态。
    /// 随后依次写回根目录、其余已缓存目录、空闲扇区表、全部 inode 头部。
    /// 已删除但仍被打开的文件不落盘，其扇区在映像中记为空闲。
    pub fn sync(&self) -> Result<()> {
        let vol = &*self.vol;
        let mut dirs = vol.dirs.all();
        dirs.retain(|dir| !Arc::ptr_eq(dir, &self.root));
        dirs.insert(0, self.root.clone());

        let system = vol
            .inodes
            .get(FREE_MAP_SECTOR, Some(InodeKind::System), vol.dev())?;
        for dir in &dirs {
            dir.reserve(vol)?;
        }
        vol.free_map.prepare(&system, vol)?;

        let (orphans, inodes): (Vec<Arc<Inode>>, Vec<Arc<Inode>>) = vol
            .inodes
            .live()
            .into_iter()
            .partition(|inode| inode.lifecycle() == Lifecycle::UnlinkedOpen);
        for inode in &inodes {
            inode.reserve_overflow(&vol.free_map)?;
        }

        for dir in &dirs {
            dir.save(vol)?;
        }
        let released: Vec<_> = orphans.iter().flat_map(|inode| inode.occupied()).collect();
        vol.free_map.save(&system, &released, vol)?;
        for inode in &inodes {
            inode.save(vol.dev())?;
        }

        log::debug!(
            "synced {} directories, {} inodes, {} orphans dropped from the image",
            dirs.len(),
            inodes.len(),
            orphans.len()
        );
        Ok(())
    }

    pub fn shutdown(self) -> Result<()> {
        self.sync()?;
        log::info!("shut down, {} sectors free", self.free_sectors());
        Ok(())
    }

    #[inline]
    pub fn config(&self) -> FsConfig {
        self.vol.config
    }

    pub fn free_sectors(&self) -> usize {
        self.vol.free_map.free_count()
    }

    /// 统计扇区占用。
    ///
    /// 先从根目录出发载入全部可达的 inode，
    /// 已删除但仍被打开的文件已在内存中，同样计入。
    pub fn space_report(&self) -> SpaceReport {
        if let Err(err) = self.load_reachable() {
            log::warn!("space report may be incomplete: {err}");
        }

        let in_use = self
            .vol
            .inodes
            .live()
            .iter()
            .map(|inode| inode.occupied().len())
            .sum();

        SpaceReport {
            total: self.vol.config.total_sectors as usize,
            free: self.vol.free_map.free_count(),
            reserved: 2,
            in_use,
        }
    }

    /// 逐层载入命名空间中的全部 inode 与目录
    fn load_reachable(&self) -> Result<()> {
        let vol = &*self.vol;
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let guard = dir.lock();
            for (name, addr) in guard.entries() {
                let inode = vol.inodes.get(addr, None, vol.dev())?;
                if inode.kind() == InodeKind::Folder {
                    let path = path::join(dir.path(), &name);
                    pending.push(vol.dirs.get_or_load(&path, inode, vol.dev())?);
                }
            }
        }
        Ok(())
    }

    pub fn resolve(&self, session: &Session, path: &str) -> Result<PathResolution> {
        self.resolve_canonical(&path::canonicalize(path, session.cwd()))
    }

    fn resolve_canonical(&self, abs: &str) -> Result<PathResolution> {
        let Some((parent, name)) = abs.parent_file() else {
            return Ok(PathResolution::Root);
        };

        Ok(PathResolution::Child {
            parent: self.walk(parent)?,
            name: name.to_string(),
        })
    }

    /// 取得规范路径`dir_path`处的目录对象
    fn walk(&self, dir_path: &str) -> Result<Arc<Directory>> {
        let Some(relative) = dir_path.root_relative() else {
            return Ok(self.root.clone());
        };
        let cmps: Vec<&str> = relative.split('/').collect();

        // 最深的已缓存祖先
        let (mut dir, depth) = (1..=cmps.len())
            .rev()
            .find_map(|depth| {
                let prefix = format!("/{}", cmps[..depth].join("/"));
                self.vol.dirs.get(&prefix).map(|dir| (dir, depth))
            })
            .unwrap_or_else(|| (self.root.clone(), 0));

        for cmp in &cmps[depth..] {
            dir = self.child_dir(&dir, cmp)?;
        }
        Ok(dir)
    }

    /// 在目录锁下查找子目录，必要时载入
    fn child_dir(&self, parent: &Directory, name: &str) -> Result<Arc<Directory>> {
        let vol = &*self.vol;
        let guard = parent.lock();
        let addr = guard.lookup(name).ok_or(Error::NotFound)?;
        let inode = vol.inodes.get(addr, Some(InodeKind::Folder), vol.dev())?;
        vol.dirs
            .get_or_load(&path::join(parent.path(), name), inode, vol.dev())
    }

    fn open_dir(&self, abs: &str) -> Result<Arc<Directory>> {
        match self.resolve_canonical(abs)? {
            PathResolution::Root => Ok(self.root.clone()),
            PathResolution::Child { parent, name } => self.child_dir(&parent, &name),
        }
    }

    /// 打开普通文件。
    ///
    /// 不存在且`create`时新建；符号链接被跟随一层，
    /// 其相对目标基于链接所在的目录解析。
    pub fn open(&self, session: &Session, path: &str, create: bool) -> Result<FileHandle> {
        self.open_canonical(&path::canonicalize(path, session.cwd()), create, true)
    }

    fn open_canonical(&self, abs: &str, create: bool, follow: bool) -> Result<FileHandle> {
        let vol = &*self.vol;
        let PathResolution::Child { parent, name } = self.resolve_canonical(abs)? else {
            return Err(Error::TypeMismatch);
        };

        let mut guard = parent.lock();
        let inode = match guard.lookup(&name) {
            Some(addr) => {
                let inode = vol.inodes.get(addr, None, vol.dev())?;
                match inode.kind() {
                    InodeKind::File => inode,
                    InodeKind::Symlink if follow => {
                        // 读取链接内容期间同样计入打开数
                        inode.increase_open_count()?;
                        drop(guard);
                        return self.follow_symlink(&parent, &inode);
                    }
                    _ => return Err(Error::TypeMismatch),
                }
            }
            None if create => {
                path::validate_name(&name)?;
                let addr = vol.free_map.allocate().ok_or(Error::DiskFull)?;
                let inode = vol.inodes.create(addr, InodeKind::File);
                if let Err(err) = guard.add_entry(&name, addr, InodeKind::File, vol) {
                    inode.try_reclaim(&vol.inodes, &vol.free_map);
                    return Err(err);
                }
                inode
            }
            None => return Err(Error::NotFound),
        };

        // 在目录锁释放之前计入打开数，防止被并发删除回收
        inode.increase_open_count()?;
        drop(guard);

        log::debug!("open {abs} -> inode {}", inode.addr());
        Ok(FileHandle::new(self.vol.clone(), inode))
    }

    /// 跟随已计入打开数的链接`link`，返回前释放这次打开
    fn follow_symlink(&self, parent: &Directory, link: &Inode) -> Result<FileHandle> {
        let vol = &*self.vol;
        let target = file::read_all(link, vol.dev());
        link.decrease_open_count();
        link.try_reclaim(&vol.inodes, &vol.free_map);

        let target = String::from_utf8(target?).map_err(|_| Error::InvalidState)?;
        let abs = path::canonicalize(&target, parent.path());

        log::trace!("follow symlink {} -> {abs}", link.addr());
        self.open_canonical(&abs, false, false)
    }

    /// 删除普通文件或符号链接的目录项。
    /// 仍被打开的文件在最后一个句柄关闭时回收。
    pub fn remove(&self, session: &Session, path: &str) -> Result<()> {
        let vol = &*self.vol;
        let PathResolution::Child { parent, name } = self.resolve(session, path)? else {
            return Err(Error::TypeMismatch);
        };

        let mut guard = parent.lock();
        let addr = guard.lookup(&name).ok_or(Error::NotFound)?;
        let kind = vol.inodes.get(addr, None, vol.dev())?.kind();
        if !matches!(kind, InodeKind::File | InodeKind::Symlink) {
            return Err(Error::TypeMismatch);
        }

        if guard.remove_entry(&name, kind, vol) {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    pub fn make_dir(&self, session: &Session, path: &str) -> Result<()> {
        let vol = &*self.vol;
        let PathResolution::Child { parent, name } = self.resolve(session, path)? else {
            return Err(Error::AlreadyExists);
        };
        path::validate_name(&name)?;

        let mut guard = parent.lock();
        if guard.lookup(&name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let addr = vol.free_map.allocate().ok_or(Error::DiskFull)?;
        let inode = vol.inodes.create(addr, InodeKind::Folder);
        if let Err(err) = guard.add_entry(&name, addr, InodeKind::Folder, vol) {
            inode.try_reclaim(&vol.inodes, &vol.free_map);
            return Err(err);
        }
        Ok(())
    }

    /// 删除空目录，根目录不可删除
    pub fn remove_dir(&self, session: &Session, path: &str) -> Result<()> {
        let vol = &*self.vol;
        let PathResolution::Child { parent, name } = self.resolve(session, path)? else {
            return Err(Error::InvalidName);
        };

        let mut guard = parent.lock();
        let addr = guard.lookup(&name).ok_or(Error::NotFound)?;
        let inode = vol.inodes.get(addr, Some(InodeKind::Folder), vol.dev())?;
        let child_path = path::join(parent.path(), &name);
        let dir = vol.dirs.get_or_load(&child_path, inode, vol.dev())?;

        let mut child = dir.lock();
        if !child.is_empty() {
            return Err(Error::NotEmpty);
        }
        child.mark_removed();
        vol.dirs.evict(&child_path);

        if guard.remove_entry(&name, InodeKind::Folder, vol) {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    pub fn change_dir(&self, session: &mut Session, path: &str) -> Result<()> {
        let abs = path::canonicalize(path, session.cwd());
        self.open_dir(&abs)?;
        session.cwd = abs;
        Ok(())
    }

    pub fn get_cwd(&self, session: &Session) -> String {
        session.cwd.clone()
    }

    pub fn read_dir(&self, session: &Session, path: &str) -> Result<Vec<DirEntry>> {
        let vol = &*self.vol;
        let dir = self.open_dir(&path::canonicalize(path, session.cwd()))?;

        let guard = dir.lock();
        guard
            .entries()
            .into_iter()
            .map(|(name, addr)| -> Result<DirEntry> {
                let inode = vol.inodes.get(addr, None, vol.dev())?;
                Ok(DirEntry {
                    inode: addr.raw() as u64,
                    ty: inode.kind().into(),
                    name,
                })
            })
            .collect()
    }

    /// 不跟随符号链接
    pub fn stat(&self, session: &Session, path: &str) -> Result<Stat> {
        let vol = &*self.vol;
        match self.resolve(session, path)? {
            PathResolution::Root => Self::stat_of(String::from("/"), self.root.inode()),
            PathResolution::Child { parent, name } => {
                let guard = parent.lock();
                let addr = guard.lookup(&name).ok_or(Error::NotFound)?;
                let inode = vol.inodes.get(addr, None, vol.dev())?;
                drop(guard);
                Self::stat_of(name, &inode)
            }
        }
    }

    fn stat_of(name: String, inode: &Inode) -> Result<Stat> {
        let data = inode.read()?;
        Ok(Stat {
            name,
            mode: inode.kind().into(),
            size: data.size() as u64,
            sectors: data.sectors() as u64,
            inode: inode.addr().raw() as u64,
            links: inode.links(),
        })
    }

    /// 为普通文件`src`建立新名称`dst`
    pub fn create_hard_link(&self, session: &Session, src: &str, dst: &str) -> Result<()> {
        let vol = &*self.vol;
        let PathResolution::Child {
            parent: src_dir,
            name: src_name,
        } = self.resolve(session, src)?
        else {
            return Err(Error::TypeMismatch);
        };
        let PathResolution::Child {
            parent: dst_dir,
            name: dst_name,
        } = self.resolve(session, dst)?
        else {
            return Err(Error::AlreadyExists);
        };

        if Arc::ptr_eq(&src_dir, &dst_dir) {
            let mut guard = dst_dir.lock();
            let addr = guard.lookup(&src_name).ok_or(Error::NotFound)?;
            guard.add_entry(&dst_name, addr, InodeKind::File, vol)?;
            return Ok(());
        }

        let (src_guard, mut dst_guard) = if src_dir.path() < dst_dir.path() {
            let src_guard = src_dir.lock();
            (src_guard, dst_dir.lock())
        } else {
            let dst_guard = dst_dir.lock();
            (src_dir.lock(), dst_guard)
        };
        let addr = src_guard.lookup(&src_name).ok_or(Error::NotFound)?;
        dst_guard.add_entry(&dst_name, addr, InodeKind::File, vol)?;
        Ok(())
    }

    /// 建立内容为`target`的符号链接，目标可以不存在
    pub fn create_symlink(&self, session: &Session, target: &str, link: &str) -> Result<()> {
        let vol = &*self.vol;
        if target.is_empty() {
            return Err(Error::InvalidName);
        }
        let PathResolution::Child { parent, name } = self.resolve(session, link)? else {
            return Err(Error::AlreadyExists);
        };
        path::validate_name(&name)?;

        let mut guard = parent.lock();
        if guard.lookup(&name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let addr = vol.free_map.allocate().ok_or(Error::DiskFull)?;
        let inode = vol.inodes.create(addr, InodeKind::Symlink);
        let linked = file::write_at(&inode, 0, target.as_bytes(), vol).and_then(|len| {
            if len < target.len() {
                return Err(Error::DiskFull);
            }
            guard.add_entry(&name, addr, InodeKind::Symlink, vol)
        });

        if let Err(err) = linked {
            inode.try_reclaim(&vol.inodes, &vol.free_map);
            return Err(err);
        }
        Ok(())
    }
}
