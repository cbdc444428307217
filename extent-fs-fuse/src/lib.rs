#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use block_dev::BlockDevice;
use extent_fs::{SECTOR_SIZE, SeedSource};

/// 以宿主文件模拟的块设备
pub struct BlockFile(pub Mutex<File>);

impl BlockFile {
    /// 创建（或截断）镜像文件，长度为`sectors`个扇区
    pub fn create(path: &Path, sectors: u32) -> io::Result<Self> {
        let fd = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fd.set_len(sectors as u64 * SECTOR_SIZE as u64)?;

        Ok(Self(Mutex::new(fd)))
    }

    /// 打开已有的镜像文件，返回设备与扇区数
    pub fn open(path: &Path) -> io::Result<(Self, u32)> {
        let fd = File::options().read(true).write(true).open(path)?;
        let sectors = fd.metadata()?.len() / SECTOR_SIZE as u64;

        Ok((Self(Mutex::new(fd)), sectors as u32))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }
}

/// 宿主目录中的普通文件，可按后缀过滤
pub struct HostDir {
    files: BTreeMap<String, PathBuf>,
}

impl HostDir {
    pub fn scan(dir: &Path, suffix: Option<&str>) -> io::Result<Self> {
        let mut files = BTreeMap::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                log::warn!("skip non UTF-8 file name {:?}", entry.file_name());
                continue;
            };
            if suffix.is_some_and(|suffix| !name.ends_with(suffix)) {
                continue;
            }
            files.insert(name, entry.path());
        }

        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SeedSource for HostDir {
    fn file_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    fn read_file(&self, name: &str) -> Option<Vec<u8>> {
        let path = self.files.get(name)?;
        match fs::read(path) {
            Ok(data) => Some(data),
            Err(err) => {
                log::warn!("failed to read {}: {err}", path.display());
                None
            }
        }
    }
}
