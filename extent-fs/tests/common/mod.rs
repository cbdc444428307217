#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use extent_fs::{BlockDevice, EmptySeed, FileSystem, FsConfig, SECTOR_SIZE, SeedSource};

/// 内存中的块设备
pub struct RamDisk(Mutex<Vec<u8>>);

impl RamDisk {
    pub fn new(sectors: u32) -> Arc<Self> {
        Arc::new(Self(Mutex::new(vec![0; sectors as usize * SECTOR_SIZE])))
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let start = block_id * SECTOR_SIZE;
        buf.copy_from_slice(&self.0.lock().unwrap()[start..start + SECTOR_SIZE]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let start = block_id * SECTOR_SIZE;
        self.0.lock().unwrap()[start..start + SECTOR_SIZE].copy_from_slice(buf);
    }
}

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 在新的内存设备上格式化
pub fn format(sectors: u32) -> (FileSystem, Arc<RamDisk>) {
    format_with(sectors, &EmptySeed)
}

pub fn format_with(sectors: u32, seed: &dyn SeedSource) -> (FileSystem, Arc<RamDisk>) {
    init_log();
    let disk = RamDisk::new(sectors);
    let fs = FileSystem::format(disk.clone(), FsConfig::new(sectors), seed).unwrap();
    (fs, disk)
}

pub fn remount(disk: &Arc<RamDisk>, sectors: u32) -> FileSystem {
    FileSystem::mount(disk.clone(), FsConfig::new(sectors)).unwrap()
}

/// 0..len 的可辨认字节序列
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 253) as u8).collect()
}
