use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

/// 格式化时导入根目录的初始文件
pub trait SeedSource {
    fn file_names(&self) -> Vec<String>;

    /// 文件不可读时返回空，该文件随即被跳过
    fn read_file(&self, name: &str) -> Option<Vec<u8>>;
}

/// 不导入任何文件
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySeed;

impl SeedSource for EmptySeed {
    fn file_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn read_file(&self, _name: &str) -> Option<Vec<u8>> {
        None
    }
}

impl SeedSource for BTreeMap<String, Vec<u8>> {
    fn file_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn read_file(&self, name: &str) -> Option<Vec<u8>> {
        self.get(name).cloned()
    }
}
