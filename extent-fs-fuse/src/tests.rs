use std::fs;
use std::sync::Arc;

use extent_fs::{EmptySeed, Error, FileSystem, FsConfig, Session};

use super::*;

#[test]
fn block_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let dev = BlockFile::create(&dir.path().join("fs.img"), 4).unwrap();

    let block = [0x5a; SECTOR_SIZE];
    dev.write_block(3, &block);
    let mut buf = [0; SECTOR_SIZE];
    dev.read_block(3, &mut buf);
    assert_eq!(buf, block);

    dev.read_block(0, &mut buf);
    assert_eq!(buf, [0; SECTOR_SIZE]);
}

#[test]
fn host_dir_filters_by_suffix() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("hello.coff"), b"hello").unwrap();
    fs::write(dir.path().join("notes.txt"), b"notes").unwrap();
    fs::create_dir(dir.path().join("nested.coff")).unwrap();

    let seed = HostDir::scan(dir.path(), Some(".coff")).unwrap();
    assert_eq!(seed.file_names(), ["hello.coff"]);
    assert_eq!(seed.read_file("hello.coff").as_deref(), Some(&b"hello"[..]));
    assert_eq!(seed.read_file("notes.txt"), None);

    let seed = HostDir::scan(dir.path(), None).unwrap();
    assert_eq!(seed.len(), 2);
}

#[test]
fn packed_image_survives_remount() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source");
    fs::create_dir(&source).unwrap();
    let program: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
    fs::write(source.join("init.coff"), &program).unwrap();

    let image = dir.path().join("fs.img");
    let seed = HostDir::scan(&source, None).unwrap();
    let dev = Arc::new(BlockFile::create(&image, 256).unwrap());
    FileSystem::format(dev, FsConfig::new(256), &seed)
        .unwrap()
        .shutdown()
        .unwrap();

    let (dev, sectors) = BlockFile::open(&image).unwrap();
    assert_eq!(sectors, 256);
    let fs = FileSystem::mount(Arc::new(dev), FsConfig::new(sectors)).unwrap();
    let mut handle = fs.open(&Session::new(), "init.coff", false).unwrap();
    let mut buf = vec![0; 4096];
    assert_eq!(handle.read(&mut buf), Ok(program.len()));
    assert_eq!(&buf[..program.len()], &program[..]);
}

#[test]
fn empty_image_mounts() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("fs.img");
    let dev = Arc::new(BlockFile::create(&image, 64).unwrap());
    FileSystem::format(dev, FsConfig::new(64), &EmptySeed)
        .unwrap()
        .shutdown()
        .unwrap();

    let (dev, sectors) = BlockFile::open(&image).unwrap();
    let fs = FileSystem::mount(Arc::new(dev), FsConfig::new(sectors)).unwrap();
    assert!(fs.read_dir(&Session::new(), "/").unwrap().is_empty());
    assert_eq!(
        fs.open(&Session::new(), "missing", false).unwrap_err(),
        Error::NotFound
    );
}
