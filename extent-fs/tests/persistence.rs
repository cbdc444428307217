mod common;

use std::collections::BTreeMap;

use common::{format, format_with, pattern, remount};
use extent_fs::{Error, FileSystem, FsConfig, SECTOR_SIZE, Session};
use vfs::DirEntryType;

#[test]
fn tree_survives_remount() {
    let (fs, disk) = format(1024);
    let session = Session::new();
    let data = pattern(5000);

    fs.make_dir(&session, "/docs").unwrap();
    fs.make_dir(&session, "/docs/deep").unwrap();
    fs.open(&session, "/docs/deep/note", true)
        .unwrap()
        .write(&data)
        .unwrap();
    fs.create_symlink(&session, "docs/deep/note", "/link").unwrap();
    fs.create_hard_link(&session, "/docs/deep/note", "/alias").unwrap();
    fs.sync().unwrap();
    let free = fs.free_sectors();
    fs.shutdown().unwrap();

    let fs = remount(&disk, 1024);
    assert_eq!(fs.free_sectors(), free);

    let handle = fs.open(&session, "/link", false).unwrap();
    let mut buf = vec![0; data.len()];
    assert_eq!(handle.read_at(0, &mut buf), Ok(data.len()));
    assert_eq!(buf, data);

    assert_eq!(fs.stat(&session, "/alias").unwrap().links, 2);
    let docs = fs.read_dir(&session, "/docs").unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].name, "deep");
    assert_eq!(docs[0].ty, DirEntryType::Directory);

    let mut root: Vec<_> = fs
        .read_dir(&session, "/")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    root.sort();
    assert_eq!(root, ["alias", "docs", "link"]);
}

#[test]
fn changes_after_remount_persist() {
    let (fs, disk) = format(512);
    let session = Session::new();
    fs.open(&session, "keep", true).unwrap().write(b"1").unwrap();
    fs.open(&session, "drop", true).unwrap().write(b"2").unwrap();
    fs.shutdown().unwrap();

    let fs = remount(&disk, 512);
    fs.remove(&session, "drop").unwrap();
    fs.make_dir(&session, "new").unwrap();
    fs.sync().unwrap();
    let free = fs.free_sectors();
    fs.shutdown().unwrap();

    let fs = remount(&disk, 512);
    assert_eq!(fs.free_sectors(), free);
    assert_eq!(fs.stat(&session, "drop").unwrap_err(), Error::NotFound);
    assert_eq!(fs.stat(&session, "keep").unwrap().size, 1);
    assert_eq!(fs.stat(&session, "new").unwrap().mode, DirEntryType::Directory);
}

#[test]
fn space_is_conserved() {
    let (fs, _disk) = format(1024);
    let session = Session::new();
    assert!(fs.space_report().is_conserved());
    let baseline = fs.free_sectors();

    fs.make_dir(&session, "d").unwrap();
    for i in 0..8 {
        let handle = fs.open(&session, &format!("d/f{i}"), true).unwrap();
        handle.write_at(0, &pattern(1000 * i + 1)).unwrap();
        assert!(fs.space_report().is_conserved());
    }
    fs.create_symlink(&session, "d/f0", "s").unwrap();
    fs.sync().unwrap();
    assert!(fs.space_report().is_conserved());

    for i in 0..8 {
        fs.remove(&session, &format!("d/f{i}")).unwrap();
    }
    fs.remove(&session, "s").unwrap();
    fs.sync().unwrap();
    let report = fs.space_report();
    assert!(report.is_conserved());
    assert_eq!(report.reserved, 2);

    // 目录只增不减：d 曾写回8个目录项，4 + 8 * 260 字节
    assert_eq!(fs.stat(&session, "d").unwrap().sectors, 5);
    fs.remove_dir(&session, "d").unwrap();
    assert!(fs.space_report().is_conserved());
    // 根目录曾写回两个目录项，多占了1个扇区
    assert_eq!(fs.stat(&session, "/").unwrap().sectors, 2);
    assert_eq!(fs.free_sectors() + 1, baseline);
}

#[test]
fn space_is_conserved_after_remount() {
    let (fs, disk) = format(256);
    let session = Session::new();
    fs.open(&session, "a", true)
        .unwrap()
        .write(&pattern(3000))
        .unwrap();
    fs.make_dir(&session, "d").unwrap();
    fs.open(&session, "d/inner", true).unwrap().write(b"x").unwrap();
    fs.create_symlink(&session, "d/inner", "s").unwrap();
    fs.sync().unwrap();
    let before = fs.space_report();
    assert!(before.is_conserved());
    fs.shutdown().unwrap();

    // 挂载后尚未访问任何文件
    let fs = remount(&disk, 256);
    let report = fs.space_report();
    assert!(report.is_conserved());
    assert_eq!(report, before);
    assert_eq!(fs.space_report(), report);
}

#[test]
fn sync_after_filling_the_disk_keeps_every_create() {
    let (fs, disk) = format(64);
    let session = Session::new();
    fs.open(&session, "x", true).unwrap().write(b"x").unwrap();
    fs.open(&session, "y", true).unwrap().write(b"y").unwrap();
    fs.sync().unwrap();

    let mut z = fs.open(&session, "z", true).unwrap();
    let data = pattern(fs.free_sectors() * SECTOR_SIZE);
    assert_eq!(z.write(&data), Ok(data.len()));
    assert_eq!(fs.free_sectors(), 0);
    fs.sync().unwrap();
    drop(z);

    let fs = remount(&disk, 64);
    let mut names: Vec<_> = fs
        .read_dir(&session, "/")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    names.sort();
    assert_eq!(names, ["x", "y", "z"]);
    assert_eq!(fs.stat(&session, "z").unwrap().size, data.len() as u64);
    assert_eq!(fs.free_sectors(), 0);
    assert!(fs.space_report().is_conserved());
}

#[test]
fn create_fails_when_directory_cannot_grow() {
    let (fs, disk) = format(64);
    let session = Session::new();
    fs.open(&session, "a", true).unwrap();
    fs.open(&session, "b", true).unwrap();
    let mut c = fs.open(&session, "c", true).unwrap();

    // 只留1个空闲扇区：够新文件的头部，不够根目录容纳第4个目录项
    let data = pattern((fs.free_sectors() - 1) * SECTOR_SIZE);
    assert_eq!(c.write(&data), Ok(data.len()));
    assert_eq!(fs.free_sectors(), 1);

    assert_eq!(fs.open(&session, "d", true).unwrap_err(), Error::DiskFull);
    assert_eq!(fs.make_dir(&session, "e"), Err(Error::DiskFull));
    assert_eq!(fs.create_hard_link(&session, "a", "f"), Err(Error::DiskFull));
    assert_eq!(fs.free_sectors(), 1);
    assert_eq!(fs.read_dir(&session, "/").unwrap().len(), 3);
    fs.shutdown().unwrap();

    let fs = remount(&disk, 64);
    assert_eq!(fs.read_dir(&session, "/").unwrap().len(), 3);
    assert_eq!(fs.stat(&session, "a").unwrap().links, 1);
    assert_eq!(fs.stat(&session, "d").unwrap_err(), Error::NotFound);
    assert_eq!(fs.free_sectors(), 1);
    assert!(fs.space_report().is_conserved());
}

#[test]
fn unlinked_open_file_is_not_persisted() {
    let (fs, disk) = format(256);
    let session = Session::new();

    let mut handle = fs.open(&session, "tmp", true).unwrap();
    handle.write(&pattern(2000)).unwrap();
    fs.remove(&session, "tmp").unwrap();
    fs.sync().unwrap();

    // 映像中头部与4个数据扇区均为空闲
    let other = remount(&disk, 256);
    assert_eq!(other.free_sectors(), fs.free_sectors() + 5);
    assert_eq!(other.stat(&session, "tmp").unwrap_err(), Error::NotFound);

    handle.close();
    assert!(fs.space_report().is_conserved());
}

#[test]
fn seed_files_are_imported() {
    let seed = BTreeMap::from([
        (String::from("init"), pattern(700)),
        (String::from("sh"), pattern(1500)),
    ]);
    let (fs, disk) = format_with(256, &seed);
    fs.shutdown().unwrap();

    let fs = remount(&disk, 256);
    let session = Session::new();
    for (name, data) in &seed {
        let handle = fs.open(&session, name, false).unwrap();
        let mut buf = vec![0; handle.len()];
        handle.read_at(0, &mut buf).unwrap();
        assert_eq!(&buf, data);
    }
}

#[test]
fn mount_rejects_blank_device() {
    common::init_log();
    let disk = common::RamDisk::new(64);
    // 0号扇区全零：大小0、类型为系统文件，可以读出，但根目录的类型不符
    let err = FileSystem::mount(disk, FsConfig::new(64)).err();
    assert_eq!(err, Some(Error::TypeMismatch));
}
