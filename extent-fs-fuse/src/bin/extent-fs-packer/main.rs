mod cli;

use std::io;
use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use extent_fs::{FileSystem, FsConfig, Session};
use extent_fs_fuse::{BlockFile, HostDir};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    println!("source={:?}\nout_dir={:?}", cli.source, cli.out_dir);

    let seed = HostDir::scan(&cli.source, cli.suffix.as_deref())?;
    println!("{} files to import", seed.len());

    let block_file = Arc::new(BlockFile::create(
        &cli.out_dir.join("fs.img"),
        cli.sectors,
    )?);

    let fs = FileSystem::format(block_file, FsConfig::new(cli.sectors), &seed)
        .map_err(io::Error::other)?;

    for entry in fs.read_dir(&Session::new(), "/").map_err(io::Error::other)? {
        println!("program: {:?}", entry.name);
    }
    println!("{} sectors free", fs.free_sectors());

    fs.shutdown().map_err(io::Error::other)
}
