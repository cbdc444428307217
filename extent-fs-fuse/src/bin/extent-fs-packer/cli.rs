use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Directory whose files are imported into the root directory
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output directory
    #[arg(long, short = 'O')]
    pub out_dir: PathBuf,

    /// Number of sectors in the image
    #[arg(long, default_value_t = 16 * 1024)]
    pub sectors: u32,

    /// Only import files ending with this suffix, e.g. `.coff`
    #[arg(long)]
    pub suffix: Option<String>,
}
