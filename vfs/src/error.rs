use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// 路径中的某一项不存在
    NotFound,
    /// 目标名称已被占用，不会覆盖
    AlreadyExists,
    /// 删除非空目录
    NotEmpty,
    /// 空闲扇区耗尽
    DiskFull,
    /// 期望文件/目录/符号链接，实际却是别的类型
    TypeMismatch,
    /// 对已回收的 inode 进行操作
    InvalidState,
    /// 名称为空、为`.`/`..`、含有`/`或NUL，或超出长度上限
    InvalidName,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::NotFound => "no such file or directory",
            Error::AlreadyExists => "file exists",
            Error::NotEmpty => "directory not empty",
            Error::DiskFull => "no space left on device",
            Error::TypeMismatch => "unexpected file type",
            Error::InvalidState => "inode has been reclaimed",
            Error::InvalidName => "invalid file name",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}
