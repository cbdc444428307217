use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;

use crate::{Error, NAME_MAX, Result};

pub trait Path: ToOwned {
    fn is_absolute(&self) -> bool;

    /// 返回不以`/`结束、不包含`.`与`..`的绝对路径。
    ///
    /// 空的路径段被跳过；根目录的`..`仍是根目录。
    ///
    /// # 参数
    ///
    /// `cwd`: 会话的工作目录，为绝对路径，且非根时不以`/`结束。
    fn canonicalize(&self, cwd: &Self) -> Self::Owned;

    /// 返回根目录下的路径，若为根目录则返回`None`。
    fn root_relative(&self) -> Option<&Self>;

    /// 返回规范路径的`(父目录, 文件名)`，根目录返回`None`
    fn parent_file(&self) -> Option<(&Self, &Self)>;

    fn is_relative(&self) -> bool {
        !self.is_absolute()
    }
}

impl Path for str {
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn canonicalize(&self, cwd: &Self) -> Self::Owned {
        let mut cmps = Vec::new();
        if self.is_relative() {
            // 防止第一个`/`带来的空字符串的影响，
            // 尤其是只有`cwd == /`时。
            cmps.extend(cwd.split('/').filter(|s| !s.is_empty()));
        }

        for cmp in self.split('/') {
            match cmp {
                ".." => {
                    cmps.pop();
                }
                "." | "" => (),
                s => cmps.push(s),
            }
        }

        if cmps.is_empty() {
            return String::from("/");
        }
        cmps.insert(0, ""); // 在接下来的拼接中代表根目录

        cmps.join("/")
    }

    fn root_relative(&self) -> Option<&Self> {
        debug_assert!(self.is_absolute());

        (self != "/").then_some(self.trim_start_matches('/'))
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        if self == "/" {
            return None;
        }

        self.rsplit_once('/')
            .map(|(p, f)| if p.is_empty() { ("/", f) } else { (p, f) })
    }
}

/// 相对路径基于`cwd`展开为规范的绝对路径
pub fn canonicalize(path: &str, cwd: &str) -> String {
    path.canonicalize(cwd)
}

/// 拼接父目录的规范路径与一个名称
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        ["/", name].concat()
    } else {
        [parent, "/", name].concat()
    }
}

/// 目录项名称：非空、不含`/`与`\0`、不是`.`或`..`，且不超过定长
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= NAME_MAX
        && name != "."
        && name != ".."
        && !name.contains(['/', '\0']);

    if valid {
        Ok(())
    } else {
        log::debug!("invalid entry name {name:?}");
        Err(Error::InvalidName)
    }
}
