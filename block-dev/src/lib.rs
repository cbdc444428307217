//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备；[`BlockDevice`] 是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 文件系统只把设备看作定长扇区的数组：读写同步完成，且总是成功。

#![no_std]

use core::any::Any;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 把编号为`block_id`的块读入`buf`，`buf`恰为一个块长
    fn read_block(&self, block_id: usize, buf: &mut [u8]);

    /// 把`buf`写入编号为`block_id`的块，`buf`恰为一个块长
    fn write_block(&self, block_id: usize, buf: &[u8]);
}
