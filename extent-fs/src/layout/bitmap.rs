use alloc::vec;
use alloc::vec::Vec;

/// 位图的组，1 表示对应扇区空闲
type BitmapGroup = u64;
const GROUP_BITS: usize = BitmapGroup::BITS as usize;

/// 扇区占用位图，常驻内存；落盘时序列化为按字节排列的映像
#[derive(Debug, Clone)]
pub struct Bitmap {
    groups: Vec<BitmapGroup>,
    /// 位图所指示的扇区总数
    capacity: usize,
}

/// 位编号
struct BitPos(u32);

impl Bitmap {
    /// 全部扇区均被占用的位图
    pub fn new(capacity: usize) -> Self {
        Self {
            groups: vec![0; capacity.div_ceil(GROUP_BITS)],
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 映像的字节数
    #[inline]
    pub fn image_len(capacity: usize) -> usize {
        capacity.div_ceil(8)
    }

    /// 取出编号最小的空闲位并标记为占用。
    /// 若位图中已无空闲位，则返回空。
    pub fn alloc(&mut self) -> Option<u32> {
        let (group_index, ingroup_index) =
            self.groups
                .iter()
                .enumerate()
                .find_map(|(group_index, &bits)| {
                    (bits != 0).then_some((group_index, bits.trailing_zeros()))
                })?;

        self.groups[group_index] &= !(1 << ingroup_index);
        Some(BitPos::encode(group_index, ingroup_index as usize))
    }

    pub fn dealloc(&mut self, id: u32) {
        let (group_index, ingroup_index) = BitPos(id).decode();
        debug_assert!((id as usize) < self.capacity);
        // 编号不能处于空闲状态
        debug_assert_eq!(self.groups[group_index] & (1 << ingroup_index), 0);

        self.groups[group_index] |= 1 << ingroup_index;
    }

    #[inline]
    pub fn is_free(&self, id: u32) -> bool {
        let (group_index, ingroup_index) = BitPos(id).decode();
        self.groups
            .get(group_index)
            .is_some_and(|&bits| bits & (1 << ingroup_index) != 0)
    }

    #[inline]
    pub fn count_free(&self) -> usize {
        self.groups
            .iter()
            .map(|bits| bits.count_ones() as usize)
            .sum()
    }

    /// 第`i`字节的第`j`位（低位在前）对应`8i+j`号扇区
    pub fn to_image(&self) -> Vec<u8> {
        let mut image: Vec<u8> = self
            .groups
            .iter()
            .flat_map(|bits| bits.to_le_bytes())
            .collect();
        image.truncate(Self::image_len(self.capacity));
        image
    }

    /// 映像不足的部分视为占用，超出容量的位被忽略
    pub fn from_image(image: &[u8], capacity: usize) -> Self {
        let mut bitmap = Self::new(capacity);
        let image = &image[..image.len().min(Self::image_len(capacity))];

        for (group, chunk) in bitmap.groups.iter_mut().zip(image.chunks(8)) {
            let mut bytes = [0; 8];
            bytes[..chunk.len()].copy_from_slice(chunk);
            *group = BitmapGroup::from_le_bytes(bytes);
        }

        // 抹去最后一组里超出容量的位
        let tail = capacity % GROUP_BITS;
        if tail != 0 {
            if let Some(last) = bitmap.groups.last_mut() {
                *last &= (1 << tail) - 1;
            }
        }

        bitmap
    }
}

impl BitPos {
    #[inline]
    fn encode(group_index: usize, ingroup_index: usize) -> u32 {
        (group_index * GROUP_BITS + ingroup_index) as u32
    }

    #[inline]
    fn decode(self) -> (usize, usize) {
        let id = self.0 as usize;
        (id / GROUP_BITS, id % GROUP_BITS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_lowest_first() {
        let mut bitmap = Bitmap::new(130);
        for id in [5, 64, 129] {
            bitmap.dealloc(id);
        }

        assert_eq!(bitmap.count_free(), 3);
        assert_eq!(bitmap.alloc(), Some(5));
        assert_eq!(bitmap.alloc(), Some(64));
        assert_eq!(bitmap.alloc(), Some(129));
        assert_eq!(bitmap.alloc(), None);
    }

    #[test]
    fn image_layout() {
        let mut bitmap = Bitmap::new(20);
        bitmap.dealloc(0);
        bitmap.dealloc(9);
        bitmap.dealloc(19);

        let image = bitmap.to_image();
        assert_eq!(image, [0b0000_0001, 0b0000_0010, 0b0000_1000]);

        let restored = Bitmap::from_image(&image, 20);
        assert!(restored.is_free(0) && restored.is_free(9) && restored.is_free(19));
        assert_eq!(restored.count_free(), 3);
    }

    #[test]
    fn image_bits_beyond_capacity_are_ignored() {
        let restored = Bitmap::from_image(&[0xff, 0xff], 12);
        assert_eq!(restored.count_free(), 12);
        assert!(!restored.is_free(12));
    }
}
