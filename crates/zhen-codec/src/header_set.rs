//! 按 ID 索引的参数集表.
//!
//! 每个 ID 只保留最近一次插入的记录, 重复插入原地替换.
//! 除 [`HeaderSet::reset`] 外没有任何淘汰.

use zhen_core::{ZhenError, ZhenResult};

/// 参数集表
#[derive(Debug, Clone)]
pub struct HeaderSet<T> {
    slots: Vec<Option<T>>,
    current: Option<usize>,
}

impl<T> HeaderSet<T> {
    /// 创建容量为 `capacity` 的表, 合法 ID 为 `0..capacity`
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            current: None,
        }
    }

    /// 最大可容纳的 ID 数
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 插入记录, 返回被替换的旧记录
    pub fn insert(&mut self, id: usize, item: T) -> ZhenResult<Option<T>> {
        let capacity = self.slots.len();
        let slot = self.slots.get_mut(id).ok_or_else(|| {
            ZhenError::InvalidArgument(format!(
                "参数集 ID 超出范围, id={}, capacity={}",
                id, capacity
            ))
        })?;
        Ok(slot.replace(item))
    }

    /// 按 ID 查询
    pub fn get(&self, id: usize) -> Option<&T> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    /// 按 ID 查询 (可变)
    pub fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    /// 删除记录
    pub fn remove(&mut self, id: usize) -> Option<T> {
        if self.current == Some(id) {
            self.current = None;
        }
        self.slots.get_mut(id).and_then(Option::take)
    }

    /// 当前选中的 ID
    pub fn current_id(&self) -> Option<usize> {
        self.current
    }

    /// 选中某个 ID, 该 ID 必须已有记录
    pub fn set_current(&mut self, id: usize) -> ZhenResult<()> {
        if self.get(id).is_none() {
            return Err(ZhenError::InvalidArgument(format!(
                "参数集不存在, id={}",
                id
            )));
        }
        self.current = Some(id);
        Ok(())
    }

    /// 当前选中的记录
    pub fn current(&self) -> Option<&T> {
        self.current.and_then(|id| self.get(id))
    }

    /// 清空全部记录
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.current = None;
    }

    /// 已有记录数
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// 按 ID 顺序遍历已有记录
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|item| (id, item)))
    }
}
