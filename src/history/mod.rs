// 历史模块 - 基于快照的撤销/重做
//
// 单一线性时间线：快照按顺序存放，游标指向当前显示的快照

use std::collections::VecDeque;

use crate::canvas::Snapshot;

/// 撤销/重做历史
#[derive(Debug, Clone)]
pub struct HistoryManager<T = Snapshot> {
    entries: VecDeque<T>,
    /// None 表示历史为空（对应 -1）
    cursor: Option<usize>,
    /// 最大条数，0 表示不限制
    max_entries: usize,
}

impl<T: Clone> Default for HistoryManager<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T: Clone> HistoryManager<T> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            max_entries,
        }
    }

    /// 提交新快照，丢弃游标之后的重做分支
    pub fn commit(&mut self, snapshot: T) {
        let keep = self.cursor.map_or(0, |cursor| cursor + 1);
        self.entries.truncate(keep);
        self.entries.push_back(snapshot);

        if self.max_entries > 0 {
            while self.entries.len() > self.max_entries {
                self.entries.pop_front();
            }
        }

        self.cursor = Some(self.entries.len() - 1);
    }

    /// 撤销，没有更早的状态时返回 None
    pub fn undo(&mut self) -> Option<T> {
        let cursor = self.cursor.filter(|cursor| *cursor > 0)?;
        self.cursor = Some(cursor - 1);
        self.entries.get(cursor - 1).cloned()
    }

    /// 重做，已在最新状态时返回 None
    pub fn redo(&mut self) -> Option<T> {
        let cursor = self.cursor?;
        if cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor = Some(cursor + 1);
        self.entries.get(cursor + 1).cloned()
    }

    /// 清空历史
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor + 1 < self.entries.len())
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// 游标位置，空历史时为 -1
    pub fn position(&self) -> i64 {
        self.cursor.map_or(-1, |cursor| cursor as i64)
    }

    /// 当前显示的快照
    pub fn current(&self) -> Option<&T> {
        self.cursor.and_then(|cursor| self.entries.get(cursor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
