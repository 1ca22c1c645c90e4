//! メモリウォッチ
//!
//! クライアントが登録したメモリ領域を保持します。登録された領域の内容は
//! ステップや継続実行で停止するたびにクライアントへ送られます。

use crate::errors::DebugError;
use crate::Result;
use std::collections::BTreeMap;
use synapse_proto::MemView;

/// メモリウォッチの登録簿
#[derive(Debug, Default, Clone)]
pub struct WatchRegistry {
    watches: BTreeMap<u32, MemView>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ウォッチを登録する
    ///
    /// 同じIDが既にあれば置き換えます。
    pub fn insert(&mut self, view: MemView) {
        self.watches.insert(view.id, view);
    }

    /// ウォッチを解除する
    pub fn remove(&mut self, id: u32) -> Result<MemView> {
        self.watches
            .remove(&id)
            .ok_or_else(|| DebugError::WatchNotFound(id).into())
    }

    pub fn get(&self, id: u32) -> Option<&MemView> {
        self.watches.get(&id)
    }

    /// ID順にすべてのウォッチを返す
    pub fn iter(&self) -> impl Iterator<Item = &MemView> {
        self.watches.values()
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: u32) -> MemView {
        MemView {
            id,
            start: 0x100,
            size: 0x40,
            watch_start: 0x110,
            watch_size: 0x10,
        }
    }

    #[test]
    fn test_insert_replace_remove() {
        let mut reg = WatchRegistry::new();
        reg.insert(view(2));
        reg.insert(view(1));
        reg.insert(MemView { size: 8, ..view(2) });

        let ids: Vec<u32> = reg.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(reg.get(2).map(|v| v.size), Some(8));

        assert_eq!(reg.remove(1).unwrap().id, 1);
        let err = reg.remove(1).unwrap_err();
        assert_eq!(err.downcast_ref::<DebugError>(), Some(&DebugError::WatchNotFound(1)));
        assert_eq!(reg.len(), 1);
    }
}
