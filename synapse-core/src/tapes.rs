//! テープカタログ
//!
//! 取り外し可能なストレージ（テープ）の一覧と、挿入中のテープを管理します。
//! テープの中身やファイル形式は扱いません。

use crate::errors::DebugError;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// テープカタログ
#[derive(Debug, Default, Clone)]
pub struct TapeCatalog {
    names: Vec<String>,
    loaded: Option<usize>,
}

impl TapeCatalog {
    pub fn new(names: Vec<String>) -> Self {
        Self { names, loaded: None }
    }

    /// テープを挿入する
    ///
    /// 別のテープが挿入されていれば置き換えます。
    pub fn load(&mut self, index: u32) -> Result<&str> {
        let idx = index as usize;
        let name = self.names.get(idx).ok_or(DebugError::TapeOutOfRange {
            index,
            len: self.names.len(),
        })?;
        self.loaded = Some(idx);
        Ok(name)
    }

    /// テープを取り出す
    pub fn unload(&mut self) -> Option<usize> {
        self.loaded.take()
    }

    /// 挿入中のテープの番号
    pub fn loaded(&self) -> Option<usize> {
        self.loaded
    }

    /// `start` から最大 `size` 件の名前
    pub fn window(&self, start: u32, size: u32) -> &[String] {
        let start = (start as usize).min(self.names.len());
        let end = start.saturating_add(size as usize).min(self.names.len());
        &self.names[start..end]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// シンボルテーブルが無効になった可能性の通知
///
/// デバイス側（テープの電源断など）が複製して保持し、`raise` で知らせます。
/// デバッガは次に停止したときにシンボルを読み直します。
#[derive(Debug, Clone, Default)]
pub struct InvalidationSignal {
    flag: Arc<AtomicBool>,
}

impl InvalidationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// 通知があれば取り出してフラグを下ろす
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TapeCatalog {
        TapeCatalog::new(vec!["boot".into(), "game".into(), "data".into()])
    }

    #[test]
    fn test_load_bounds() {
        let mut c = catalog();
        assert_eq!(c.load(1).unwrap(), "game");
        assert_eq!(c.loaded(), Some(1));

        let err = c.load(3).unwrap_err();
        assert_eq!(
            err.downcast_ref::<DebugError>(),
            Some(&DebugError::TapeOutOfRange { index: 3, len: 3 })
        );
        // 失敗しても挿入中のテープは変わらない
        assert_eq!(c.loaded(), Some(1));
        assert_eq!(c.unload(), Some(1));
        assert_eq!(c.unload(), None);
    }

    #[test]
    fn test_window() {
        let c = catalog();
        assert_eq!(c.window(1, 5), &["game".to_string(), "data".to_string()]);
        assert!(c.window(7, 2).is_empty());
        assert_eq!(c.window(0, u32::MAX).len(), 3);
    }

    #[test]
    fn test_invalidation_signal() {
        let signal = InvalidationSignal::new();
        let device = signal.clone();
        assert!(!signal.take());
        device.raise();
        assert!(signal.take());
        assert!(!signal.take());
    }
}
