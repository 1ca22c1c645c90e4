//! 協調的なシャットダウン

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// すべてのブロッキング呼び出しに渡されるシャットダウントークン
///
/// 各サスペンションポイントで確認されます。クローンは同じフラグを共有します。
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    /// 新しいトークンを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// シャットダウンを要求する
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// シャットダウンが要求されているか
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = ShutdownToken::new();
        let clone = token.clone();
        assert!(!clone.is_triggered());
        token.trigger();
        assert!(clone.is_triggered());
    }
}
