//! 単一スロットのクラッシュコールバック
//!
//! 購読者は常に 1 つ。`set` で置き換え、`clear` で外す。
//! 複数の購読者が必要になったら、ハンドル付きのアリーナと明示的な
//! 解除 API に置き換えること。

use std::sync::{Arc, Mutex, PoisonError};

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct CrashSlot {
    slot: Arc<Mutex<Option<Callback>>>,
}

impl CrashSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    pub fn clear(&self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_set(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// 登録済みなら 1 回呼び出す。戻り値は呼び出したかどうか
    pub fn fire(&self) -> bool {
        // ロックを保持したままコールバックを呼ばない
        let callback = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for CrashSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashSlot")
            .field("set", &self.is_set())
            .finish()
    }
}
