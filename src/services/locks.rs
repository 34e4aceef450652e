//! Области взаимоисключения по ключу (сеанс или зал).
//!
//! Одна запись в карте на ключ: запросы к одному сеансу выстраиваются в очередь,
//! запросы к разным сеансам друг друга не ждут. Карта под `std::sync::Mutex`
//! блокируется только на время поиска записи и никогда через `.await`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::BookingError;

pub struct ScopeLocks<K> {
    scopes: Mutex<HashMap<K, Weak<AsyncMutex<()>>>>,
    timeout: Duration,
}

/// Удерживаемая область. Освобождается при drop.
#[must_use = "the scope is released as soon as the guard is dropped"]
pub struct ScopeGuard<K> {
    pub key: K,
    _guard: OwnedMutexGuard<()>,
}

impl<K> ScopeLocks<K>
where
    K: Eq + Hash + Copy,
{
    pub fn new(timeout: Duration) -> Self {
        Self { scopes: Mutex::new(HashMap::new()), timeout }
    }

    /// Захватывает область `key`, ожидая не дольше настроенного таймаута.
    /// По таймауту - `Busy`; ожидавший запрос ничего не успел изменить.
    pub async fn acquire(&self, key: K) -> Result<ScopeGuard<K>, BookingError> {
        let scope = self.scope_for(key);
        match tokio::time::timeout(self.timeout, scope.lock_owned()).await {
            Ok(guard) => Ok(ScopeGuard { key, _guard: guard }),
            Err(_) => Err(BookingError::Busy),
        }
    }

    /// Количество живых областей (для тестов и метрик).
    pub fn active_scopes(&self) -> usize {
        let scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());
        scopes.values().filter(|w| w.strong_count() > 0).count()
    }

    fn scope_for(&self, key: K) -> Arc<AsyncMutex<()>> {
        let mut scopes = self.scopes.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = scopes.get(&key).and_then(Weak::upgrade) {
            return existing;
        }

        // записи без владельцев больше не нужны
        if scopes.len() >= 1024 {
            scopes.retain(|_, w| w.strong_count() > 0);
        }

        let scope = Arc::new(AsyncMutex::new(()));
        scopes.insert(key, Arc::downgrade(&scope));
        scope
    }
}
