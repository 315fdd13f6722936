use std::{collections::HashMap, path::PathBuf, sync::Arc};

use chrono::{DateTime, Timelike, Utc};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::config::AppConfig;

/// One currency-filter wizard session.
///
/// The cache slot holds at most one speculatively regenerated image. The
/// prefetch handle covers both the pending delay and the in-flight request,
/// so aborting it is the timer clearance and the request abort in one. The
/// epoch fences the background task: every explicit user action bumps it,
/// and a completion carrying a stale epoch is discarded, which keeps stale
/// images out of the slot no matter how the abort races.
pub struct FilterSession {
    pub input_path: PathBuf,
    pub input_filename: String,
    pub input_content_type: String,
    pub selected_filter: Option<String>,
    pub run_id: Option<String>,
    pub result_url: Option<String>,
    pub banknote_used: Option<String>,
    cached_url: Option<String>,
    regenerating: bool,
    prefetch: Option<JoinHandle<()>>,
    epoch: u64,
    pub last_active: DateTime<Utc>,
}

impl FilterSession {
    pub fn new(input_path: PathBuf, input_filename: String, input_content_type: String) -> Self {
        Self {
            input_path,
            input_filename,
            input_content_type,
            selected_filter: None,
            run_id: None,
            result_url: None,
            banknote_used: None,
            cached_url: None,
            regenerating: false,
            prefetch: None,
            epoch: 0,
            last_active: Utc::now(),
        }
    }

    /// Every explicit user action goes through here first: cancels any
    /// outstanding background attempt and invalidates its epoch.
    pub fn begin_user_action(&mut self) -> u64 {
        self.epoch += 1;
        if let Some(handle) = self.prefetch.take() {
            handle.abort();
        }
        self.regenerating = false;
        self.last_active = Utc::now();
        self.epoch
    }

    pub fn current_epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_regenerating(&self) -> bool {
        self.regenerating
    }

    /// Attaches a freshly spawned prefetch chain. A handle spawned against a
    /// superseded epoch is aborted instead of stored.
    pub fn attach_prefetch(&mut self, epoch: u64, handle: JoinHandle<()>) {
        if epoch == self.epoch {
            self.regenerating = true;
            self.prefetch = Some(handle);
        } else {
            handle.abort();
        }
    }

    /// Background completion: fills the cache slot, never the displayed
    /// result. Returns false when the epoch is stale and the value was
    /// discarded.
    pub fn store_background(&mut self, epoch: u64, image_url: String) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.cached_url = Some(image_url);
        true
    }

    /// Marks the chain as finished (failure or window close). Stale epochs
    /// are ignored.
    pub fn background_done(&mut self, epoch: u64) {
        if epoch == self.epoch {
            self.regenerating = false;
            self.prefetch = None;
        }
    }

    pub fn take_cached(&mut self) -> Option<String> {
        self.cached_url.take()
    }

    pub fn store_result(&mut self, epoch: u64, run_id: String, url: String, banknote: Option<String>) -> bool {
        if epoch != self.epoch {
            return false;
        }
        self.run_id = Some(run_id);
        self.result_url = Some(url);
        self.banknote_used = banknote;
        true
    }

    /// "Back" from the result screen: keep the uploaded image, drop
    /// everything derived from it.
    pub fn reset_result(&mut self) {
        self.selected_filter = None;
        self.run_id = None;
        self.result_url = None;
        self.banknote_used = None;
        self.cached_url = None;
    }
}

impl Drop for FilterSession {
    fn drop(&mut self) {
        if let Some(handle) = self.prefetch.take() {
            handle.abort();
        }
    }
}

pub type SharedSession = Arc<Mutex<FilterSession>>;

/// In-process registry of wizard sessions, keyed by session id.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, SharedSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: Uuid, session: FilterSession) -> SharedSession {
        let shared = Arc::new(Mutex::new(session));
        self.inner.write().await.insert(id, shared.clone());
        shared
    }

    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> Option<SharedSession> {
        let removed = self.inner.write().await.remove(&id);
        if let Some(session) = &removed {
            session.lock().await.begin_user_action();
        }
        removed
    }

    /// Sessions idle since before `cutoff`, for the maintenance sweep.
    pub async fn idle_since(&self, cutoff: DateTime<Utc>) -> Vec<Uuid> {
        let map = self.inner.read().await;
        let mut expired = Vec::new();
        for (id, session) in map.iter() {
            let guard = session.lock().await;
            if guard.last_active < cutoff {
                expired.push(*id);
            }
        }
        expired
    }
}

/// The speculative prefetch only runs inside the configured business-hours
/// window, evaluated in the configured local offset. `open == close` means
/// the window is empty; `open > close` wraps past midnight.
pub fn within_business_hours(config: &AppConfig, now: DateTime<Utc>) -> bool {
    let hour = (i64::from(now.hour()) + i64::from(config.timezone_offset_hours)).rem_euclid(24) as u32;
    let (open, close) = (config.prefetch_open_hour, config.prefetch_close_hour);
    if open == close {
        false
    } else if open < close {
        hour >= open && hour < close
    } else {
        hour >= open || hour < close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_config(open: u32, close: u32, offset: i32) -> AppConfig {
        AppConfig {
            port: 5000,
            frontend_url: "http://localhost:3000".to_string(),
            database_url: String::new(),
            jwt_secret: "secret".to_string(),
            uploads_dir: "uploads".to_string(),
            generator_base_url: "http://localhost:5000".to_string(),
            prefetch_open_hour: open,
            prefetch_close_hour: close,
            timezone_offset_hours: offset,
        }
    }

    fn session() -> FilterSession {
        FilterSession::new(
            PathBuf::from("storage/filters/x/input.jpg"),
            "input.jpg".to_string(),
            "image/jpeg".to_string(),
        )
    }

    #[test]
    fn stale_background_result_is_discarded() {
        let mut s = session();
        let epoch = s.begin_user_action();
        // User acts again before the background attempt lands.
        s.begin_user_action();
        assert!(!s.store_background(epoch, "http://img/old.png".to_string()));
        assert!(s.take_cached().is_none());
    }

    #[test]
    fn cache_slot_is_single_occupancy_and_cleared_on_take() {
        let mut s = session();
        let epoch = s.begin_user_action();
        assert!(s.store_background(epoch, "http://img/a.png".to_string()));
        assert!(s.store_background(epoch, "http://img/b.png".to_string()));
        assert_eq!(s.take_cached().as_deref(), Some("http://img/b.png"));
        assert!(s.take_cached().is_none());
    }

    #[test]
    fn background_never_touches_foreground_result() {
        let mut s = session();
        let epoch = s.begin_user_action();
        assert!(s.store_result(
            epoch,
            "run-1".to_string(),
            "http://img/shown.png".to_string(),
            None,
        ));
        assert!(s.store_background(epoch, "http://img/spec.png".to_string()));
        assert_eq!(s.result_url.as_deref(), Some("http://img/shown.png"));
    }

    #[test]
    fn stale_foreground_result_is_discarded() {
        let mut s = session();
        let epoch = s.begin_user_action();
        s.begin_user_action();
        assert!(!s.store_result(epoch, "run-1".to_string(), "http://x".to_string(), None));
        assert!(s.result_url.is_none());
    }

    #[test]
    fn reset_result_keeps_input() {
        let mut s = session();
        let epoch = s.begin_user_action();
        s.selected_filter = Some("currency-500k.jpg".to_string());
        s.store_result(epoch, "run-1".to_string(), "http://x".to_string(), None);
        s.store_background(epoch, "http://y".to_string());
        s.reset_result();
        assert!(s.selected_filter.is_none());
        assert!(s.run_id.is_none());
        assert!(s.result_url.is_none());
        assert!(s.take_cached().is_none());
        assert_eq!(s.input_filename, "input.jpg");
    }

    #[tokio::test]
    async fn user_action_aborts_outstanding_prefetch() {
        let mut s = session();
        let epoch = s.begin_user_action();
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        s.attach_prefetch(epoch, handle);
        assert!(s.is_regenerating());
        s.begin_user_action();
        assert!(!s.is_regenerating());
    }

    #[tokio::test]
    async fn attach_with_stale_epoch_aborts_handle() {
        let mut s = session();
        let epoch = s.begin_user_action();
        s.begin_user_action();
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        });
        s.attach_prefetch(epoch, handle);
        assert!(!s.is_regenerating());
    }

    #[tokio::test]
    async fn store_lists_idle_sessions() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        store.insert(id, session()).await;
        let future_cutoff = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(store.idle_since(future_cutoff).await, vec![id]);
        let past_cutoff = Utc::now() - chrono::Duration::hours(1);
        assert!(store.idle_since(past_cutoff).await.is_empty());
        store.remove(id).await;
        assert!(store.get(id).await.is_none());
    }

    #[test]
    fn business_hours_normal_window() {
        let config = test_config(8, 22, 0);
        let inside = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2025, 6, 2, 7, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 6, 2, 22, 0, 0).unwrap();
        assert!(within_business_hours(&config, inside));
        assert!(!within_business_hours(&config, before));
        assert!(!within_business_hours(&config, after));
    }

    #[test]
    fn business_hours_respects_offset() {
        // 02:00 UTC is 09:00 at UTC+7.
        let config = test_config(8, 22, 7);
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 2, 0, 0).unwrap();
        assert!(within_business_hours(&config, now));
        // 16:00 UTC is 23:00 at UTC+7.
        let late = Utc.with_ymd_and_hms(2025, 6, 2, 16, 0, 0).unwrap();
        assert!(!within_business_hours(&config, late));
    }

    #[test]
    fn business_hours_wraps_past_midnight() {
        let config = test_config(20, 6, 0);
        let night = Utc.with_ymd_and_hms(2025, 6, 2, 23, 0, 0).unwrap();
        let morning = Utc.with_ymd_and_hms(2025, 6, 2, 5, 0, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        assert!(within_business_hours(&config, night));
        assert!(within_business_hours(&config, morning));
        assert!(!within_business_hours(&config, midday));
    }

    #[test]
    fn business_hours_empty_window() {
        let config = test_config(8, 8, 0);
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap();
        assert!(!within_business_hours(&config, now));
    }
}
