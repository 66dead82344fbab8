// src/services/profile_service.rs
//
// Driver identity, online status, stats, and ride history. Fetches go to
// the API first; the session store keeps a read-through cache so a cold
// start without connectivity still shows the last known profile.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::errors::{SwiftaidError, SwiftaidResult};
use crate::models::driver::{DriverProfile, DriverStats, RideHistoryPage};
use crate::services::api::DriverApi;
use crate::services::session_store::{self, SessionStore, StoreKeys};

pub struct DriverProfileStore {
    api: Arc<dyn DriverApi>,
    store: Arc<dyn SessionStore>,
    profile: RwLock<Option<DriverProfile>>,
    stats: RwLock<Option<DriverStats>>,
    /// Tracked separately from the cached profile so the flag is valid
    /// even when `set_online` succeeds before any profile fetch.
    online: AtomicBool,
}

impl DriverProfileStore {
    pub fn new(api: Arc<dyn DriverApi>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            api,
            store,
            profile: RwLock::new(None),
            stats: RwLock::new(None),
            online: AtomicBool::new(false),
        }
    }

    /// Fetch the profile, falling back to the cached copy when the fetch
    /// fails. Auth failures are never masked by the cache.
    pub async fn load_profile(&self) -> SwiftaidResult<DriverProfile> {
        match self.api.get_profile().await {
            Ok(profile) => {
                self.online.store(profile.is_online, Ordering::SeqCst);
                *self.profile.write().await = Some(profile.clone());
                session_store::write_json(&*self.store, StoreKeys::DRIVER_PROFILE, &profile).await;
                Ok(profile)
            }
            Err(err @ SwiftaidError::AuthExpired) => Err(err),
            Err(err) => {
                tracing::warn!("Profile fetch failed, trying cache: {}", err);
                match session_store::read_json::<DriverProfile>(
                    &*self.store,
                    StoreKeys::DRIVER_PROFILE,
                )
                .await
                {
                    Some(cached) => {
                        self.online.store(cached.is_online, Ordering::SeqCst);
                        *self.profile.write().await = Some(cached.clone());
                        Ok(cached)
                    }
                    None => Err(err),
                }
            }
        }
    }

    pub async fn load_stats(&self) -> SwiftaidResult<DriverStats> {
        match self.api.get_stats().await {
            Ok(stats) => {
                *self.stats.write().await = Some(stats.clone());
                session_store::write_json(&*self.store, StoreKeys::DRIVER_STATS, &stats).await;
                Ok(stats)
            }
            Err(err @ SwiftaidError::AuthExpired) => Err(err),
            Err(err) => {
                tracing::warn!("Stats fetch failed, trying cache: {}", err);
                match session_store::read_json::<DriverStats>(&*self.store, StoreKeys::DRIVER_STATS)
                    .await
                {
                    Some(cached) => {
                        *self.stats.write().await = Some(cached.clone());
                        Ok(cached)
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Flip the driver's availability on the server, then mirror it
    /// locally. A failed call leaves local state untouched.
    pub async fn set_online(&self, is_online: bool) -> SwiftaidResult<()> {
        self.api.set_online_status(is_online).await?;
        tracing::info!("Driver is now {}", if is_online { "online" } else { "offline" });

        self.online.store(is_online, Ordering::SeqCst);
        if let Some(profile) = self.profile.write().await.as_mut() {
            profile.is_online = is_online;
        }
        session_store::write_json(&*self.store, StoreKeys::ONLINE_STATUS, &is_online).await;
        Ok(())
    }

    pub async fn update_profile(&self, profile: &DriverProfile) -> SwiftaidResult<DriverProfile> {
        let updated = self.api.update_profile(profile).await?;
        *self.profile.write().await = Some(updated.clone());
        session_store::write_json(&*self.store, StoreKeys::DRIVER_PROFILE, &updated).await;
        Ok(updated)
    }

    pub async fn ride_history(&self, page: u32, limit: u32) -> SwiftaidResult<RideHistoryPage> {
        self.api.get_ride_history(page, limit).await
    }

    pub async fn current_profile(&self) -> Option<DriverProfile> {
        self.profile.read().await.clone()
    }

    pub async fn current_stats(&self) -> Option<DriverStats> {
        self.stats.read().await.clone()
    }

    pub async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}
