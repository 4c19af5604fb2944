use log::warn;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::record::{LanUserTable, Record, State, SystemInfo};
use crate::transport::Transport;
use crate::ConnectBox;

/// Upper bound for the logout that closes a poll cycle.
pub const LOGOUT_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of one poll cycle. Each record is fetched independently.
#[derive(Debug)]
pub struct Snapshot {
    pub state: Result<State, Error>,
    pub system_info: Result<SystemInfo, Error>,
    pub lan_users: Result<LanUserTable, Error>,
}

impl<T> ConnectBox<T>
where
    T: Transport,
{
    /// Logs in, fetches every known record and logs out again.
    ///
    /// Only a failed login aborts the cycle. Logout runs on its own context
    /// so that it still happens once `ctx` has been cancelled.
    pub async fn poll(&mut self, ctx: &CancellationToken) -> Result<Snapshot, Error> {
        self.login(ctx).await?;

        let state = self.fetch_logged::<State>(ctx, "state").await;
        let system_info = self.fetch_logged::<SystemInfo>(ctx, "system info").await;
        let lan_users = self.fetch_logged::<LanUserTable>(ctx, "LAN user table").await;

        self.release().await;

        Ok(Snapshot {
            state,
            system_info,
            lan_users,
        })
    }

    /// Logs out on a fresh context bounded by [`LOGOUT_TIMEOUT`]. Failures
    /// are only logged; the device drops stale sessions by itself.
    pub async fn release(&mut self) {
        let ctx = CancellationToken::new();

        match tokio::time::timeout(LOGOUT_TIMEOUT, self.logout(&ctx)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Failed to log out of {}: {}", self.address(), err),
            Err(_) => warn!("Timed out logging out of {}", self.address()),
        }
    }

    async fn fetch_logged<R: Record>(
        &mut self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<R, Error> {
        let result = self.fetch::<R>(ctx).await;
        if let Err(err) = &result {
            warn!("Failed to get {} from {}: {}", name, self.address(), err);
        }

        result
    }
}
