use async_trait::async_trait;

use crate::application::{AppResult, Notifier};
use crate::domain::{FetchResult, MonitoredTarget};

pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, target: &MonitoredTarget, result: &FetchResult) -> AppResult<()> {
        println!(
            "NOTIFY: target={} handle={} role={} item={} url={} fetched_at={}",
            target.id,
            target.external_handle,
            target.notify_role_id,
            result
                .item
                .as_ref()
                .map(|i| i.id.as_str())
                .unwrap_or("(none)"),
            result
                .item
                .as_ref()
                .map(|i| i.url.as_str())
                .unwrap_or("(none)"),
            result.fetched_at.to_rfc3339(),
        );
        Ok(())
    }
}
