use async_trait::async_trait;
use tracing::warn;

use crate::application::{AppResult, Notifier};
use crate::domain::{FetchResult, MonitoredTarget};

pub struct MultiNotifier {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait]
impl Notifier for MultiNotifier {
    async fn notify(&self, target: &MonitoredTarget, result: &FetchResult) -> AppResult<()> {
        // delivered once any channel accepts it
        let mut delivered = self.notifiers.is_empty();
        let mut last_err = None;

        for n in &self.notifiers {
            match n.notify(target, result).await {
                Ok(()) => delivered = true,
                Err(e) => {
                    warn!(target_id = %target.id, "notifier failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if !delivered => Err(e),
            _ => Ok(()),
        }
    }
}
