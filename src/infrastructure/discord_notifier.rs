use async_trait::async_trait;
use serde::Serialize;

use crate::application::{AppError, AppResult, Notifier};
use crate::domain::{FetchResult, MonitoredTarget};

/// Posts to a Discord channel webhook, mentioning the target's role.
pub struct DiscordWebhookNotifier {
    client: reqwest::Client,
    webhook: String,
}

impl DiscordWebhookNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook,
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
    allowed_mentions: AllowedMentions,
}

#[derive(Debug, Serialize)]
struct AllowedMentions {
    parse: Vec<String>,
    roles: Vec<String>,
}

#[async_trait]
impl Notifier for DiscordWebhookNotifier {
    async fn notify(&self, target: &MonitoredTarget, result: &FetchResult) -> AppResult<()> {
        let text = format_message(target, result);

        let payload = WebhookMessage {
            content: &text,
            allowed_mentions: AllowedMentions {
                parse: vec![],
                roles: vec![target.notify_role_id.to_string()],
            },
        };

        self.client
            .post(&self.webhook)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AppError::Notifier(e.to_string()))?
            .error_for_status()
            .map_err(|e| AppError::Notifier(e.to_string()))?;

        Ok(())
    }
}

fn format_message(target: &MonitoredTarget, result: &FetchResult) -> String {
    let url = result
        .item
        .as_ref()
        .map(|i| i.url.as_str())
        .unwrap_or_default();
    format!(
        "<@&{}> New post from `{}`: {}",
        target.notify_role_id, target.external_handle, url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExternalHandle, ItemId, LatestItem, RoleId, TargetId, UserId};

    #[test]
    fn message_mentions_role_and_links_item() {
        let target = MonitoredTarget {
            id: TargetId(1),
            external_handle: ExternalHandle::parse("creator").unwrap(),
            owner_id: UserId(5),
            notify_role_id: RoleId(77),
        };
        let result = FetchResult::new(
            TargetId(1),
            Some(LatestItem {
                id: ItemId::new("123"),
                url: "https://www.tiktok.com/@creator/video/123".into(),
            }),
        );
        assert_eq!(
            format_message(&target, &result),
            "<@&77> New post from `@creator`: https://www.tiktok.com/@creator/video/123"
        );
    }
}
