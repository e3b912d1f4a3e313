use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ItemId, TargetId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestItem {
    pub id: ItemId,
    pub url: String,
}

/// Outcome of one successful fetch. `item` is `None` when the profile has
/// no unpinned posts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub target_id: TargetId,
    pub item: Option<LatestItem>,
    pub fetched_at: DateTime<Utc>,
}

impl FetchResult {
    pub fn new(target_id: TargetId, item: Option<LatestItem>) -> Self {
        Self {
            target_id,
            item,
            fetched_at: Utc::now(),
        }
    }

    pub fn item_id(&self) -> Option<&ItemId> {
        self.item.as_ref().map(|i| &i.id)
    }
}
