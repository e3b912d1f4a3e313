use serde::{Deserialize, Serialize};

use super::{ExternalHandle, RoleId, TargetId, UserId};

/// An external profile watched for new posts. Immutable once registered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub id: TargetId,
    pub external_handle: ExternalHandle,
    pub owner_id: UserId,
    pub notify_role_id: RoleId,
}

/// Registration request; the registry assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTarget {
    pub external_handle: ExternalHandle,
    pub owner_id: UserId,
    pub notify_role_id: RoleId,
}

impl NewTarget {
    pub fn into_target(self, id: TargetId) -> MonitoredTarget {
        MonitoredTarget {
            id,
            external_handle: self.external_handle,
            owner_id: self.owner_id,
            notify_role_id: self.notify_role_id,
        }
    }
}
