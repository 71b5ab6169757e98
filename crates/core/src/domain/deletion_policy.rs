// Deletion policy - decides whether a processed message is acknowledged

use serde::{Deserialize, Serialize};

/// Acknowledgment behaviour attached to a handler at registration time and
/// copied into every queue descriptor built from that handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Delete after the handler returns successfully; keep on failure so the
    /// queue redelivers it.
    OnSuccess,
    /// Delete regardless of the processing outcome.
    Always,
    /// Never delete here; the handler receives an `Acknowledgment` handle and
    /// owns deletion.
    Never,
    /// Delete unless a redrive/dead-letter policy can take the failure over.
    NoRedrive,
}

impl Default for DeletionPolicy {
    fn default() -> Self {
        DeletionPolicy::NoRedrive
    }
}

/// Outcome of the deletion decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge: delete the message from the queue.
    Delete,
    /// Leave the message to the queue's own redelivery/redrive machinery.
    Keep,
}

impl DeletionPolicy {
    /// Map (policy, processing outcome, redrive presence) to a disposition.
    ///
    /// `NoRedrive` deletes failed messages on queues without a redrive
    /// target: keeping them would cycle forever with nowhere to drain to.
    pub fn decide(self, succeeded: bool, has_redrive_policy: bool) -> Disposition {
        match self {
            DeletionPolicy::Always => Disposition::Delete,
            DeletionPolicy::Never => Disposition::Keep,
            DeletionPolicy::OnSuccess => {
                if succeeded {
                    Disposition::Delete
                } else {
                    Disposition::Keep
                }
            }
            DeletionPolicy::NoRedrive => {
                if succeeded || !has_redrive_policy {
                    Disposition::Delete
                } else {
                    Disposition::Keep
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeletionPolicy::*;
    use Disposition::*;

    #[test]
    fn test_decision_table() {
        // Full (policy, succeeded, has_redrive_policy) matrix.
        let table = [
            (OnSuccess, true, false, Delete),
            (OnSuccess, true, true, Delete),
            (OnSuccess, false, false, Keep),
            (OnSuccess, false, true, Keep),
            (Always, true, false, Delete),
            (Always, true, true, Delete),
            (Always, false, false, Delete),
            (Always, false, true, Delete),
            (NoRedrive, true, false, Delete),
            (NoRedrive, true, true, Delete),
            (NoRedrive, false, false, Delete),
            (NoRedrive, false, true, Keep),
            (Never, true, false, Keep),
            (Never, true, true, Keep),
            (Never, false, false, Keep),
            (Never, false, true, Keep),
        ];

        for (policy, succeeded, has_redrive, expected) in table {
            assert_eq!(
                policy.decide(succeeded, has_redrive),
                expected,
                "policy={policy:?} succeeded={succeeded} has_redrive={has_redrive}"
            );
        }
    }

    #[test]
    fn test_default_policy_is_no_redrive() {
        assert_eq!(DeletionPolicy::default(), NoRedrive);
    }
}
