use spool_buffer::Item;
use spool_core::{FailurePolicy, ProducerId};

/// Per-message acknowledgment options.
///
/// Only the failure policy override is ever consulted at ack time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckOptions {
    pub on_failure: Option<FailurePolicy>,
}

impl AckOptions {
    pub fn on_failure(policy: FailurePolicy) -> Self {
        Self {
            on_failure: Some(policy),
        }
    }

    /// Returns `self` with every option set in `overrides` replacing ours.
    pub fn merge(self, overrides: AckOptions) -> AckOptions {
        AckOptions {
            on_failure: overrides.on_failure.or(self.on_failure),
        }
    }

    /// Effective policy for a failed message given the producer default.
    pub fn effective_policy(&self, default: FailurePolicy) -> FailurePolicy {
        self.on_failure.unwrap_or(default)
    }
}

/// Ack token carried by every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRef {
    pub producer: ProducerId,
    pub options: AckOptions,
}

/// A buffer item wrapped for delivery to the pipeline host.
///
/// Hosts must acknowledge each message exactly once; acking a message twice
/// is not detected and may requeue its payload twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    data: Item,
    acknowledger: AckRef,
}

impl Message {
    pub fn new(producer: ProducerId, data: Item) -> Self {
        Self {
            data,
            acknowledger: AckRef {
                producer,
                options: AckOptions::default(),
            },
        }
    }

    pub fn data(&self) -> &Item {
        &self.data
    }

    /// Unwraps the payload.
    pub fn into_data(self) -> Item {
        self.data
    }

    pub fn producer(&self) -> &ProducerId {
        &self.acknowledger.producer
    }

    pub fn acknowledger(&self) -> &AckRef {
        &self.acknowledger
    }

    pub fn ack_options(&self) -> AckOptions {
        self.acknowledger.options
    }

    /// Attaches per-message ack options, later values winning.
    pub fn configure_ack(&mut self, options: AckOptions) {
        self.acknowledger.options = crate::ack::configure(
            &self.acknowledger.producer,
            self.acknowledger.options,
            options,
        );
    }
}

#[cfg(test)]
mod tests {
    use spool_buffer::Item;
    use spool_core::{FailurePolicy, ProducerId};

    use super::{AckOptions, Message};

    #[test]
    fn merge_prefers_overrides_and_keeps_unset() {
        let base = AckOptions::on_failure(FailurePolicy::Discard);
        assert_eq!(
            base.merge(AckOptions::on_failure(FailurePolicy::Requeue)),
            AckOptions::on_failure(FailurePolicy::Requeue)
        );
        assert_eq!(base.merge(AckOptions::default()), base);
        assert_eq!(AckOptions::default().merge(base), base);
    }

    #[test]
    fn effective_policy_falls_back_to_default() {
        assert_eq!(
            AckOptions::default().effective_policy(FailurePolicy::Requeue),
            FailurePolicy::Requeue
        );
        assert_eq!(
            AckOptions::on_failure(FailurePolicy::Discard).effective_policy(FailurePolicy::Requeue),
            FailurePolicy::Discard
        );
    }

    #[test]
    fn wrapped_message_carries_producer_and_payload() {
        let producer = ProducerId::new("ingest").expect("valid id");
        let mut msg = Message::new(producer.clone(), Item::from_static(b"payload"));
        assert_eq!(msg.producer(), &producer);
        assert_eq!(msg.ack_options(), AckOptions::default());

        msg.configure_ack(AckOptions::on_failure(FailurePolicy::Requeue));
        assert_eq!(msg.acknowledger().options.on_failure, Some(FailurePolicy::Requeue));
        assert_eq!(msg.into_data(), Item::from_static(b"payload"));
    }
}
