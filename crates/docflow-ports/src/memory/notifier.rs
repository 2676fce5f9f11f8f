use super::faults::FaultPlan;
use crate::error::PortResult;
use crate::notifier::{NotificationData, Notifier, TemplateKind};
use async_trait::async_trait;
use parking_lot::Mutex;

/// A notification accepted by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub template: TemplateKind,
    pub recipients: Vec<String>,
    pub data: NotificationData,
}

/// Notifier that records messages instead of sending them
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentNotification>>,
    faults: FaultPlan,
}

impl MemoryNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_faults(mut self, faults: FaultPlan) -> Self {
        self.faults = faults;
        self
    }

    #[inline]
    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    /// Messages of one template
    #[must_use]
    pub fn sent_with(&self, template: TemplateKind) -> Vec<SentNotification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.template == template)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(
        &self,
        template: TemplateKind,
        recipients: &[String],
        data: &NotificationData,
    ) -> PortResult<()> {
        self.faults.check("send")?;
        self.sent.lock().push(SentNotification {
            template,
            recipients: recipients.to_vec(),
            data: data.clone(),
        });
        Ok(())
    }
}
