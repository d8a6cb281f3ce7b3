use serde::Serialize;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
pub const ERROR_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

/// Transient user-facing message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub id: Uuid,
    pub level: NoticeLevel,
    pub message: String,
    pub timeout_ms: u64,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            id: Uuid::now_v7(),
            level,
            message: message.into(),
            timeout_ms,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message, DEFAULT_TIMEOUT_MS)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message, ERROR_TIMEOUT_MS)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message, DEFAULT_TIMEOUT_MS)
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

pub trait Notifier {
    fn notify(&mut self, notice: Notice);
}

/// Collects notices until the caller drains or dismisses them.
#[derive(Debug, Clone, Default)]
pub struct NoticeQueue {
    notices: Vec<Notice>,
}

impl NoticeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn dismiss(&mut self, id: Uuid) -> bool {
        let before = self.notices.len();
        self.notices.retain(|n| n.id != id);
        self.notices.len() != before
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}

impl Notifier for NoticeQueue {
    fn notify(&mut self, notice: Notice) {
        tracing::debug!(level = ?notice.level, message = %notice.message, "notice");
        self.notices.push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_carry_default_timeouts() {
        assert_eq!(Notice::success("ok").timeout_ms, 3000);
        assert_eq!(Notice::info("fyi").timeout_ms, 3000);
        assert_eq!(Notice::error("no").timeout_ms, 5000);
        assert_eq!(Notice::info("moved").with_timeout(2000).timeout_ms, 2000);
    }

    #[test]
    fn queue_dismisses_by_id() {
        let mut queue = NoticeQueue::new();
        let first = Notice::success("one");
        let first_id = first.id;
        queue.notify(first);
        queue.notify(Notice::error("two"));

        assert!(queue.dismiss(first_id));
        assert!(!queue.dismiss(first_id));
        let rest = queue.drain();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].level, NoticeLevel::Error);
        assert!(queue.notices().is_empty());
    }
}
