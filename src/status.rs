use crossbeam_channel::Sender;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusState {
    Loading,
    Ready,
    Error,
}

impl StatusState {
    pub fn icon(&self) -> &'static str {
        match self {
            StatusState::Loading => "⟳",
            StatusState::Ready => "●",
            StatusState::Error => "✗",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: Option<StatusState>,
    pub message: String,
}

/// Handle used by background threads to report status. Reporting never fails:
/// with no attached badge, or once the UI is gone, updates are dropped.
#[derive(Clone, Debug, Default)]
pub struct StatusIndicator {
    target: Option<Sender<StatusUpdate>>,
}

impl StatusIndicator {
    pub fn new(target: Sender<StatusUpdate>) -> Self {
        Self {
            target: Some(target),
        }
    }

    pub fn detached() -> Self {
        Self::default()
    }

    pub fn set_status(&self, state: Option<StatusState>, message: &str) {
        let Some(target) = &self.target else {
            return;
        };
        let _ = target.send(StatusUpdate {
            state,
            message: message.to_string(),
        });
    }
}

/// The status element rendered above the video.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusBadge {
    pub state: Option<StatusState>,
    pub text: String,
}

impl StatusBadge {
    pub fn apply(&mut self, update: &StatusUpdate) {
        self.state = update.state;
        if !update.message.is_empty() {
            self.text = update.message.clone();
        }
    }
}

/// Append-only list of user-visible notices.
#[derive(Clone, Debug, Default)]
pub struct NoticeBoard {
    target: Option<Sender<String>>,
}

impl NoticeBoard {
    pub fn new(target: Sender<String>) -> Self {
        Self {
            target: Some(target),
        }
    }

    pub fn detached() -> Self {
        Self::default()
    }

    pub fn append(&self, notice: &str) {
        if let Some(target) = &self.target {
            let _ = target.send(notice.to_string());
        }
    }
}
