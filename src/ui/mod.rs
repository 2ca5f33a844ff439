use std::{sync::Arc, thread};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use gpui::{
    AnyElement, App, AppContext, Context, IntoElement, ObjectFit, ParentElement, Render,
    RenderImage, SharedString, Styled, StyledImage, TitlebarOptions, Window, WindowOptions, div,
    img, px,
};
use gpui_component::{
    ActiveTheme, Root, StyledExt,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};
use image::{Frame as ImageFrame, ImageBuffer, Rgba};

use crate::{
    bootstrap::{AppBootstrap, Session},
    config::AppConfig,
    model_download::ModelFiles,
    pipeline::{NokhwaBackend, OrtHands, latest_value_channel},
    status::{NoticeBoard, StatusBadge, StatusIndicator, StatusUpdate},
    submission::{SubmissionClient, SubmissionReport},
    types::{AppState, DetectionUpdate, FrameSize},
};

mod main_view;
mod render_util;

const VIDEO_MAX_WIDTH: f32 = 720.0;
const DEFAULT_VIDEO_RATIO: f32 = 4.0 / 3.0;

pub fn launch_ui(app: &mut App, config: AppConfig, models: ModelFiles) -> gpui::Result<()> {
    let window_options = WindowOptions {
        titlebar: Some(TitlebarOptions {
            title: Some("Hand Sign Capture".into()),
            ..Default::default()
        }),
        ..Default::default()
    };

    app.open_window(window_options, move |window, app| {
        let view = app.new(|_| AppView::new(config, models));
        app.new(|cx| Root::new(view, window, cx))
    })?;

    Ok(())
}

/// Message shown in the dismissable banner after a send.
struct Alert {
    message: SharedString,
    success: bool,
}

struct AppView {
    status_rx: Receiver<StatusUpdate>,
    notice_rx: Receiver<String>,
    update_rx: Receiver<DetectionUpdate>,
    session_rx: Receiver<Session>,
    report_tx: Sender<SubmissionReport>,
    report_rx: Receiver<SubmissionReport>,
    client: SubmissionClient,
    session: Option<Session>,
    badge: StatusBadge,
    notices: Vec<String>,
    state: AppState,
    latest_size: Option<FrameSize>,
    latest_image: Option<Arc<RenderImage>>,
    alert: Option<Alert>,
    submitting: bool,
}

impl AppView {
    fn new(config: AppConfig, models: ModelFiles) -> Self {
        let (status_tx, status_rx) = unbounded();
        let (notice_tx, notice_rx) = unbounded();
        let (update_tx, update_rx) = latest_value_channel();
        let (session_tx, session_rx) = bounded(1);
        let (report_tx, report_rx) = unbounded();

        let client = SubmissionClient::new(&config.backend.origin);
        let bootstrap = AppBootstrap::new(
            &config,
            models.clone(),
            NokhwaBackend::new(config.camera.index),
            StatusIndicator::new(status_tx),
            NoticeBoard::new(notice_tx),
            update_tx,
        );
        thread::spawn(move || match bootstrap.run(|options| OrtHands::load(&models, options)) {
            Ok(session) => {
                let _ = session_tx.send(session);
            }
            Err(err) => log::error!("startup aborted: {err}"),
        });

        Self {
            status_rx,
            notice_rx,
            update_rx,
            session_rx,
            report_tx,
            report_rx,
            client,
            session: None,
            badge: StatusBadge::default(),
            notices: Vec::new(),
            state: AppState::default(),
            latest_size: None,
            latest_image: None,
            alert: None,
            submitting: false,
        }
    }

    /// Drains every background channel into view state.
    fn poll_channels(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) {
        while let Ok(update) = self.status_rx.try_recv() {
            self.badge.apply(&update);
        }
        self.notices.extend(self.notice_rx.try_iter());

        if let Ok(session) = self.session_rx.try_recv() {
            self.session = Some(session);
        }

        if let Ok(update) = self.update_rx.try_recv() {
            self.state.apply(&update);
            self.latest_size = update.frame.size();
            if let Some(image) = render_util::frame_to_image(&update) {
                self.replace_latest_image(image, window, cx);
            }
        }

        while let Ok(report) = self.report_rx.try_recv() {
            self.submitting = false;
            self.alert = Some(Alert {
                message: report.user_message().into(),
                success: report.is_success(),
            });
        }
    }

    fn send_landmarks(&mut self) {
        if self.submitting {
            return;
        }
        self.submitting = true;

        let client = self.client.clone();
        let landmarks = self.state.landmarks.clone();
        let anchors = self.state.pose_anchors;
        let report_tx = self.report_tx.clone();
        thread::spawn(move || {
            let _ = report_tx.send(client.submit(&landmarks, anchors));
        });
    }

    fn replace_latest_image(
        &mut self,
        new_image: Arc<RenderImage>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) {
        if let Some(old_image) = self.latest_image.replace(new_image) {
            // Release the previous texture, the sprite atlas would otherwise
            // keep every frame.
            cx.drop_image(old_image, Some(window));
        }
    }
}

impl Render for AppView {
    fn render(&mut self, window: &mut Window, cx: &mut Context<'_, Self>) -> impl IntoElement {
        cx.defer_in(window, |_, _, cx| {
            cx.notify();
        });

        self.poll_channels(window, cx);
        self.render_main(cx)
    }
}
