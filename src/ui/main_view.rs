use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, Context, DEFAULT_VIDEO_RATIO,
    IntoElement, ObjectFit, ParentElement, SharedString, Styled, StyledExt, StyledImage,
    VIDEO_MAX_WIDTH, div, h_flex, img, px, v_flex,
};
use crate::status::StatusState;

impl AppView {
    pub(super) fn render_main(&mut self, cx: &mut Context<'_, Self>) -> AnyElement {
        let video_height = VIDEO_MAX_WIDTH / self.video_aspect_ratio();

        let video: AnyElement = match &self.latest_image {
            Some(image) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element(),
            None => div()
                .size_full()
                .flex()
                .items_center()
                .justify_center()
                .text_sm()
                .text_color(gpui::rgb(0x8b95a5))
                .child("Waiting for camera...")
                .into_any_element(),
        };

        let send_label = if self.submitting {
            "Sending..."
        } else {
            "Send landmarks"
        };
        let controls = h_flex()
            .w(px(VIDEO_MAX_WIDTH))
            .justify_between()
            .items_center()
            .child(
                div()
                    .text_sm()
                    .text_color(gpui::rgb(0xa0aab8))
                    .child(format!("Landmarks: {}", self.state.landmarks.len())),
            )
            .child(
                Button::new(SharedString::from("send-landmarks"))
                    .primary()
                    .label(send_label)
                    .on_click(cx.listener(|this, _, _, cx| {
                        this.send_landmarks();
                        cx.notify();
                    })),
            );

        let mut body = v_flex()
            .gap_3()
            .p_4()
            .items_center()
            .child(self.render_status_badge(cx))
            .child(
                div()
                    .w(px(VIDEO_MAX_WIDTH))
                    .h(px(video_height))
                    .overflow_hidden()
                    .rounded_lg()
                    .bg(gpui::rgb(0x000000))
                    .child(video),
            )
            .child(controls);

        if let Some(alert) = self.render_alert(cx) {
            body = body.child(alert);
        }
        for notice in &self.notices {
            body = body.child(
                div()
                    .w(px(VIDEO_MAX_WIDTH))
                    .p_3()
                    .rounded_lg()
                    .bg(gpui::rgba(0x7f1d1d33))
                    .border_1()
                    .border_color(gpui::rgba(0xef4444aa))
                    .text_xs()
                    .text_color(gpui::rgb(0xfca5a5))
                    .child(notice.clone()),
            );
        }

        v_flex()
            .size_full()
            .bg(gpui::rgb(0x1a2332))
            .child(body)
            .into_any_element()
    }

    fn render_status_badge(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let theme = cx.theme();
        let (icon, color) = match self.badge.state {
            Some(state @ StatusState::Ready) => (state.icon(), theme.success),
            Some(state @ StatusState::Error) => (state.icon(), gpui::rgb(0xef4444).into()),
            Some(state @ StatusState::Loading) => (state.icon(), theme.foreground),
            None => ("○", theme.muted_foreground),
        };

        div()
            .px_2()
            .py_0p5()
            .rounded_md()
            .bg(gpui::rgba(0x00000033))
            .text_xs()
            .text_color(color)
            .child(format!("{icon} {}", self.badge.text))
            .into_any_element()
    }

    fn render_alert(&self, cx: &mut Context<'_, Self>) -> Option<AnyElement> {
        let alert = self.alert.as_ref()?;
        let (bg, border) = if alert.success {
            (gpui::rgba(0x14532d33), gpui::rgba(0x22c55eaa))
        } else {
            (gpui::rgba(0x7f1d1d33), gpui::rgba(0xef4444aa))
        };

        Some(
            h_flex()
                .w(px(VIDEO_MAX_WIDTH))
                .gap_2()
                .p_3()
                .items_center()
                .justify_between()
                .rounded_lg()
                .bg(bg)
                .border_1()
                .border_color(border)
                .child(
                    div()
                        .text_sm()
                        .font_semibold()
                        .text_color(gpui::rgb(0xe2e8f0))
                        .child(alert.message.clone()),
                )
                .child(
                    Button::new(SharedString::from("dismiss-alert"))
                        .ghost()
                        .label("×")
                        .on_click(cx.listener(|this, _, _, cx| {
                            this.alert = None;
                            cx.notify();
                        })),
                )
                .into_any_element(),
        )
    }

    fn video_aspect_ratio(&self) -> f32 {
        match self.latest_size {
            Some(size) => size.width as f32 / size.height as f32,
            None => DEFAULT_VIDEO_RATIO,
        }
    }
}
