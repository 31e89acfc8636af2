//! Markdown rendering of a single message.
//!
//! Rendering is pure: everything that affects the output (locale, media link
//! prefix, time zone of the header) is carried by [`FormatConfig`].

use anyhow::Result;
use chrono::{DateTime, Datelike, FixedOffset, Local, Utc, Weekday};
use serde::Deserialize;

use crate::domain::{Message, MessageContent};

/// Horizontal rule that separates archived blocks
pub const BLOCK_SEPARATOR: &str = "---";

/// Language of weekday names and kind labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ru,
}

/// Fixed strings used by the renderer for one locale
#[derive(Debug)]
pub struct Labels {
    pub sticker: &'static str,
    pub emoji: &'static str,
    pub animation: &'static str,
    pub location: &'static str,
    pub latitude: &'static str,
    pub longitude: &'static str,
    pub poll: &'static str,
    pub question: &'static str,
    pub contact: &'static str,
    pub name: &'static str,
    pub phone: &'static str,
    pub unsupported: &'static str,
    pub photo: &'static str,
    pub video: &'static str,
    pub document: &'static str,
    pub audio: &'static str,
    pub voice: &'static str,
    pub gif: &'static str,
}

const EN_LABELS: Labels = Labels {
    sticker: "Sticker",
    emoji: "Emoji",
    animation: "GIF animation",
    location: "Location",
    latitude: "Latitude",
    longitude: "Longitude",
    poll: "Poll",
    question: "Question",
    contact: "Contact",
    name: "Name",
    phone: "Phone",
    unsupported: "Unsupported message type",
    photo: "Photo",
    video: "Video",
    document: "Document",
    audio: "Audio",
    voice: "Voice message",
    gif: "GIF",
};

const RU_LABELS: Labels = Labels {
    sticker: "Стикер",
    emoji: "Эмодзи",
    animation: "GIF-анимация",
    location: "Геолокация",
    latitude: "Широта",
    longitude: "Долгота",
    poll: "Опрос",
    question: "Вопрос",
    contact: "Контакт",
    name: "Имя",
    phone: "Телефон",
    unsupported: "Неподдерживаемый тип сообщения",
    photo: "Фото",
    video: "Видео",
    document: "Документ",
    audio: "Аудио",
    voice: "Голосовое сообщение",
    gif: "GIF",
};

impl Locale {
    pub fn labels(&self) -> &'static Labels {
        match self {
            Self::En => &EN_LABELS,
            Self::Ru => &RU_LABELS,
        }
    }

    pub fn weekday_abbrev(&self, day: Weekday) -> &'static str {
        let index = day.num_days_from_monday() as usize;
        match self {
            Self::En => ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"][index],
            Self::Ru => ["Пн", "Вт", "Ср", "Чт", "Пт", "Сб", "Вс"][index],
        }
    }
}

/// Explicit formatting configuration handed to the renderer
#[derive(Debug, Clone)]
pub struct FormatConfig {
    pub locale: Locale,

    /// Media subdirectory used in relative links
    pub media_dir_name: String,

    /// Offset for header timestamps; `None` uses the machine's local zone
    pub utc_offset: Option<FixedOffset>,
}

impl FormatConfig {
    pub fn new(locale: Locale, media_dir_name: impl Into<String>) -> Self {
        Self {
            locale,
            media_dir_name: media_dir_name.into(),
            utc_offset: None,
        }
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = Some(offset);
        self
    }

    /// Convert a message timestamp into the zone used for display
    pub fn local_time(&self, timestamp: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self.utc_offset {
            Some(offset) => timestamp.with_timezone(&offset),
            None => timestamp.with_timezone(&Local).fixed_offset(),
        }
    }
}

/// Turns a message into the text block appended to its day-file
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        message: &Message,
        media_file: Option<&str>,
        transcript: Option<&str>,
        reply_to: Option<&Message>,
    ) -> Result<String>;
}

/// Markdown renderer producing Obsidian-style blocks
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    format: FormatConfig,
}

impl MarkdownRenderer {
    pub fn new(format: FormatConfig) -> Self {
        Self { format }
    }

    pub fn format(&self) -> &FormatConfig {
        &self.format
    }

    fn media_link(&self, file_name: &str) -> String {
        format!("./{}/{}", self.format.media_dir_name, file_name)
    }

    /// Short text used when quoting a replied-to message
    fn quote_text(&self, message: &Message) -> String {
        let labels = self.format.locale.labels();
        let caption_or = |fallback: &str| {
            message
                .caption
                .clone()
                .unwrap_or_else(|| format!("[{}]", fallback))
        };

        match &message.content {
            MessageContent::Text { text } => text.clone(),
            MessageContent::Photo { .. } => caption_or(labels.photo),
            MessageContent::Video { .. } => caption_or(labels.video),
            MessageContent::Document { .. } => caption_or(labels.document),
            MessageContent::Audio { .. } => caption_or(labels.audio),
            MessageContent::Voice { .. } => format!("[{}]", labels.voice),
            MessageContent::Sticker { emoji } => {
                format!("[{} {}]", labels.sticker, emoji.as_deref().unwrap_or_default())
            }
            MessageContent::Animation => caption_or(labels.gif),
            MessageContent::Location { .. } => format!("[{}]", labels.location),
            MessageContent::Poll { question } => format!("[{}: {}]", labels.poll, question),
            MessageContent::Contact {
                first_name,
                last_name,
                ..
            } => format!(
                "[{}: {} {}]",
                labels.contact,
                first_name,
                last_name.as_deref().unwrap_or_default()
            ),
            MessageContent::Other => format!("[{}]", message.kind()),
        }
    }
}

/// Prefix every line with `> `
fn quote(text: &str) -> String {
    text.split('\n')
        .map(|line| format!("> {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

fn push_caption(out: &mut String, caption: Option<&str>) {
    if let Some(caption) = caption.filter(|c| !c.is_empty()) {
        out.push('\n');
        push_line(out, caption);
    }
}

impl Renderer for MarkdownRenderer {
    fn render(
        &self,
        message: &Message,
        media_file: Option<&str>,
        transcript: Option<&str>,
        reply_to: Option<&Message>,
    ) -> Result<String> {
        let labels = self.format.locale.labels();
        let time = self.format.local_time(message.timestamp);
        let media_file = media_file.filter(|name| !name.is_empty());
        let caption = message.caption.as_deref();

        let mut out = String::new();

        push_line(
            &mut out,
            &format!(
                "### [[{} {}]] {}",
                time.format("%Y-%m-%d"),
                self.format.locale.weekday_abbrev(time.weekday()),
                time.format("%H:%M:%S")
            ),
        );
        out.push('\n');

        if let Some(reply) = reply_to {
            let reply_text = self.quote_text(reply);
            if !reply_text.is_empty() {
                push_line(&mut out, &quote(&reply_text));
                out.push('\n');
            }
        }

        match &message.content {
            MessageContent::Text { text } => push_line(&mut out, text),
            MessageContent::Photo { .. } => {
                if let Some(name) = media_file {
                    push_line(&mut out, &format!("![]({})", self.media_link(name)));
                }
                push_caption(&mut out, caption);
            }
            MessageContent::Video { .. }
            | MessageContent::Document { .. }
            | MessageContent::Audio { .. } => {
                if let Some(name) = media_file {
                    push_line(&mut out, &format!("[{}]({})", name, self.media_link(name)));
                }
                push_caption(&mut out, caption);
            }
            MessageContent::Voice { .. } => {
                if let Some(name) = media_file {
                    push_line(&mut out, &format!("[{}]({})", name, self.media_link(name)));
                    out.push('\n');
                }
                if let Some(text) = transcript.filter(|t| !t.is_empty()) {
                    push_line(&mut out, &quote(text));
                }
            }
            MessageContent::Sticker { emoji } => {
                push_line(&mut out, &format!("[{}]", labels.sticker));
                if let Some(emoji) = emoji.as_deref().filter(|e| !e.is_empty()) {
                    push_line(&mut out, &format!("{}: {}", labels.emoji, emoji));
                }
            }
            MessageContent::Animation => {
                push_line(&mut out, &format!("[{}]", labels.animation));
                push_caption(&mut out, caption);
            }
            MessageContent::Location {
                latitude,
                longitude,
            } => push_line(
                &mut out,
                &format!(
                    "[{}] {}: {}, {}: {}",
                    labels.location, labels.latitude, latitude, labels.longitude, longitude
                ),
            ),
            MessageContent::Poll { question } => {
                push_line(&mut out, &format!("[{}]", labels.poll));
                push_line(&mut out, &format!("{}: {}", labels.question, question));
            }
            MessageContent::Contact {
                first_name,
                last_name,
                phone_number,
            } => {
                push_line(&mut out, &format!("[{}]", labels.contact));
                push_line(
                    &mut out,
                    &format!(
                        "{}: {} {}",
                        labels.name,
                        first_name,
                        last_name.as_deref().unwrap_or_default()
                    ),
                );
                push_line(&mut out, &format!("{}: {}", labels.phone, phone_number));
            }
            MessageContent::Other => {
                push_line(
                    &mut out,
                    &format!("[{}: {}]", labels.unsupported, message.kind()),
                );
            }
        }

        out.push('\n');
        push_line(&mut out, BLOCK_SEPARATOR);
        out.push('\n');

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FileRef;
    use chrono::TimeZone;

    fn renderer(locale: Locale) -> MarkdownRenderer {
        MarkdownRenderer::new(
            FormatConfig::new(locale, "media").with_utc_offset(FixedOffset::east_opt(0).unwrap()),
        )
    }

    fn message(content: MessageContent) -> Message {
        Message {
            id: 1,
            // Saturday
            timestamp: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
            chat_id: 10,
            content,
            caption: None,
            reply_to: None,
        }
    }

    #[test]
    fn test_text_block_layout() {
        let msg = message(MessageContent::Text {
            text: "hello\nworld".to_string(),
        });

        let block = renderer(Locale::En).render(&msg, None, None, None).unwrap();

        assert_eq!(
            block,
            "### [[2024-03-09 Sat]] 14:05:07\n\nhello\nworld\n\n---\n\n"
        );
    }

    #[test]
    fn test_russian_weekday_header() {
        let msg = message(MessageContent::Text {
            text: "привет".to_string(),
        });

        let block = renderer(Locale::Ru).render(&msg, None, None, None).unwrap();
        assert!(block.starts_with("### [[2024-03-09 Сб]] 14:05:07"));
    }

    #[test]
    fn test_photo_with_caption() {
        let mut msg = message(MessageContent::Photo {
            sizes: vec![FileRef::new("p")],
        });
        msg.caption = Some("sunset".to_string());

        let block = renderer(Locale::En)
            .render(&msg, Some("photo.jpg"), None, None)
            .unwrap();

        assert!(block.contains("![](./media/photo.jpg)\n\nsunset\n"));
    }

    #[test]
    fn test_voice_transcript_is_quoted() {
        let msg = message(MessageContent::Voice {
            file: FileRef::new("v"),
            duration_secs: 3,
        });

        let block = renderer(Locale::En)
            .render(&msg, Some("voice.ogg"), Some("line one\nline two"), None)
            .unwrap();

        assert!(block.contains("[voice.ogg](./media/voice.ogg)\n\n> line one\n> line two\n"));
    }

    #[test]
    fn test_reply_target_is_quoted_before_body() {
        let original = message(MessageContent::Text {
            text: "question?".to_string(),
        });
        let reply = message(MessageContent::Text {
            text: "answer".to_string(),
        });

        let block = renderer(Locale::En)
            .render(&reply, None, None, Some(&original))
            .unwrap();

        let quote_at = block.find("> question?").unwrap();
        let body_at = block.find("answer").unwrap();
        assert!(quote_at < body_at);
    }

    #[test]
    fn test_contact_and_location_labels() {
        let contact = message(MessageContent::Contact {
            first_name: "Ada".to_string(),
            last_name: Some("Lovelace".to_string()),
            phone_number: "+100".to_string(),
        });
        let block = renderer(Locale::En).render(&contact, None, None, None).unwrap();
        assert!(block.contains("[Contact]\nName: Ada Lovelace\nPhone: +100\n"));

        let location = message(MessageContent::Location {
            latitude: 55.75,
            longitude: 37.61,
        });
        let block = renderer(Locale::En).render(&location, None, None, None).unwrap();
        assert!(block.contains("[Location] Latitude: 55.75, Longitude: 37.61"));
    }

    #[test]
    fn test_unsupported_kind_is_labelled() {
        let block = renderer(Locale::En)
            .render(&message(MessageContent::Other), None, None, None)
            .unwrap();
        assert!(block.contains("[Unsupported message type: other]"));
    }
}
