//! Typed payloads behind the facade's `track_*` helpers.
//!
//! Each payload knows its event name and how to flatten itself into [`EventParams`]. Free-form
//! text is clipped to the parameter value limit so a long title or error message never causes the
//! whole event to be rejected.

use crate::analytics::event::{EventParams, ParamValue};

pub(crate) trait EventPayload {
    fn event_name(&self) -> &'static str;
    fn into_params(self, max_text_len: usize) -> EventParams;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageView {
    pub page_title: String,
    pub page_location: Option<String>,
    pub referrer: Option<String>,
}

impl PageView {
    pub fn new(page_title: impl Into<String>) -> Self {
        Self {
            page_title: page_title.into(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.page_location = Some(location.into());
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }
}

impl EventPayload for PageView {
    fn event_name(&self) -> &'static str {
        "page_view"
    }

    fn into_params(self, max_text_len: usize) -> EventParams {
        let mut params = EventParams::new();
        insert_text(&mut params, "page_title", self.page_title, max_text_len);
        if let Some(location) = self.page_location {
            insert_text(&mut params, "page_location", location, max_text_len);
        }
        if let Some(referrer) = self.referrer {
            insert_text(&mut params, "page_referrer", referrer, max_text_len);
        }
        params
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptActionKind {
    Created,
    Updated,
    Deleted,
    Copied,
    Used,
}

impl PromptActionKind {
    fn event_name(self) -> &'static str {
        match self {
            PromptActionKind::Created => "prompt_created",
            PromptActionKind::Updated => "prompt_updated",
            PromptActionKind::Deleted => "prompt_deleted",
            PromptActionKind::Copied => "prompt_copied",
            PromptActionKind::Used => "prompt_used",
        }
    }
}

/// Something the user did to a stored prompt. Prompt text itself is never sent, only its length.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptAction {
    pub kind: PromptActionKind,
    pub category: Option<String>,
    pub content_length: Option<usize>,
    pub source: Option<String>,
}

impl PromptAction {
    pub fn new(kind: PromptActionKind) -> Self {
        Self {
            kind,
            category: None,
            content_length: None,
            source: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_content_length(mut self, length: usize) -> Self {
        self.content_length = Some(length);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl EventPayload for PromptAction {
    fn event_name(&self) -> &'static str {
        self.kind.event_name()
    }

    fn into_params(self, max_text_len: usize) -> EventParams {
        let mut params = EventParams::new();
        if let Some(category) = self.category {
            insert_text(&mut params, "category", category, max_text_len);
        }
        if let Some(length) = self.content_length {
            params.insert("content_length".into(), ParamValue::from(length));
        }
        if let Some(source) = self.source {
            insert_text(&mut params, "source", source, max_text_len);
        }
        params
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub result_count: usize,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>, result_count: usize) -> Self {
        Self {
            term: term.into(),
            result_count,
        }
    }
}

impl EventPayload for SearchQuery {
    fn event_name(&self) -> &'static str {
        "search"
    }

    fn into_params(self, max_text_len: usize) -> EventParams {
        let mut params = EventParams::new();
        insert_text(&mut params, "search_term", self.term, max_text_len);
        params.insert("result_count".into(), ParamValue::from(self.result_count));
        params
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorReport {
    pub error_type: String,
    pub message: String,
    pub context: Option<String>,
    pub fatal: bool,
}

impl ErrorReport {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            context: None,
            fatal: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }
}

impl EventPayload for ErrorReport {
    fn event_name(&self) -> &'static str {
        "app_error"
    }

    fn into_params(self, max_text_len: usize) -> EventParams {
        let mut params = EventParams::new();
        insert_text(&mut params, "error_type", self.error_type, max_text_len);
        insert_text(&mut params, "error_message", self.message, max_text_len);
        if let Some(context) = self.context {
            insert_text(&mut params, "error_context", context, max_text_len);
        }
        params.insert("fatal".into(), ParamValue::from(self.fatal));
        params
    }
}

fn insert_text(params: &mut EventParams, key: &str, value: String, max_len: usize) {
    let value = if value.chars().count() > max_len {
        value.chars().take(max_len).collect()
    } else {
        value
    };
    params.insert(key.to_string(), ParamValue::Text(value));
}
