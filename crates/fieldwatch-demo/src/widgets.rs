#![forbid(unsafe_code)]

//! Headless stand-ins for the form's display elements.
//!
//! Each widget is shared between the form and the observers that update it,
//! so state sits behind a mutex. Nothing here draws; [`FormState`] is the
//! printable snapshot.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// TextInput
// ---------------------------------------------------------------------------

/// An editable single-line text field.
#[derive(Debug, Default)]
pub struct TextInput {
    text: Mutex<String>,
}

impl TextInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents.
    #[must_use]
    pub fn text(&self) -> String {
        lock(&self.text).clone()
    }

    pub fn set_text(&self, text: &str) {
        let mut current = lock(&self.text);
        current.clear();
        current.push_str(text);
    }
}

// ---------------------------------------------------------------------------
// StatusLabel
// ---------------------------------------------------------------------------

/// Text color of a status label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tone {
    #[default]
    Neutral,
    Success,
    Error,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Neutral => "neutral",
            Self::Success => "success",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LabelState {
    text: String,
    tone: Tone,
    visible: bool,
}

/// A one-line status message under the input.
#[derive(Debug)]
pub struct StatusLabel {
    state: Mutex<LabelState>,
}

impl StatusLabel {
    /// An empty, visible label.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LabelState {
                text: String::new(),
                tone: Tone::Neutral,
                visible: true,
            }),
        }
    }

    pub fn set_text(&self, text: &str) {
        lock(&self.state).text = text.to_string();
    }

    pub fn set_tone(&self, tone: Tone) {
        lock(&self.state).tone = tone;
    }

    pub fn set_visible(&self, visible: bool) {
        lock(&self.state).visible = visible;
    }

    #[must_use]
    pub fn text(&self) -> String {
        lock(&self.state).text.clone()
    }

    #[must_use]
    pub fn tone(&self) -> Tone {
        lock(&self.state).tone
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        lock(&self.state).visible
    }
}

impl Default for StatusLabel {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// InputLayout
// ---------------------------------------------------------------------------

/// Container around the input that can show an error line.
#[derive(Debug, Default)]
pub struct InputLayout {
    error: Mutex<Option<String>>,
}

impl InputLayout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `error`, or clear it with `None`.
    pub fn set_error(&self, error: Option<&str>) {
        *lock(&self.error) = error.map(str::to_string);
    }

    #[must_use]
    pub fn error(&self) -> Option<String> {
        lock(&self.error).clone()
    }
}

// ---------------------------------------------------------------------------
// FormState
// ---------------------------------------------------------------------------

/// Point-in-time copy of every widget, for printing and comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    pub input: String,
    pub status: String,
    pub tone: Tone,
    pub status_visible: bool,
    pub error: Option<String>,
}

impl FormState {
    #[must_use]
    pub fn capture(input: &TextInput, status: &StatusLabel, layout: &InputLayout) -> Self {
        let label = lock(&status.state).clone();
        Self {
            input: input.text(),
            status: label.text,
            tone: label.tone,
            status_visible: label.visible,
            error: layout.error(),
        }
    }
}

impl fmt::Display for FormState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input={:?}", self.input)?;
        if self.status_visible {
            write!(f, " status={:?} ({})", self.status, self.tone)?;
        } else {
            f.write_str(" status=<hidden>")?;
        }
        match &self.error {
            Some(error) => write!(f, " error={error:?}"),
            None => Ok(()),
        }
    }
}
