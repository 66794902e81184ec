#![forbid(unsafe_code)]

//! The username form: two validators over one text input.
//!
//! - *availability* asks the [`UserRepository`] whether the name is taken and
//!   shows "Available" or "Not available" under the input.
//! - *compliance* checks the name is plain ASCII letters and digits and
//!   contains a fruit; failing names hide the status line and show an error.
//!
//! Both validators live in one [`ValidatorSet`] and are triggered together
//! by [`LoginForm::on_text_changed`].

use std::sync::Arc;

use fieldwatch::{
    AsyncCondition, Completion, CoordinationContext, Criteria, DispatchConfig, DispatchResult,
    Observe, Observer, Validation, ValidationResult, Validator, ValidatorSet,
};

use crate::repository::UserRepository;
use crate::widgets::{FormState, InputLayout, StatusLabel, TextInput, Tone};

pub const AVAILABLE: &str = "Available";
pub const NOT_AVAILABLE: &str = "Not available";
pub const INVALID_USERNAME: &str = "Invalid username";

/// Names must contain one of these, ignoring case.
pub const FRUITS: [&str; 6] = ["apple", "banana", "blueberry", "kiwi", "orange", "strawberry"];

/// Shortest input that triggers validation.
pub const DEFAULT_MIN_LENGTH: usize = 4;

/// The form's widgets.
#[derive(Debug, Clone)]
pub struct FormViews {
    pub input: Arc<TextInput>,
    pub status: Arc<StatusLabel>,
    pub layout: Arc<InputLayout>,
}

impl FormViews {
    #[must_use]
    pub fn new() -> Self {
        Self {
            input: Arc::new(TextInput::new()),
            status: Arc::new(StatusLabel::new()),
            layout: Arc::new(InputLayout::new()),
        }
    }

    /// Clear the error and the status text, and show the status line.
    pub fn reset(&self) {
        self.layout.set_error(None);
        self.status.set_visible(true);
        self.status.set_text("");
        self.status.set_tone(Tone::Neutral);
    }

    #[must_use]
    pub fn state(&self) -> FormState {
        FormState::capture(&self.input, &self.status, &self.layout)
    }
}

impl Default for FormViews {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Passes when no user with the entered name exists.
struct NameAvailable {
    repository: Arc<UserRepository>,
    views: FormViews,
}

impl AsyncCondition<TextInput> for NameAvailable {
    fn evaluate(&self, input: &TextInput, completion: Completion) {
        let name = input.text();
        let interrupt = completion.interrupt().clone();
        self.repository
            .get_user(&name, &interrupt, move |user| completion.complete(user.is_none()));
    }

    fn on_cancelled(&self) {
        self.views.reset();
    }
}

fn is_plain_alphanumeric(input: &TextInput) -> bool {
    input.text().chars().all(|c| c.is_ascii_alphanumeric())
}

fn contains_fruit(input: &TextInput) -> bool {
    let text = input.text().to_lowercase();
    FRUITS.iter().any(|fruit| text.contains(fruit))
}

// ---------------------------------------------------------------------------
// LoginForm
// ---------------------------------------------------------------------------

/// Form settings.
#[derive(Debug, Clone)]
pub struct FormConfig {
    pub min_length: usize,
    pub dispatch: DispatchConfig,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            min_length: DEFAULT_MIN_LENGTH,
            dispatch: DispatchConfig::default(),
        }
    }
}

/// A username field validated for availability and compliance.
pub struct LoginForm {
    views: FormViews,
    availability: Arc<Validator<TextInput>>,
    compliance: Arc<Validator<TextInput>>,
    validators: ValidatorSet,
    min_length: usize,
}

impl LoginForm {
    /// Build the form. Async verdicts are delivered on `context`.
    pub fn new(
        repository: Arc<UserRepository>,
        context: &CoordinationContext,
        config: FormConfig,
    ) -> Self {
        let views = FormViews::new();

        let mut availability = Validator::new(
            Criteria::<TextInput>::new(Arc::clone(&views.input))
                .with_config(config.dispatch.clone())
                .on_context(context)
                .async_test(NameAvailable {
                    repository,
                    views: views.clone(),
                }),
        );
        availability.observe(Arc::new(Observer::shared(
            Arc::clone(&views.status),
            |label: &StatusLabel, result: ValidationResult| {
                label.set_text(if result.is_valid() { AVAILABLE } else { NOT_AVAILABLE });
                label.set_tone(if result.is_valid() { Tone::Success } else { Tone::Error });
            },
        )));

        let mut compliance = Validator::new(
            Criteria::<TextInput>::new(Arc::clone(&views.input))
                .with_config(config.dispatch)
                .on_context(context)
                .test(is_plain_alphanumeric)
                .test(contains_fruit),
        );
        let observers: [Arc<dyn Observe>; 2] = [
            Arc::new(Observer::shared(
                Arc::clone(&views.status),
                |label: &StatusLabel, result: ValidationResult| label.set_visible(result.is_valid()),
            )),
            Arc::new(Observer::shared(
                Arc::clone(&views.layout),
                |layout: &InputLayout, result: ValidationResult| {
                    layout.set_error(result.is_invalid().then_some(INVALID_USERNAME));
                },
            )),
        ];
        compliance.observe_all(observers);

        let availability = Arc::new(availability);
        let compliance = Arc::new(compliance);
        let validators = ValidatorSet::from_validators([
            Arc::clone(&availability) as Arc<dyn Validation>,
            Arc::clone(&compliance) as Arc<dyn Validation>,
        ]);

        Self {
            views,
            availability,
            compliance,
            validators,
            min_length: config.min_length,
        }
    }

    /// Apply a text change and trigger (or cancel) validation.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error if the availability lookup could not be
    /// started.
    pub fn on_text_changed(&self, text: &str) -> DispatchResult {
        self.views.input.set_text(text);
        if text.chars().count() >= self.min_length {
            self.validators.validate()
        } else {
            self.validators.cancel_validation();
            self.views.reset();
            Ok(())
        }
    }

    /// Returns `true` once no availability lookup is outstanding.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.availability.criteria().in_flight_count() == 0
    }

    #[must_use]
    pub fn state(&self) -> FormState {
        self.views.state()
    }

    #[must_use]
    pub fn views(&self) -> &FormViews {
        &self.views
    }

    /// The availability validator.
    #[must_use]
    pub fn availability(&self) -> &Validator<TextInput> {
        &self.availability
    }

    /// The compliance validator.
    #[must_use]
    pub fn compliance(&self) -> &Validator<TextInput> {
        &self.compliance
    }
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("state", &self.state())
            .field("validators", &self.validators)
            .field("min_length", &self.min_length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn form(latency_ms: std::ops::Range<u64>) -> (LoginForm, CoordinationContext) {
        let context = CoordinationContext::new();
        let repository = Arc::new(UserRepository::new(latency_ms, 1));
        let form = LoginForm::new(repository, &context, FormConfig::default());
        (form, context)
    }

    fn settle(form: &LoginForm, context: &CoordinationContext) {
        assert!(context.run_until(WAIT, || form.is_settled()));
    }

    #[test]
    fn compliance_rules() {
        let input = TextInput::new();
        for (text, plain, fruit) in [
            ("happykiwi", true, true),
            ("HappyKiwi42", true, true),
            ("happy kiwi", false, true),
            ("kiwi!", false, true),
            ("potato", true, false),
            ("", true, false),
        ] {
            input.set_text(text);
            assert_eq!(is_plain_alphanumeric(&input), plain, "{text}");
            assert_eq!(contains_fruit(&input), fruit, "{text}");
        }
    }

    #[test]
    fn free_name_is_available() {
        let (form, context) = form(5..10);
        form.on_text_changed("happykiwi").unwrap();
        settle(&form, &context);
        let state = form.state();
        assert_eq!(state.status, AVAILABLE);
        assert_eq!(state.tone, Tone::Success);
        assert!(state.status_visible);
        assert_eq!(state.error, None);
    }

    #[test]
    fn taken_name_is_not_available() {
        let (form, context) = form(5..10);
        form.on_text_changed("RealKiwi").unwrap();
        settle(&form, &context);
        let state = form.state();
        assert_eq!(state.status, NOT_AVAILABLE);
        assert_eq!(state.tone, Tone::Error);
    }

    #[test]
    fn non_compliant_name_hides_status_and_shows_error() {
        let (form, context) = form(5..10);
        form.on_text_changed("potato").unwrap();

        // Compliance is synchronous.
        let state = form.state();
        assert!(!state.status_visible);
        assert_eq!(state.error.as_deref(), Some(INVALID_USERNAME));

        settle(&form, &context);
        assert_eq!(form.state().status, AVAILABLE);
    }

    #[test]
    fn short_input_cancels_and_resets() {
        let (form, context) = form(200..300);
        form.on_text_changed("kiwi!").unwrap();
        assert_eq!(form.state().error.as_deref(), Some(INVALID_USERNAME));
        assert!(!form.is_settled());

        form.on_text_changed("kiw").unwrap();
        assert!(form.is_settled());
        let state = form.state();
        assert!(state.status_visible);
        assert_eq!(state.status, "");
        assert_eq!(state.error, None);

        // The interrupted lookup never reports.
        context.run_for(Duration::from_millis(350));
        assert_eq!(form.state().status, "");
    }

    #[test]
    fn latest_text_wins() {
        let (form, context) = form(30..60);
        form.on_text_changed("realkiwi").unwrap();
        form.on_text_changed("realkiwi2").unwrap();
        settle(&form, &context);
        context.run_for(Duration::from_millis(80));
        assert_eq!(form.state().status, AVAILABLE);
        assert_eq!(form.availability().criteria().current_round().raw(), 2);
        assert_eq!(form.compliance().observer_count(), 2);
    }
}
