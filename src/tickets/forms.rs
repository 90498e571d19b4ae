/// Form input for ticket pages
///
/// Forms arrive url-encoded. Validation never fails the request: callers get
/// either the cleaned command or a map of field errors to hand back with the
/// submitted values.
use crate::tickets::{ModerationAction, ModerationDecision};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::BTreeMap};
use validator::{Validate, ValidationError, ValidationErrors};

/// Field name → messages
pub type FormErrors = BTreeMap<String, Vec<String>>;

/// Messages a moderator can pick when deferring (and approving) a sound
pub const DEFER_MESSAGES: &[(&str, &str)] = &[
    ("approved", "Thanks for your contribution, the sound has been approved."),
    ("description", "Please add a more detailed description of your sound."),
    ("tags", "Please add more tags so other users can find your sound."),
    ("license", "Please check that the license you chose fits this sound."),
];

/// Messages a moderator can pick when deleting a sound
pub const DELETE_MESSAGES: &[(&str, &str)] = &[
    ("copyright", "The sound was deleted because it contains copyrighted material."),
    ("not_a_sound", "The sound was deleted because it is not a sound recording."),
    ("duplicate", "The sound was deleted because it duplicates an existing upload."),
];

fn choice_text(choices: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    choices
        .iter()
        .find(|(choice, _)| *choice == key)
        .map(|(_, text)| *text)
}

fn invalid_choice() -> ValidationError {
    let mut error = ValidationError::new("invalid_choice");
    error.message = Some(Cow::from("Select a valid choice."));
    error
}

fn validate_defer_choice(value: &str) -> Result<(), ValidationError> {
    choice_text(DEFER_MESSAGES, value)
        .map(|_| ())
        .ok_or_else(invalid_choice)
}

fn validate_delete_choice(value: &str) -> Result<(), ValidationError> {
    choice_text(DELETE_MESSAGES, value)
        .map(|_| ())
        .ok_or_else(invalid_choice)
}

fn validate_action(value: &str) -> Result<(), ValidationError> {
    ModerationAction::from_str(value)
        .map(|_| ())
        .map_err(|_| invalid_choice())
}

fn validate_ticket_id(value: &str) -> Result<(), ValidationError> {
    value.trim().parse::<i64>().map(|_| ()).map_err(|_| {
        let mut error = ValidationError::new("invalid");
        error.message = Some(Cow::from("Enter a whole number."));
        error
    })
}

/// Flatten validator output into field → messages
pub fn collect_errors(errors: &ValidationErrors) -> FormErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errors)| {
            let messages = errors
                .iter()
                .map(|error| match &error.message {
                    Some(message) => message.to_string(),
                    None => default_message(&error.code),
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

fn default_message(code: &str) -> String {
    match code {
        "length" => "This field is required or too long.".to_string(),
        "email" => "Enter a valid email address.".to_string(),
        other => format!("Invalid value ({}).", other),
    }
}

/// Contact form; `email` is only asked of anonymous visitors
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ContactForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 10000))]
    pub message: String,
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
}

/// Cleaned contact form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRequest {
    pub title: String,
    pub message: String,
    pub email: Option<String>,
}

impl ContactForm {
    pub fn clean(&self, anonymous: bool) -> Result<ContactRequest, FormErrors> {
        // A blank email counts as missing, not malformed
        let email = self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty());
        let normalized = ContactForm {
            email: email.map(str::to_string),
            ..self.clone()
        };

        let mut errors = match normalized.validate() {
            Ok(()) => FormErrors::new(),
            Err(e) => collect_errors(&e),
        };

        if !anonymous {
            errors.remove("email");
        } else if email.is_none() {
            errors
                .entry("email".to_string())
                .or_default()
                .push("This field is required.".to_string());
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ContactRequest {
            title: self.title.clone(),
            message: self.message.clone(),
            email: if anonymous { email.map(str::to_string) } else { None },
        })
    }
}

/// Reply on a ticket
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct MessageForm {
    #[serde(default)]
    #[validate(length(min = 1, max = 10000))]
    pub message: String,
}

impl MessageForm {
    pub fn clean(&self) -> Result<String, FormErrors> {
        self.validate()
            .map(|_| self.message.clone())
            .map_err(|e| collect_errors(&e))
    }
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct SoundModerationForm {
    #[validate(custom(function = "validate_action"))]
    pub action: String,
    #[validate(custom(function = "validate_ticket_id"))]
    pub ticket: String,
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct DeleteMessageForm {
    #[validate(custom(function = "validate_delete_choice"))]
    pub predefined: String,
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct DeferMessageForm {
    #[validate(custom(function = "validate_defer_choice"))]
    pub predefined: String,
    #[validate(length(max = 1000))]
    pub custom: String,
}

#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct ReturnMessageForm {
    #[validate(length(max = 1000))]
    pub custom: String,
}

/// The four moderation forms as posted from the assigned-tickets page.
/// Message forms carry a prefix so their fields can share one body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationSubmission {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub ticket: String,
    #[serde(rename = "delete-predefined", default)]
    pub delete_predefined: String,
    #[serde(rename = "defer-predefined", default)]
    pub defer_predefined: String,
    #[serde(rename = "defer-custom", default)]
    pub defer_custom: String,
    #[serde(rename = "return-custom", default)]
    pub return_custom: String,
}

/// Errors per sub-form
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModerationFormErrors {
    pub sound_moderation: FormErrors,
    pub delete_message: FormErrors,
    pub defer_message: FormErrors,
    pub return_message: FormErrors,
}

impl ModerationFormErrors {
    pub fn is_empty(&self) -> bool {
        self.sound_moderation.is_empty()
            && self.delete_message.is_empty()
            && self.defer_message.is_empty()
            && self.return_message.is_empty()
    }
}

fn form_errors<F: Validate>(form: &F) -> FormErrors {
    form.validate()
        .err()
        .map(|e| collect_errors(&e))
        .unwrap_or_default()
}

impl ModerationSubmission {
    pub fn sound_moderation(&self) -> SoundModerationForm {
        SoundModerationForm {
            action: self.action.clone(),
            ticket: self.ticket.clone(),
        }
    }

    pub fn delete_message(&self) -> DeleteMessageForm {
        DeleteMessageForm {
            predefined: self.delete_predefined.clone(),
        }
    }

    pub fn defer_message(&self) -> DeferMessageForm {
        DeferMessageForm {
            predefined: self.defer_predefined.clone(),
            custom: self.defer_custom.clone(),
        }
    }

    pub fn return_message(&self) -> ReturnMessageForm {
        ReturnMessageForm {
            custom: self.return_custom.clone(),
        }
    }

    /// Validate all four forms together and build the decision.
    ///
    /// Approve reuses the defer form's predefined message, Delete the delete
    /// form's, Defer joins the defer message with the free text and Return
    /// uses the return form's free text.
    pub fn clean(&self) -> Result<ModerationDecision, ModerationFormErrors> {
        let errors = ModerationFormErrors {
            sound_moderation: form_errors(&self.sound_moderation()),
            delete_message: form_errors(&self.delete_message()),
            defer_message: form_errors(&self.defer_message()),
            return_message: form_errors(&self.return_message()),
        };
        if !errors.is_empty() {
            return Err(errors);
        }

        // Both were checked by the validators above
        let (Ok(action), Ok(ticket_id)) = (
            ModerationAction::from_str(&self.action),
            self.ticket.trim().parse::<i64>(),
        ) else {
            return Err(errors);
        };

        let defer_text = choice_text(DEFER_MESSAGES, &self.defer_predefined).unwrap_or_default();
        let delete_text = choice_text(DELETE_MESSAGES, &self.delete_predefined).unwrap_or_default();

        let comment = match action {
            ModerationAction::Approve => defer_text.to_string(),
            ModerationAction::Defer => format!("{} \n {}", defer_text, self.defer_custom),
            ModerationAction::Return => self.return_custom.clone(),
            ModerationAction::Delete => delete_text.to_string(),
        };

        Ok(ModerationDecision {
            ticket_id,
            action,
            comment,
        })
    }
}
