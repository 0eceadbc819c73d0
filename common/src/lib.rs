pub mod config;

use validator::ValidationErrors;

/// Flattens `validator` errors into one user-displayable line.
pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = Vec::new();
    for errs in errors.field_errors().values() {
        for err in errs.iter() {
            if let Some(msg) = &err.message {
                messages.push(msg.to_string());
            }
        }
    }
    messages.join("; ")
}
