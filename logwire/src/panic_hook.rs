//! Route uncaught panics through the structured logger.

use std::any::Any;
use std::panic;

use once_cell::sync::OnceCell;
use tracing::error;

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Install a panic hook that logs the payload and location before delegating
/// to the previously installed hook. Idempotent.
pub fn install_panic_hook() {
    INSTALLED.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|location| format!("{}:{}", location.file(), location.line()));
            error!(
                panic = %payload_text(info.payload()),
                location = location.as_deref().unwrap_or("unknown"),
                "uncaught panic"
            );
            previous(info);
        }));
    });
}

/// Best-effort text form of a panic payload.
pub(crate) fn payload_text(payload: &dyn Any) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text_handles_both_string_forms() {
        let static_payload: Box<dyn Any> = Box::new("boom");
        assert_eq!(payload_text(static_payload.as_ref()), "boom");

        let owned_payload: Box<dyn Any> = Box::new("boom owned".to_string());
        assert_eq!(payload_text(owned_payload.as_ref()), "boom owned");

        let opaque_payload: Box<dyn Any> = Box::new(42_u32);
        assert_eq!(payload_text(opaque_payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn install_is_idempotent() {
        install_panic_hook();
        install_panic_hook();
    }
}
