use crate::crd::BaseApplication;
use crate::error::{Error, Result};

use super::quantity::parse_quantity;

fn required_field_message(field_paths: &[&str]) -> String {
    format!("must set the field(s): {}", field_paths.join(","))
}

/// Check the application for settings the customize functions cannot act on.
pub fn validate(app: &impl BaseApplication) -> Result<()> {
    if let Some(storage) = app.storage() {
        if storage.volume_claim_template.is_none() {
            let size = storage.size.as_deref().unwrap_or_default();
            if size.is_empty() {
                return Err(Error::validation(required_field_message(&[
                    "spec.storage.size",
                ])));
            }
            if let Err(e) = parse_quantity(size) {
                return Err(Error::validation(format!("cannot parse '{size}': {e}")));
            }
        }
    }
    Ok(())
}
