//! Templates embedded in the binary, shared by the mailer and the server-rendered views.

use minijinja::Environment;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::errors::Error;

const SOURCES: &[(&str, &str)] = &[
    ("email/base.html", include_str!("../templates/email/base.html")),
    ("email/welcome.html", include_str!("../templates/email/welcome.html")),
    ("email/welcome.txt", include_str!("../templates/email/welcome.txt")),
    ("email/password_reset.html", include_str!("../templates/email/password_reset.html")),
    ("email/password_reset.txt", include_str!("../templates/email/password_reset.txt")),
    ("views/base.html", include_str!("../templates/views/base.html")),
    ("views/overview.html", include_str!("../templates/views/overview.html")),
    ("views/tour.html", include_str!("../templates/views/tour.html")),
    ("views/login.html", include_str!("../templates/views/login.html")),
    ("views/account.html", include_str!("../templates/views/account.html")),
    ("views/error.html", include_str!("../templates/views/error.html")),
];

static TEMPLATES: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    for &(name, source) in SOURCES {
        // A broken template surfaces as a render error for that template only
        if let Err(e) = env.add_template(name, source) {
            tracing::error!(template = name, "Failed to parse template: {e}");
        }
    }
    env
});

/// Render a template by name.
pub fn render<S: Serialize>(name: &str, context: S) -> Result<String, Error> {
    TEMPLATES
        .get_template(name)
        .and_then(|template| template.render(context))
        .map_err(|e| Error::Internal {
            operation: format!("render template {name}: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_every_template_parses() {
        for &(name, _) in SOURCES {
            assert!(TEMPLATES.get_template(name).is_ok(), "template {name} failed to parse");
        }
    }

    #[test]
    fn test_unknown_template_is_internal_error() {
        let err = render("missing.html", context! {}).unwrap_err();
        assert!(matches!(err, Error::Internal { .. }));
    }
}
