//! Utility functions for the model module: random identifiers, slugs, image urls and the error type shared by all models.

use custom_error::custom_error;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use validator::ValidationErrors;

pub const DEFAULT_APP_URL: &str = "http://localhost:3000";
pub const DEFAULT_AVATAR_URL: &str = "https://www.gravatar.com/avatar?d=mp&f=y";
pub const POST_IDENTIFIER_LENGTH: usize = 7;
pub const COMMENT_IDENTIFIER_LENGTH: usize = 8;
pub const IMAGE_NAME_LENGTH: usize = 10;
pub const EMPTY_SLUG: &str = "untitled";

custom_error! {pub ServiceError
    NotFound{what: String} = "{what} not found",
    Forbidden{reason: String} = "{reason}",
    Invalid{field: String, msg: String} = "{msg}",
    Unavailable{what: String} = "{what} is not available",
    Upstream{details: String} = "Upstream service failed: {details}",
}

impl ServiceError {
    pub fn not_found(what: &str) -> anyhow::Error {
        anyhow::Error::new(ServiceError::NotFound {
            what: what.to_string(),
        })
    }

    pub fn forbidden(reason: &str) -> anyhow::Error {
        anyhow::Error::new(ServiceError::Forbidden {
            reason: reason.to_string(),
        })
    }

    pub fn invalid(field: &str, msg: &str) -> anyhow::Error {
        anyhow::Error::new(ServiceError::Invalid {
            field: field.to_string(),
            msg: msg.to_string(),
        })
    }
}

/// Field-level form errors, keyed by the name of the offending field.
pub type FieldErrors = BTreeMap<String, String>;

/// A rejected form. Unlike [`ServiceError::Invalid`] it can carry several fields at once.
#[derive(Debug)]
pub struct FormError {
    pub errors: FieldErrors,
}

impl FormError {
    pub fn new(errors: FieldErrors) -> FormError {
        FormError { errors }
    }

    pub fn single(field: &str, msg: &str) -> FormError {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), msg.to_string());
        FormError { errors }
    }
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fields = self
            .errors
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "Invalid form ({})", fields)
    }
}

impl Error for FormError {}

/// Keep the first message of each invalid field. Fields without a message get a generic one.
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut fields = FieldErrors::new();
    for (field, errs) in errors.field_errors() {
        let msg = errs
            .iter()
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| format!("The {} field is invalid.", field));
        fields.insert(field.to_string(), msg);
    }
    fields
}

/// A random identifier made of ASCII letters and digits.
pub fn make_id(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

fn fold_char(c: char) -> Option<char> {
    let folded = match c {
        'á' | 'ä' | 'â' | 'à' | 'ã' | 'å' | 'æ' => 'a',
        'č' | 'ç' | 'ć' => 'c',
        'ď' | 'đ' => 'd',
        'é' | 'ě' | 'ë' | 'è' | 'ê' | 'ẽ' | 'ĕ' | 'ȇ' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ň' | 'ñ' => 'n',
        'ó' | 'ö' | 'ò' | 'ô' | 'õ' | 'ø' | 'ð' => 'o',
        'ř' | 'ŕ' => 'r',
        'š' => 's',
        'ß' => 's',
        'ť' => 't',
        'ú' | 'ů' | 'ü' | 'ù' | 'û' => 'u',
        'ý' | 'ÿ' => 'y',
        'ž' => 'z',
        'þ' => 'b',
        '·' | '/' | '_' | ',' | ':' | ';' => '-',
        c if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' => c,
        c if c.is_whitespace() => ' ',
        _ => return None,
    };
    Some(folded)
}

/// Turn a post title into the url-safe part of its address.
///
/// Only `[a-z0-9-]` survives, runs of whitespace and dashes collapse into one dash, and a title
/// with nothing usable in it (e.g. only Hangul) becomes [`EMPTY_SLUG`].
pub fn slugify(title: &str) -> String {
    let lowered = title.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());

    for c in lowered.chars().filter_map(fold_char) {
        let c = if c == ' ' { '-' } else { c };
        if c == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.push(c);
    }

    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

/// The public base url of this server, used to build links to uploaded images.
pub fn app_url() -> String {
    match std::env::var("APP_URL") {
        Ok(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
        _ => DEFAULT_APP_URL.to_string(),
    }
}

pub fn image_url(base_url: &str, urn: &Option<String>) -> Option<String> {
    match urn {
        Some(urn) if !urn.is_empty() => Some(format!("{}/images/{}", base_url, urn)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_make_id() {
        let id = make_id(POST_IDENTIFIER_LENGTH);
        assert_eq!(id.len(), 7);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(make_id(32), make_id(32));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Rust   is -- fun!  "), "rust-is-fun");
        assert_eq!(slugify("Crème brûlée: a recipe"), "creme-brulee-a-recipe");
        assert_eq!(slugify("snake_case/and,more"), "snake-case-and-more");
        assert_eq!(slugify("안녕하세요"), EMPTY_SLUG);
        assert_eq!(slugify("Rust 안녕 2024"), "rust-2024");
        assert_eq!(slugify("---"), EMPTY_SLUG);
    }

    #[test]
    fn test_slugify_charset() {
        let titles = vec!["What's new in v1.2?", "  -Leading and trailing-  ", "a  --  b"];
        for title in titles {
            let slug = slugify(title);
            assert!(slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            assert!(!slug.starts_with('-'));
            assert!(!slug.ends_with('-'));
            assert!(!slug.contains("--"));
        }
    }

    #[test]
    fn test_image_url() {
        assert_eq!(
            image_url("http://localhost:4000", &Some("abc.png".to_string())),
            Some("http://localhost:4000/images/abc.png".to_string())
        );
        assert_eq!(image_url("http://localhost:4000", &None), None);
        assert_eq!(image_url("http://localhost:4000", &Some("".to_string())), None);
    }

    #[derive(Validate)]
    struct Form {
        #[validate(length(min = 3, message = "Too short."))]
        name: String,
        #[validate(email)]
        email: String,
    }

    #[test]
    fn test_field_errors() {
        let form = Form {
            name: "ab".to_string(),
            email: "nope".to_string(),
        };
        let errors = field_errors(&form.validate().unwrap_err());
        assert_eq!(errors.get("name").unwrap(), "Too short.");
        assert_eq!(errors.get("email").unwrap(), "The email field is invalid.");
    }

    #[test]
    fn test_form_error_display() {
        let mut errors = FieldErrors::new();
        errors.insert("email".to_string(), "Taken.".to_string());
        errors.insert("username".to_string(), "Too short.".to_string());
        let err = FormError::new(errors);
        assert_eq!(
            err.to_string(),
            "Invalid form (email: Taken., username: Too short.)"
        );
        assert_eq!(FormError::single("title", "Empty.").errors.len(), 1);
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::not_found("Post");
        assert_eq!(err.to_string(), "Post not found");
        match err.downcast_ref::<ServiceError>() {
            Some(ServiceError::NotFound { what }) => assert_eq!(what, "Post"),
            _ => panic!("expected a NotFound error"),
        }
    }
}
