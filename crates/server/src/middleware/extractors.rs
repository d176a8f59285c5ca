//! Request extractors that sanitize and validate input before handlers run.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{StatusCode, request::Parts},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use utils::{
    response::FieldError,
    sanitize::{escape_strings, normalize_value},
};

use crate::{
    error::ApiError,
    validation::{FieldRules, Validate, coerce_query, validate},
};

/// Path parameters. Malformed ids become a 400 naming `params`.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// A JSON body that has been sanitized, checked against `T::rules()` and deserialized.
#[derive(Debug)]
pub struct Validated<T>(pub T);

impl<S, T> FromRequest<S> for Validated<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::PayloadTooLarge
            } else {
                ApiError::BadRequest(rejection.body_text())
            }
        })?;

        let mut value = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice::<Value>(&bytes).map_err(|error| {
                ApiError::validation("body", format!("Malformed JSON: {error}"), Value::Null)
            })?
        };

        if !value.is_object() {
            return Err(ApiError::validation(
                "body",
                "Request body must be a JSON object",
                Value::Null,
            ));
        }

        normalize_value(&mut value, T::RAW_FIELDS);
        into_validated(value, &T::rules(), T::RAW_FIELDS).map(Validated)
    }
}

/// Query parameters run through the same sanitize and validate steps as bodies.
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(raw) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)?;

        let mut value = Value::Object(
            raw.into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect(),
        );
        normalize_value(&mut value, T::RAW_FIELDS);

        let rules = T::rules();
        coerce_query(&mut value, &rules);
        into_validated(value, &rules, T::RAW_FIELDS).map(ApiQuery)
    }
}

/// Validate the trimmed input, then escape it for storage.
fn into_validated<T: DeserializeOwned>(
    mut value: Value,
    rules: &[FieldRules],
    raw_fields: &[&str],
) -> Result<T, ApiError> {
    let errors = validate(&value, rules);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    escape_strings(&mut value, raw_fields);

    // Rules cover shape; serde still rejects things like unknown enum values.
    serde_json::from_value(value).map_err(|error| {
        ApiError::Validation(vec![FieldError::new(
            "body",
            error.to_string(),
            Value::Null,
        )])
    })
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::validation::field;

    #[derive(Debug, Deserialize)]
    struct Signup {
        name: String,
        password: String,
    }

    impl Validate for Signup {
        const RAW_FIELDS: &'static [&'static str] = &["password"];

        fn rules() -> Vec<FieldRules> {
            vec![
                field("name").required().string().length(2, 100),
                field("password").required().string().length(8, 128),
            ]
        }
    }

    #[derive(Debug, Deserialize)]
    struct Listing {
        page: Option<i64>,
        unread: Option<bool>,
    }

    impl Validate for Listing {
        fn rules() -> Vec<FieldRules> {
            vec![
                field("page").integer().range(1.0, 1000.0),
                field("unread").boolean(),
            ]
        }
    }

    fn json_request(body: &str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn sanitizes_everything_except_raw_fields() {
        let req = json_request(r#"{"name":" <b>Ada</b> ","password":" <secret> "}"#);
        let Validated(signup) = Validated::<Signup>::from_request(req, &()).await.unwrap();
        assert_eq!(signup.name, "&lt;b&gt;Ada&lt;/b&gt;");
        assert_eq!(signup.password, " <secret> ");
    }

    #[tokio::test]
    async fn length_rules_count_unescaped_characters() {
        let name = format!("Tom & Jerry {}", "x".repeat(88));
        assert_eq!(name.chars().count(), 100);
        let body = json!({ "name": name, "password": "long enough" }).to_string();

        let Validated(signup) = Validated::<Signup>::from_request(json_request(&body), &())
            .await
            .unwrap();
        assert!(signup.name.starts_with("Tom &amp; Jerry"));
    }

    #[tokio::test]
    async fn malformed_json_names_the_body() {
        let req = json_request("{not json");
        let err = Validated::<Signup>::from_request(req, &())
            .await
            .unwrap_err();
        match err {
            ApiError::Validation(errors) => assert_eq!(errors[0].field, "body"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_body_reports_required_fields() {
        let req = json_request("");
        let err = Validated::<Signup>::from_request(req, &())
            .await
            .unwrap_err();
        match err {
            ApiError::Validation(errors) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["name", "password"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn query_strings_are_coerced() {
        let req = Request::builder()
            .uri("/?page=3&unread=true")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let ApiQuery(listing) = ApiQuery::<Listing>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(listing.page, Some(3));
        assert_eq!(listing.unread, Some(true));
    }

    #[tokio::test]
    async fn bad_query_values_are_rejected() {
        let req = Request::builder()
            .uri("/?page=0")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = req.into_parts();
        let err = ApiQuery::<Listing>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        match err {
            ApiError::Validation(errors) => {
                assert_eq!(errors[0].field, "page");
                assert_eq!(errors[0].value, json!(0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
