//! Declarative field rules for request bodies and query strings.
//!
//! Each payload type lists its rules through [`Validate::rules`]. Rules for one
//! field run in order and stop at the first failure, then evaluation moves on
//! to the next field, so a response names every offending field once.

use std::sync::LazyLock;

use chrono::DateTime;
use regex::Regex;
use serde_json::{Map, Number, Value};
use utils::{pagination::PageParams, response::FieldError};
use uuid::Uuid;

pub static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email regex is valid")
});

pub static HTTP_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s]+$").expect("url regex is valid"));

pub static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ()\-]{6,20}$").expect("phone regex is valid"));

#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    String,
    Integer,
    Number,
    Boolean,
    Array,
    /// Character count for strings, element count for arrays.
    Length {
        min: usize,
        max: usize,
    },
    Range {
        min: f64,
        max: f64,
    },
    OneOf(&'static [&'static str]),
    Matches(&'static Regex, &'static str),
    Email,
    Uuid,
    DateTime,
    /// Apply a rule to every element of an array.
    Each(Box<Rule>),
}

impl Rule {
    /// `None` when the value passes.
    fn check(&self, field: &str, value: &Value) -> Option<String> {
        match self {
            Rule::Required => None,
            Rule::String => (!value.is_string()).then(|| format!("{field} must be a string")),
            Rule::Integer => (!(value.is_i64() || value.is_u64()))
                .then(|| format!("{field} must be an integer")),
            Rule::Number => (!value.is_number()).then(|| format!("{field} must be a number")),
            Rule::Boolean => (!value.is_boolean()).then(|| format!("{field} must be a boolean")),
            Rule::Array => (!value.is_array()).then(|| format!("{field} must be an array")),
            Rule::Length { min, max } => {
                let len = match value {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    _ => return Some(format!("{field} must be a string or array")),
                };
                (len < *min || len > *max).then(|| {
                    if value.is_array() {
                        format!("{field} must contain between {min} and {max} items")
                    } else {
                        format!("{field} must be between {min} and {max} characters")
                    }
                })
            }
            Rule::Range { min, max } => match value.as_f64() {
                Some(n) if n >= *min && n <= *max => None,
                Some(_) => Some(format!("{field} must be between {min} and {max}")),
                None => Some(format!("{field} must be a number")),
            },
            Rule::OneOf(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => None,
                _ => Some(format!("{field} must be one of: {}", allowed.join(", "))),
            },
            Rule::Matches(re, message) => match value.as_str() {
                Some(s) if re.is_match(s) => None,
                _ => Some(format!("{field} {message}")),
            },
            Rule::Email => match value.as_str() {
                Some(s) if s.len() <= 254 && EMAIL_RE.is_match(s) => None,
                _ => Some(format!("{field} must be a valid email address")),
            },
            Rule::Uuid => match value.as_str() {
                Some(s) if Uuid::parse_str(s).is_ok() => None,
                _ => Some(format!("{field} must be a valid id")),
            },
            Rule::DateTime => match value.as_str() {
                Some(s) if DateTime::parse_from_rfc3339(s).is_ok() => None,
                _ => Some(format!("{field} must be an RFC 3339 date-time")),
            },
            Rule::Each(inner) => match value {
                Value::Array(items) => items
                    .iter()
                    .find_map(|item| inner.check(field, item))
                    .map(|message| format!("each item in {message}")),
                _ => Some(format!("{field} must be an array")),
            },
        }
    }
}

/// Ordered rules for one top-level field.
#[derive(Debug, Clone)]
pub struct FieldRules {
    field: &'static str,
    rules: Vec<Rule>,
}

pub fn field(name: &'static str) -> FieldRules {
    FieldRules {
        field: name,
        rules: Vec::new(),
    }
}

impl FieldRules {
    fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn required(self) -> Self {
        self.rule(Rule::Required)
    }

    pub fn string(self) -> Self {
        self.rule(Rule::String)
    }

    pub fn integer(self) -> Self {
        self.rule(Rule::Integer)
    }

    pub fn number(self) -> Self {
        self.rule(Rule::Number)
    }

    pub fn boolean(self) -> Self {
        self.rule(Rule::Boolean)
    }

    pub fn array(self) -> Self {
        self.rule(Rule::Array)
    }

    pub fn length(self, min: usize, max: usize) -> Self {
        self.rule(Rule::Length { min, max })
    }

    pub fn max_length(self, max: usize) -> Self {
        self.rule(Rule::Length { min: 0, max })
    }

    pub fn range(self, min: f64, max: f64) -> Self {
        self.rule(Rule::Range { min, max })
    }

    pub fn one_of(self, allowed: &'static [&'static str]) -> Self {
        self.rule(Rule::OneOf(allowed))
    }

    pub fn matches(self, re: &'static Regex, message: &'static str) -> Self {
        self.rule(Rule::Matches(re, message))
    }

    pub fn email(self) -> Self {
        self.rule(Rule::Email)
    }

    pub fn uuid(self) -> Self {
        self.rule(Rule::Uuid)
    }

    pub fn datetime(self) -> Self {
        self.rule(Rule::DateTime)
    }

    pub fn each(self, rule: Rule) -> Self {
        self.rule(Rule::Each(Box::new(rule)))
    }

    pub fn name(&self) -> &'static str {
        self.field
    }

    fn check(&self, value: Option<&Value>) -> Option<String> {
        let present = match value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(v) => Some(v),
        };

        match present {
            None if self.rules.iter().any(|r| matches!(r, Rule::Required)) => {
                Some(format!("{} is required", self.field))
            }
            // Optional and absent: nothing else applies.
            None => None,
            Some(value) => self.rules.iter().find_map(|r| r.check(self.field, value)),
        }
    }

    fn wants(&self, predicate: impl Fn(&Rule) -> bool) -> bool {
        self.rules.iter().any(predicate)
    }
}

/// Implemented by every payload that passes through the validating extractors.
pub trait Validate {
    /// Fields whose string values skip HTML escaping (passwords, URLs).
    const RAW_FIELDS: &'static [&'static str] = &[];

    fn rules() -> Vec<FieldRules>;
}

/// Run every field's rules against a JSON object.
pub fn validate(value: &Value, rules: &[FieldRules]) -> Vec<FieldError> {
    let empty = Map::new();
    let object = value.as_object().unwrap_or(&empty);

    rules
        .iter()
        .filter_map(|field_rules| {
            let raw = object.get(field_rules.field);
            field_rules.check(raw).map(|message| {
                FieldError::new(field_rules.field, message, raw.cloned().unwrap_or(Value::Null))
            })
        })
        .collect()
}

/// Query strings carry only text. Turn values into the JSON types their rules
/// expect so numeric and boolean rules apply the same way they do to bodies.
pub fn coerce_query(value: &mut Value, rules: &[FieldRules]) {
    let Some(object) = value.as_object_mut() else {
        return;
    };

    for field_rules in rules {
        let Some(Value::String(raw)) = object.get(field_rules.field) else {
            continue;
        };
        let raw = raw.trim();

        let coerced = if field_rules.wants(|r| matches!(r, Rule::Integer)) {
            raw.parse::<i64>().ok().map(Value::from)
        } else if field_rules.wants(|r| matches!(r, Rule::Number | Rule::Range { .. })) {
            raw.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        } else if field_rules.wants(|r| matches!(r, Rule::Boolean)) {
            match raw {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            }
        } else {
            None
        };

        if let Some(coerced) = coerced {
            object.insert(field_rules.field.to_string(), coerced);
        }
    }
}

/// `page`, `limit` and `sort`, shared by every listing.
pub fn pagination_rules() -> Vec<FieldRules> {
    vec![
        field("page").integer().range(1.0, f64::from(i32::MAX)),
        field("limit")
            .integer()
            .range(1.0, utils::pagination::MAX_PAGE_SIZE as f64),
        field("sort").string().max_length(64),
    ]
}

impl Validate for PageParams {
    fn rules() -> Vec<FieldRules> {
        pagination_rules()
    }
}
