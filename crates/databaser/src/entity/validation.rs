//! Pipe-syntax attribute rules (`required|email|max:255`)

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ModelError, ModelResult};
use crate::value::{Row, Value};

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9._%+-]*[a-zA-Z0-9])?@[a-zA-Z0-9]([a-zA-Z0-9.-]*[a-zA-Z0-9])?\.[a-zA-Z]{2,}$")
            .expect("email pattern is valid")
    })
}

/// One parsed rule
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Required,
    Nullable,
    Numeric,
    Integer,
    String,
    Boolean,
    Email,
    Min(f64),
    Max(f64),
    Between(f64, f64),
    In(Vec<String>),
    NotIn(Vec<String>),
    Regex(String),
}

impl Rule {
    /// Parse a whole rule string, e.g. `required|string|between:3,20`
    pub fn parse_all(definition: &str) -> ModelResult<Vec<Rule>> {
        definition.split('|')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(Rule::parse)
            .collect()
    }

    pub fn parse(part: &str) -> ModelResult<Rule> {
        let (name, args) = match part.split_once(':') {
            Some((name, args)) => (name.trim(), Some(args)),
            None => (part.trim(), None),
        };
        let number = |raw: &str| -> ModelResult<f64> {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| ModelError::Validation(format!("rule '{}' needs a numeric argument", part)))
        };
        let list = |raw: Option<&str>| -> Vec<String> {
            raw.map(|r| r.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default()
        };

        match (name, args) {
            ("required", _) => Ok(Rule::Required),
            ("nullable", _) => Ok(Rule::Nullable),
            ("numeric", _) => Ok(Rule::Numeric),
            ("integer", _) => Ok(Rule::Integer),
            ("string", _) => Ok(Rule::String),
            ("boolean", _) => Ok(Rule::Boolean),
            ("email", _) => Ok(Rule::Email),
            ("min", Some(n)) => Ok(Rule::Min(number(n)?)),
            ("max", Some(n)) => Ok(Rule::Max(number(n)?)),
            ("between", Some(range)) => match range.split_once(',') {
                Some((lo, hi)) => Ok(Rule::Between(number(lo)?, number(hi)?)),
                None => Err(ModelError::Validation(format!("rule '{}' needs two bounds", part))),
            },
            ("in", raw) => Ok(Rule::In(list(raw))),
            ("not_in", raw) => Ok(Rule::NotIn(list(raw))),
            // Everything after the first ':' is the pattern; it cannot contain '|'
            ("regex", Some(pattern)) => Ok(Rule::Regex(pattern.to_string())),
            _ => Err(ModelError::Validation(format!("unknown validation rule '{}'", part))),
        }
    }

    /// Size used by min/max/between: numbers by value, text by character count
    fn size(value: &Value) -> Option<f64> {
        match value {
            Value::Int(_) | Value::Float(_) => value.as_f64(),
            Value::String(s) => Some(s.chars().count() as f64),
            Value::Bytes(b) => Some(b.len() as f64),
            Value::Bool(_) | Value::Null => None,
        }
    }

    /// `None` when the value passes, otherwise the failure message
    fn check(&self, field: &str, value: Option<&Value>) -> Option<String> {
        let present = value.filter(|v| !v.is_null() && v.to_string() != "");
        match self {
            Rule::Required => match present {
                Some(_) => None,
                None => Some(format!("{} is required", field)),
            },
            Rule::Nullable => None,
            _ => {
                let value = present?;
                let ok = match self {
                    Rule::Numeric => value.is_numeric(),
                    Rule::Integer => match value {
                        Value::Int(_) => true,
                        Value::String(s) => s.trim().parse::<i64>().is_ok(),
                        _ => false,
                    },
                    Rule::String => matches!(value, Value::String(_)),
                    Rule::Boolean => match value {
                        Value::Bool(_) => true,
                        Value::Int(i) => *i == 0 || *i == 1,
                        Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
                        _ => false,
                    },
                    Rule::Email => email_pattern().is_match(&value.to_string()),
                    Rule::Min(min) => Rule::size(value).map_or(false, |s| s >= *min),
                    Rule::Max(max) => Rule::size(value).map_or(false, |s| s <= *max),
                    Rule::Between(lo, hi) => Rule::size(value).map_or(false, |s| s >= *lo && s <= *hi),
                    Rule::In(options) => options.iter().any(|o| *o == value.to_string()),
                    Rule::NotIn(options) => options.iter().all(|o| *o != value.to_string()),
                    Rule::Regex(pattern) => match Regex::new(pattern) {
                        Ok(re) => re.is_match(&value.to_string()),
                        Err(_) => return Some(format!("{} has an invalid regex rule", field)),
                    },
                    Rule::Required | Rule::Nullable => true,
                };
                if ok {
                    None
                } else {
                    Some(self.message(field))
                }
            }
        }
    }

    fn message(&self, field: &str) -> String {
        match self {
            Rule::Numeric => format!("{} must be numeric", field),
            Rule::Integer => format!("{} must be an integer", field),
            Rule::String => format!("{} must be a string", field),
            Rule::Boolean => format!("{} must be a boolean", field),
            Rule::Email => format!("{} must be a valid email address", field),
            Rule::Min(min) => format!("{} must be at least {}", field, min),
            Rule::Max(max) => format!("{} may not be greater than {}", field, max),
            Rule::Between(lo, hi) => format!("{} must be between {} and {}", field, lo, hi),
            Rule::In(_) => format!("{} is not one of the allowed values", field),
            Rule::NotIn(_) => format!("{} is one of the forbidden values", field),
            Rule::Regex(_) => format!("{} format is invalid", field),
            Rule::Required => format!("{} is required", field),
            Rule::Nullable => String::new(),
        }
    }
}

/// Check `attributes` against `rules`; the first failing rule is reported
pub fn validate_attributes<'a, I>(attributes: &Row, rules: I) -> ModelResult<()>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    for (field, definition) in rules {
        for rule in Rule::parse_all(definition)? {
            if let Some(message) = rule.check(field, attributes.get(field)) {
                return Err(ModelError::Validation(message));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;
    use std::collections::BTreeMap;

    fn rules(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_required_and_email() {
        let rules = rules(&[("email", "required|email|max:255")]);
        assert!(validate_attributes(&row! {"email" => "ada@example.com"}, &rules).is_ok());
        assert_eq!(
            validate_attributes(&row! {"email" => ""}, &rules),
            Err(ModelError::Validation("email is required".to_string()))
        );
        assert_eq!(
            validate_attributes(&row! {"email" => "not-an-email"}, &rules),
            Err(ModelError::Validation("email must be a valid email address".to_string()))
        );
    }

    #[test]
    fn test_sizes_depend_on_type() {
        let rules = rules(&[("age", "integer|between:18,99"), ("name", "string|min:2")]);
        assert!(validate_attributes(&row! {"age" => 30, "name" => "Al"}, &rules).is_ok());
        assert!(validate_attributes(&row! {"age" => 12, "name" => "Al"}, &rules).is_err());
        assert!(validate_attributes(&row! {"age" => 30, "name" => "A"}, &rules).is_err());
    }

    #[test]
    fn test_optional_fields_skip_non_required_rules() {
        let rules = rules(&[("nickname", "nullable|string|max:3")]);
        assert!(validate_attributes(&row! {"nickname" => Value::Null}, &rules).is_ok());
        assert!(validate_attributes(&row! {}, &rules).is_ok());
    }

    #[test]
    fn test_in_and_regex() {
        let rules = rules(&[("status", "in:draft,published"), ("slug", "regex:^[a-z-]+$")]);
        assert!(validate_attributes(&row! {"status" => "draft", "slug" => "hello-world"}, &rules).is_ok());
        assert!(validate_attributes(&row! {"status" => "deleted", "slug" => "x"}, &rules).is_err());
        assert!(validate_attributes(&row! {"status" => "draft", "slug" => "Hello"}, &rules).is_err());
    }

    #[test]
    fn test_unknown_rule() {
        assert!(Rule::parse_all("required|frobnicate").is_err());
    }
}
