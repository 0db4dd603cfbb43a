//! Attribute helpers shared by the resources and data sources

use tfplug::plan_modifier::{PlanModifier, PlanModifyRequest, PlanModifyResponse};
use tfplug::types::{AttributePath, Dynamic, DynamicValue};

/// A string attribute as the host sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringValue {
    Unknown,
    Null,
    Value(String),
}

impl StringValue {
    /// Reads attribute `name`; a missing attribute reads as null
    pub fn from_attribute(state: &DynamicValue, name: &str) -> Self {
        match state.get(&AttributePath::new(name)) {
            Ok(Dynamic::String(s)) => StringValue::Value(s.clone()),
            Ok(Dynamic::Unknown) => StringValue::Unknown,
            _ => StringValue::Null,
        }
    }

    pub fn to_dynamic(&self) -> Dynamic {
        match self {
            StringValue::Unknown => Dynamic::Unknown,
            StringValue::Null => Dynamic::Null,
            StringValue::Value(s) => Dynamic::String(s.clone()),
        }
    }

    pub fn write_to(&self, state: &mut DynamicValue, name: &str) -> tfplug::Result<()> {
        state.set_value(&AttributePath::new(name), self.to_dynamic())
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            StringValue::Value(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, StringValue::Unknown)
    }
}

/// Absent maps to null, present to a known value (even when empty)
pub fn string_value_or_null(value: Option<String>) -> StringValue {
    match value {
        Some(s) => StringValue::Value(s),
        None => StringValue::Null,
    }
}

/// Null (or unknown) maps to absent
pub fn value_string_or_null(value: &StringValue) -> Option<String> {
    value.as_deref().map(str::to_string)
}

/// Canonical JSON text: insignificant whitespace removed, object keys sorted.
/// Numbers keep their source text (serde_json `arbitrary_precision`).
pub fn minify_json(value: &str) -> Result<String, serde_json::Error> {
    let parsed: serde_json::Value = serde_json::from_str(value)?;
    serde_json::to_string(&parsed)
}

/// Plans the stored value when the configured JSON only differs from it
/// in formatting
pub struct CanonicalJson;

impl PlanModifier for CanonicalJson {
    fn description(&self) -> String {
        "formatting-only changes to this JSON document are ignored".to_string()
    }

    fn modify_plan(&self, request: PlanModifyRequest) -> PlanModifyResponse {
        let formatting_only = match (&request.plan, &request.state) {
            (Dynamic::String(planned), Dynamic::String(stored)) => matches!(
                (minify_json(planned), minify_json(stored)),
                (Ok(a), Ok(b)) if a == b
            ),
            _ => false,
        };
        let plan_value = if formatting_only {
            request.state
        } else {
            request.plan
        };

        PlanModifyResponse {
            plan_value,
            requires_replace: false,
            diagnostics: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_empty_are_distinct() {
        assert_eq!(string_value_or_null(None), StringValue::Null);
        assert_eq!(
            string_value_or_null(Some(String::new())),
            StringValue::Value(String::new())
        );

        assert_eq!(value_string_or_null(&StringValue::Null), None);
        assert_eq!(
            value_string_or_null(&StringValue::Value(String::new())),
            Some(String::new())
        );
    }

    #[test]
    fn unknown_is_never_sent() {
        assert_eq!(value_string_or_null(&StringValue::Unknown), None);
        assert!(!StringValue::Unknown.is_known());
    }

    #[test]
    fn attributes_round_trip_through_state() {
        let mut state = DynamicValue::object();
        StringValue::Value("v".to_string())
            .write_to(&mut state, "ca")
            .unwrap();
        StringValue::Null.write_to(&mut state, "server").unwrap();
        StringValue::Unknown.write_to(&mut state, "id").unwrap();

        assert_eq!(
            StringValue::from_attribute(&state, "ca"),
            StringValue::Value("v".to_string())
        );
        assert_eq!(StringValue::from_attribute(&state, "server"), StringValue::Null);
        assert_eq!(StringValue::from_attribute(&state, "id"), StringValue::Unknown);
        assert_eq!(StringValue::from_attribute(&state, "missing"), StringValue::Null);
    }

    #[test]
    fn minify_strips_whitespace() {
        assert_eq!(minify_json("{ \"a\" : 1 }").unwrap(), r#"{"a":1}"#);
        assert_eq!(
            minify_json("[ 1, { \"b\" : [ true , null ] } ]").unwrap(),
            r#"[1,{"b":[true,null]}]"#
        );
    }

    #[test]
    fn minify_is_idempotent() {
        let inputs = [
            "{\n  \"z\": 1,\n  \"a\": {\"nested\": \"x y\"}\n}",
            "  \"spaced string\"  ",
            "[]",
            "3.5",
        ];
        for input in inputs {
            let once = minify_json(input).unwrap();
            assert_eq!(minify_json(&once).unwrap(), once);
        }
    }

    #[test]
    fn equal_documents_minify_identically() {
        let a = minify_json(r#"{"a": 1, "b": [1, 2]}"#).unwrap();
        let b = minify_json("{\"b\":[1,2],\n\"a\":1}").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn minify_preserves_whitespace_inside_strings() {
        assert_eq!(
            minify_json(r#"{ "k" : "a  b" }"#).unwrap(),
            r#"{"k":"a  b"}"#
        );
    }

    #[test]
    fn minify_keeps_number_text() {
        assert_eq!(
            minify_json(r#"{ "replicas": 1e2, "big": 123456789012345678901234 }"#).unwrap(),
            r#"{"big":123456789012345678901234,"replicas":1e2}"#
        );
        assert_eq!(minify_json("[ 1.0, -0, 0.1 ]").unwrap(), "[1.0,-0,0.1]");
    }

    #[test]
    fn minify_rejects_invalid_json() {
        assert!(minify_json("{not json").is_err());
    }

    fn modify(plan: Dynamic, state: Dynamic) -> Dynamic {
        CanonicalJson
            .modify_plan(PlanModifyRequest {
                state,
                plan: plan.clone(),
                config: plan,
                attribute_path: "context".to_string(),
            })
            .plan_value
    }

    #[test]
    fn canonical_json_keeps_state_for_formatting_changes() {
        let planned = modify(Dynamic::string("{ \"a\" : 1 }"), Dynamic::string(r#"{"a":1}"#));
        assert_eq!(planned, Dynamic::string(r#"{"a":1}"#));
    }

    #[test]
    fn canonical_json_keeps_real_changes() {
        let planned = modify(Dynamic::string(r#"{"a":2}"#), Dynamic::string(r#"{"a":1}"#));
        assert_eq!(planned, Dynamic::string(r#"{"a":2}"#));

        let planned = modify(Dynamic::Null, Dynamic::string(r#"{"a":1}"#));
        assert_eq!(planned, Dynamic::Null);
    }
}
