use std::fmt;

use serde_json::{Map, Value};
use trafficlight_protocol::analytics::RouterMeta;

use crate::action::AlsoInvocation;
use crate::rule::{Condition, OutputData, OutputDescriptor, OutputKind, RuleDefinition, ToolInvocation};

/// A single schema violation at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

/// Every violation found in a rule document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.violations.push(Violation {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.path.as_str()).collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", violation.path, violation.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

impl RuleDefinition {
    /// Validates a parsed document and builds the typed definition.
    ///
    /// All violations are collected before returning.
    pub fn from_value(name: impl Into<String>, document: &Value) -> Result<Self, ValidationReport> {
        let mut report = ValidationReport::default();

        let Some(root) = document.as_object() else {
            report.push("$", "document must be a mapping");
            return Err(report);
        };

        let meta = parse_meta(root.get("meta"), &mut report);
        let condition = parse_condition(root.get("if"), &mut report);
        let then_branch = match root.get("then") {
            None | Some(Value::Null) => {
                report.push("then", "branch is required");
                None
            }
            Some(value) => parse_descriptor("then", value, &mut report),
        };
        let else_branch = match root.get("else") {
            None | Some(Value::Null) => Some(OutputDescriptor::empty()),
            Some(value) => parse_descriptor("else", value, &mut report),
        };

        match (condition, then_branch, else_branch) {
            (Some(condition), Some(then_branch), Some(else_branch)) if report.is_empty() => {
                Ok(RuleDefinition {
                    name: name.into(),
                    meta,
                    condition,
                    then_branch,
                    else_branch,
                })
            }
            _ => Err(report),
        }
    }
}

fn parse_meta(value: Option<&Value>, report: &mut ValidationReport) -> Option<RouterMeta> {
    let map = match value {
        None | Some(Value::Null) => return None,
        Some(Value::Object(map)) => map,
        Some(_) => {
            report.push("meta", "must be a mapping");
            return None;
        }
    };

    let group = match map.get("group") {
        None | Some(Value::Null) => None,
        Some(Value::String(group)) => Some(group.clone()),
        Some(_) => {
            report.push("meta.group", "must be a string");
            None
        }
    };
    let noindex = match map.get("noindex") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => {
            report.push("meta.noindex", "must be a boolean");
            false
        }
    };

    Some(RouterMeta { group, noindex })
}

fn parse_condition(value: Option<&Value>, report: &mut ValidationReport) -> Option<Condition> {
    match value {
        None => {
            report.push("if", "condition is required");
            None
        }
        Some(Value::Bool(literal)) => Some(Condition::Literal(*literal)),
        Some(Value::Object(map)) => parse_tools(map, report).map(Condition::Tools),
        Some(_) => {
            report.push("if", "must be a boolean or a mapping");
            None
        }
    }
}

fn parse_tools(map: &Map<String, Value>, report: &mut ValidationReport) -> Option<Vec<ToolInvocation>> {
    let entries = match map.get("tools") {
        None | Some(Value::Null) => return Some(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            report.push("if.tools", "must be a sequence");
            return None;
        }
    };

    let before = report.len();
    let mut tools = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let path = format!("if.tools[{index}]");
        match entry {
            Value::String(name) => tools.push(ToolInvocation::new(name, Value::Null)),
            Value::Object(single) if single.len() == 1 => {
                if let Some((name, args)) = single.iter().next() {
                    tools.push(ToolInvocation::new(name, args.clone()));
                }
            }
            Value::Object(_) => report.push(path, "tool mapping must have exactly one key"),
            _ => report.push(path, "tool must be a name or a single-key mapping"),
        }
    }

    (report.len() == before).then_some(tools)
}

fn parse_descriptor(path: &str, value: &Value, report: &mut ValidationReport) -> Option<OutputDescriptor> {
    let Some(map) = value.as_object() else {
        report.push(path, "branch must be a mapping");
        return None;
    };
    let before = report.len();

    let kind = match map.get("type") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => {
            let kind = OutputKind::parse(raw);
            if kind.is_none() {
                report.push(
                    format!("{path}.type"),
                    format!("unknown output type {raw:?}, expected JSON, HTML, REDIRECT or PROXYPASS"),
                );
            }
            kind
        }
        Some(_) => {
            report.push(format!("{path}.type"), "must be a string");
            None
        }
    };

    let data = match map.get("data") {
        None | Some(Value::Null) => OutputData::default(),
        Some(Value::Object(data)) => {
            let file = match data.get("file") {
                None | Some(Value::Null) => None,
                Some(Value::String(file)) => Some(file.clone()),
                Some(_) => {
                    report.push(format!("{path}.data.file"), "must be a string");
                    None
                }
            };
            let raw = data.get("raw").filter(|raw| !raw.is_null()).cloned();
            OutputData { file, raw }
        }
        Some(_) => {
            report.push(format!("{path}.data"), "must be a mapping");
            OutputData::default()
        }
    };

    let also = match map.get("also") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => parse_also(path, entries, report),
        Some(_) => {
            report.push(format!("{path}.also"), "must be a sequence");
            Vec::new()
        }
    };

    (report.len() == before).then_some(OutputDescriptor { kind, data, also })
}

fn parse_also(path: &str, entries: &[Value], report: &mut ValidationReport) -> Vec<AlsoInvocation> {
    let mut also = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let entry_path = format!("{path}.also[{index}]");
        let Some(map) = entry.as_object() else {
            report.push(entry_path, "action must be a mapping");
            continue;
        };
        let name = match map.get("name") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name.clone(),
            Some(_) => {
                report.push(format!("{entry_path}.name"), "must be a string");
                continue;
            }
        };
        let props = map.get("props").cloned().unwrap_or(Value::Null);
        also.push(AlsoInvocation::new(name, props));
    }
    also
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolKind;
    use serde_json::json;

    #[test]
    fn parses_full_document() {
        let doc = json!({
            "meta": {"group": "promo", "noindex": true},
            "if": {"tools": [
                {"EQ": {"value1": "$get.token", "value2": "secret"}},
                "BOTS_APPLE_IP",
                {"SOMETHING_NEW": {"x": 1}}
            ]},
            "then": {
                "type": "json",
                "data": {"file": "$PWD/a.json", "raw": {"ok": true}},
                "also": [{"name": "log", "props": {"token": "$get.token"}}]
            }
        });

        let rule = RuleDefinition::from_value("promo", &doc).expect("valid");
        assert_eq!(rule.name, "promo");
        assert!(rule.is_noindex());
        assert_eq!(rule.tools().len(), 3);
        assert_eq!(rule.tools()[0].kind, ToolKind::Eq);
        assert_eq!(rule.tools()[1].kind, ToolKind::BotsAppleIp);
        assert!(rule.tools()[1].args.is_null());
        assert_eq!(rule.tools()[2].kind, ToolKind::Unknown("SOMETHING_NEW".into()));
        assert_eq!(rule.then_branch.kind, Some(OutputKind::Json));
        assert_eq!(rule.then_branch.data.file.as_deref(), Some("$PWD/a.json"));
        assert_eq!(rule.then_branch.also.len(), 1);
        assert!(rule.else_branch.is_empty());
    }

    #[test]
    fn literal_condition_and_null_else() {
        let doc = json!({"if": false, "then": {"type": "REDIRECT", "data": {"raw": "https://a"}}, "else": null});
        let rule = RuleDefinition::from_value("r", &doc).expect("valid");
        assert_eq!(rule.condition, Condition::Literal(false));
        assert!(rule.else_branch.is_empty());
    }

    #[test]
    fn empty_tools_mapping_is_valid() {
        let rule = RuleDefinition::from_value("r", &json!({"if": {}, "then": {}})).expect("valid");
        assert_eq!(rule.condition, Condition::Tools(vec![]));
        assert!(rule.then_branch.is_empty());
    }

    #[test]
    fn collects_every_violation() {
        let doc = json!({
            "meta": {"group": 3, "noindex": "yes"},
            "if": {"tools": [42, {"A": 1, "B": 2}]},
            "then": {"type": "XML", "data": {"file": 7}, "also": [{"name": 1}, "log"]},
            "else": []
        });

        let report = RuleDefinition::from_value("bad", &doc).expect_err("invalid");
        assert_eq!(
            report.paths(),
            vec![
                "meta.group",
                "meta.noindex",
                "if.tools[0]",
                "if.tools[1]",
                "then.type",
                "then.data.file",
                "then.also[0].name",
                "then.also[1]",
                "else",
            ]
        );
    }

    #[test]
    fn missing_condition_and_then_are_reported() {
        let report = RuleDefinition::from_value("bad", &json!({"else": {}})).expect_err("invalid");
        assert_eq!(report.paths(), vec!["if", "then"]);
        assert!(report.to_string().contains("if: condition is required"));
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        let report = RuleDefinition::from_value("bad", &json!(["if"])).expect_err("invalid");
        assert_eq!(report.len(), 1);
        assert!(RuleDefinition::from_value("bad", &Value::Null).is_err());
    }

    #[test]
    fn tools_must_be_a_sequence() {
        let report = RuleDefinition::from_value("bad", &json!({"if": {"tools": "EQ"}, "then": {}}))
            .expect_err("invalid");
        assert_eq!(report.paths(), vec!["if.tools"]);
    }
}
