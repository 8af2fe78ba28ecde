// Fuzz target feeding arbitrary YAML and JSON documents to the rule schema validator.
#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use trafficlight_rules::RuleDefinition;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let mut documents = Vec::new();
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        documents.push(value);
    }
    if let Ok(value) = serde_yaml::from_str::<Value>(text) {
        documents.push(value);
    }

    for document in documents {
        match RuleDefinition::from_value("fuzz", &document) {
            Ok(rule) => {
                let _ = rule.tools().len();
            }
            Err(report) => assert!(!report.is_empty()),
        }
    }
});
