// Benchmarks rule parsing, template masking and full evaluation.
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use trafficlight::protocol::client::GeoRecord;
use trafficlight::protocol::request::RequestContext;
use trafficlight::rules::{mask_object, standard_mask, PredicateRegistry, StaticGeoLocator};
use trafficlight::{RuleDefinition, RuleEvaluator};

fn evaluation_benchmarks(c: &mut Criterion) {
    let document = json!({
        "meta": {"group": "bench", "noindex": false},
        "if": {"tools": [
            {"EQ": {"value1": "$get.token", "value2": "secret"}},
            {"NOT_EQ": {"value1": "$body.userId", "value2": 0}},
            {"IP": {"country": ["US", "CA", "MX"]}},
            "NOT_BOTS_APPLE_IP"
        ]},
        "then": {"type": "JSON", "data": {"raw": {"ok": true, "request": "$request"}}},
        "else": {"type": "REDIRECT", "data": {"raw": "https://example.com"}}
    });
    let ctx = RequestContext::builder("POST", "/router/bench?token=secret&utm_source=mail")
        .header("user-agent", "bench/1.0")
        .body(json!({"user_id": 42, "first_name": "Ada"}))
        .client_ip(Some("8.8.8.8".to_string()))
        .build();

    c.bench_function("schema_from_value", |b| {
        b.iter(|| {
            let rule = RuleDefinition::from_value("bench", black_box(&document)).expect("valid rule");
            black_box(rule);
        });
    });

    c.bench_function("mask_tool_args", |b| {
        let args = json!({"value1": "$get.token", "value2": "$body.firstName"});
        b.iter(|| {
            let mask = standard_mask(black_box(&ctx));
            let masked = mask_object(black_box(&args), &mask).expect("mask");
            black_box(masked);
        });
    });

    let rule = RuleDefinition::from_value("bench", &document).expect("valid rule");
    let geo = StaticGeoLocator::new().with_record(
        "8.8.8.8".parse().expect("ip"),
        GeoRecord::with_country("US"),
    );
    let evaluator = RuleEvaluator::new(PredicateRegistry::new(Arc::new(geo), false));
    let runtime = tokio::runtime::Runtime::new().expect("runtime");

    c.bench_function("evaluate_four_tools", |b| {
        b.to_async(&runtime).iter(|| async {
            let decision = evaluator.evaluate(black_box(&rule), black_box(&ctx)).await;
            black_box(decision.outcome);
        });
    });
}

criterion_group!(benches, evaluation_benchmarks);
criterion_main!(benches);
