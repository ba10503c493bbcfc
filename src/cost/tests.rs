use super::*;
use crate::pricing::{ModelPrice, PricingCatalog, PricingEntry};
use crate::usage::{TokenCounts, TokenSource, UsageRecord};

fn test_catalog() -> PricingCatalog {
    let mut catalog = PricingCatalog::new("test-v1");
    // $0.001 per 1K input, $0.002 per 1K output
    catalog.register(PricingEntry::new(
        "m-small",
        "test",
        ModelPrice {
            input: 0.001,
            output: 0.002,
            cache_read: 0.0,
            cache_write: 0.0,
            unit_size: 1_000,
        },
    ));
    catalog
}

fn usage(context: &str, model: &str, prompt: u64, completion: u64) -> UsageRecord {
    UsageRecord::new(
        "s1",
        context,
        model,
        TokenCounts::new(prompt, completion),
        TokenSource::Measured,
    )
}

#[test]
fn test_price_known_model() {
    let catalog = test_catalog();
    let record = price(&usage("agent_main", "m-small", 100, 50), &catalog);

    assert!(record.priced);
    assert!((record.input_cost - 0.0001).abs() < 1e-9);
    assert!((record.output_cost - 0.0001).abs() < 1e-9);
    assert!((record.total_cost - 0.0002).abs() < 1e-9);
    assert_eq!(record.pricing_version, "test-v1");
}

#[test]
fn test_price_unknown_model_is_zero_and_flagged() {
    let catalog = test_catalog();
    let record = price(&usage("agent_main", "mystery-model", 1000, 1000), &catalog);

    assert!(!record.priced);
    assert_eq!(record.total_cost, 0.0);
}

#[test]
fn test_price_is_deterministic() {
    let catalog = test_catalog();
    let record = usage("agent_main", "m-small", 123, 456);

    let first = price(&record, &catalog);
    let second = price(&record, &catalog);
    assert_eq!(first, second);
}

#[test]
fn test_aggregate_empty_history() {
    let catalog = test_catalog();
    let costs = aggregate("s1", &[], &catalog, true);

    assert_eq!(costs.summary.total_cost, 0.0);
    assert_eq!(costs.summary.total_calls, 0);
    assert!(costs.by_model.is_empty());
    assert!(costs.by_context.is_empty());
    assert_eq!(costs.records.as_deref(), Some(&[][..]));
}

#[test]
fn test_aggregate_two_calls() {
    // call 1: prompt=100, completion=50; call 2: prompt=200, completion=0
    // input $0.001/1K, output $0.002/1K:
    //   (100+200)/1000*0.001 + 50/1000*0.002 = 0.0003 + 0.0001 = 0.0004
    let catalog = test_catalog();
    let records = vec![
        usage("agent_main", "m-small", 100, 50),
        usage("agent_main", "m-small", 200, 0),
    ];

    let costs = aggregate("s1", &records, &catalog, false);

    assert_eq!(costs.summary.total_calls, 2);
    assert!((costs.summary.total_cost - 0.0004).abs() < 1e-9);
    let by_model = costs.by_model.get("m-small").unwrap();
    assert!((by_model.total_cost - 0.0004).abs() < 1e-9);
    assert_eq!(by_model.call_count, 2);
    assert!(costs.records.is_none());
}

#[test]
fn test_aggregate_total_equals_sum_of_records() {
    let catalog = test_catalog();
    let records = vec![
        usage("agent_main", "m-small", 1000, 500),
        usage("tool_query", "m-small", 250, 250),
        usage("tool_query", "unknown-model", 9999, 9999),
    ];

    let costs = aggregate("s1", &records, &catalog, true);
    let sum: f64 = costs
        .records
        .as_ref()
        .unwrap()
        .iter()
        .map(|r| r.total_cost)
        .sum();

    assert!((costs.summary.total_cost - sum).abs() < 1e-9);
}

#[test]
fn test_aggregate_groups_by_model_and_context() {
    let catalog = test_catalog();
    let records = vec![
        usage("agent_main", "m-small", 100, 0),
        usage("tool_query", "m-small", 200, 0),
        usage("agent_main", "other-model", 300, 0),
    ];

    let costs = aggregate("s1", &records, &catalog, false);

    assert_eq!(costs.by_model.len(), 2);
    assert_eq!(costs.by_context.len(), 2);
    assert_eq!(costs.by_model["m-small"].call_count, 2);
    assert_eq!(costs.by_context["agent_main"].call_count, 2);
    assert_eq!(costs.by_context["agent_main"].prompt_tokens, 400);
}

#[test]
fn test_aggregate_counts_degraded_records() {
    let catalog = test_catalog();
    let mut estimated = usage("agent_main", "m-small", 40, 10);
    estimated.source = TokenSource::Estimated;
    let mut absent = usage("agent_main", "m-small", 0, 0);
    absent.source = TokenSource::Absent;
    let unpriced = usage("agent_main", "mystery-model", 10, 10);

    let costs = aggregate(
        "s1",
        &[estimated, absent, unpriced],
        &catalog,
        false,
    );

    assert_eq!(costs.summary.estimated_calls, 2);
    assert_eq!(costs.summary.unpriced_calls, 1);
    assert_eq!(costs.summary.total_calls, 3);
}

#[test]
fn test_repricing_same_history_is_identical() {
    let catalog = test_catalog();
    let records = vec![
        usage("agent_main", "m-small", 100, 50),
        usage("tool_query", "m-small", 200, 25),
    ];

    let first = aggregate("s1", &records, &catalog, true);
    let second = aggregate("s1", &records, &catalog, true);
    assert_eq!(first, second);
}

#[test]
fn test_summary_merge() {
    let mut a = CostSummary {
        total_cost: 0.5,
        total_calls: 2,
        prompt_tokens: 100,
        completion_tokens: 50,
        ..Default::default()
    };
    let b = CostSummary {
        total_cost: 0.25,
        total_calls: 1,
        prompt_tokens: 10,
        completion_tokens: 5,
        estimated_calls: 1,
        ..Default::default()
    };

    a.merge(&b);
    assert!((a.total_cost - 0.75).abs() < 1e-9);
    assert_eq!(a.total_calls, 3);
    assert_eq!(a.prompt_tokens, 110);
    assert_eq!(a.estimated_calls, 1);
}
