//! Tests for the query and serve commands

use graphrag::commands::query::build_request;
use graphrag::commands::serve::resolve_addr;
use graphrag::Config;

#[test]
fn test_build_request_trims_and_drops_blank_seeds() {
    let request = build_request(
        "  Who founded Rome?  ",
        &["Romulus".to_string(), "  ".to_string()],
        Some(5),
    )
    .unwrap();
    assert_eq!(request.question, "Who founded Rome?");
    assert_eq!(request.entities, vec!["Romulus".to_string()]);
    assert_eq!(request.top_n, Some(5));
}

#[test]
fn test_build_request_rejects_blank_question() {
    assert!(build_request("   ", &[], None).is_err());
}

#[test]
fn test_build_request_ignores_zero_top_n() {
    let request = build_request("q", &[], Some(0)).unwrap();
    assert_eq!(request.top_n, None);
}

#[test]
fn test_resolve_addr_prefers_override() {
    let config = Config::from_yaml_str("server:\n  addr: 127.0.0.1:9000\n").unwrap();
    assert_eq!(resolve_addr(&config, None).unwrap().port(), 9000);
    assert_eq!(resolve_addr(&config, Some("0.0.0.0:8123")).unwrap().port(), 8123);
    assert!(resolve_addr(&config, Some("not an address")).is_err());
}
