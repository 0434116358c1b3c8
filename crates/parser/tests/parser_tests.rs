//! Result parser feedback-loop tests

use std::sync::Arc;

use opforge_model::{
    Ability, Adversary, Agent, Fact, Link, LinkResult, LinkStatus, Operation, ParserConfig,
    ParserType,
};
use opforge_parser::ResultParser;
use opforge_transform::{Base64Encoder, Encoder, PlainTextEncoder};
use serde_json::json;

fn operation_with_result(parsers: Vec<ParserConfig>, output: &str) -> (Operation, uuid::Uuid) {
    let adversary = Adversary::new("adv-1", "test", vec![vec!["ab-1".into()]]);
    let agent = Agent::new("paw-1", "linux", vec!["sh".into()]);
    let mut op = Operation::new("test-op", "red", adversary, vec![agent]);

    let mut ability = Ability::new("ab-1", "collect", "linux", "sh", "collect");
    for parser in parsers {
        ability = ability.with_parser(parser);
    }

    let mut link = Link::new(op.id, "paw-1", ability, "collect");
    link.complete(LinkStatus::Success);
    let link_id = link.id;
    op.add_link(link);
    op.add_result(LinkResult::new(link_id, output));
    (op, link_id)
}

fn plain_parser() -> ResultParser {
    ResultParser::new(Arc::new(PlainTextEncoder))
}

#[test]
fn test_line_parser_through_pipeline() {
    let (mut op, link_id) = operation_with_result(
        vec![ParserConfig::new(ParserType::Line, "host.file.path", "")],
        "/tmp/a\n/tmp/b\n\n/tmp/c",
    );

    let learned = plain_parser().parse(&mut op);
    assert_eq!(learned, 3);
    assert_eq!(op.facts.len(), 3);
    assert!(op.facts.iter().all(|f| f.set_id == 0));
    assert!(op.facts.iter().all(|f| f.link_id == Some(link_id)));
    assert!(op.facts.iter().all(|f| f.collected_by.as_deref() == Some("paw-1")));
}

#[test]
fn test_reparse_is_noop() {
    let (mut op, _) = operation_with_result(
        vec![ParserConfig::new(ParserType::Line, "t", "")],
        "one\ntwo",
    );

    let parser = plain_parser();
    assert_eq!(parser.parse(&mut op), 2);
    assert!(op.results[0].parsed.is_some());

    // Second pass finds nothing unparsed.
    assert_eq!(parser.parse(&mut op), 0);
    assert_eq!(op.facts.len(), 2);
}

#[test]
fn test_blacklisted_duplicate_suppressed() {
    let (mut op, _) = operation_with_result(
        vec![ParserConfig::new(ParserType::Line, "host.ip", "")],
        "10.0.0.1\n10.0.0.2",
    );
    let mut poisoned = Fact::new("host.ip", "10.0.0.1");
    poisoned.blacklisted = true;
    op.facts.push(poisoned);

    let learned = plain_parser().parse(&mut op);
    assert_eq!(learned, 1);
    // Blacklisted original plus the one new fact.
    assert_eq!(op.facts.len(), 2);
    assert!(op.facts.iter().any(|f| f.value == json!("10.0.0.2")));
}

#[test]
fn test_non_blacklisted_duplicate_stored_again() {
    let (mut op, _) = operation_with_result(
        vec![ParserConfig::new(ParserType::Line, "host.ip", "")],
        "10.0.0.1",
    );
    op.facts.push(Fact::new("host.ip", "10.0.0.1"));

    let learned = plain_parser().parse(&mut op);
    // The narrow dedup rule only fires on blacklisted facts.
    assert_eq!(learned, 1);
    assert_eq!(op.facts.len(), 2);
}

#[test]
fn test_base64_encoded_output_decoded() {
    use base64::{engine::general_purpose::STANDARD, Engine};
    let blob = STANDARD.encode("alpha\nbravo");
    let (mut op, _) =
        operation_with_result(vec![ParserConfig::new(ParserType::Line, "t", "")], &blob);

    let parser = ResultParser::new(Arc::new(Base64Encoder));
    assert_eq!(parser.parse(&mut op), 2);
}

#[test]
fn test_undecodable_output_stamps_and_continues() {
    let (mut op, _) = operation_with_result(
        vec![ParserConfig::new(ParserType::Line, "t", "")],
        "!!!not base64!!!",
    );

    let parser = ResultParser::new(Arc::new(Base64Encoder));
    assert_eq!(parser.parse(&mut op), 0);
    // The attempt was made once; the result never re-enters the pass.
    assert!(op.results[0].parsed.is_some());
}

#[test]
fn test_failed_link_result_stamped_without_facts() {
    let (mut op, _) = operation_with_result(
        vec![ParserConfig::new(ParserType::Line, "t", "")],
        "output",
    );
    op.chain[0].status = LinkStatus::Error;

    assert_eq!(plain_parser().parse(&mut op), 0);
    assert!(op.facts.is_empty());
    // Terminal failures leave the pending set for good.
    assert!(op.results[0].parsed.is_some());
}

#[test]
fn test_unknown_link_result_stamped() {
    let (mut op, _) = operation_with_result(
        vec![ParserConfig::new(ParserType::Line, "t", "")],
        "output",
    );
    op.chain.clear();

    let parser = plain_parser();
    assert_eq!(parser.parse(&mut op), 0);
    assert!(op.results[0].parsed.is_some());
    assert_eq!(parser.parse(&mut op), 0);
}

#[test]
fn test_in_flight_link_result_parses_on_later_pass() {
    let (mut op, _) = operation_with_result(
        vec![ParserConfig::new(ParserType::Line, "t", "")],
        "one\ntwo",
    );
    op.chain[0].status = LinkStatus::Dispatched;

    let parser = plain_parser();
    assert_eq!(parser.parse(&mut op), 0);
    // Still pending: the link has not reached a terminal status.
    assert!(op.results[0].parsed.is_none());

    op.chain[0].status = LinkStatus::Success;
    assert_eq!(parser.parse(&mut op), 2);
    assert!(op.results[0].parsed.is_some());
}

#[test]
fn test_used_fact_scores_rewarded() {
    let (mut op, _) = operation_with_result(
        vec![ParserConfig::new(ParserType::Line, "host.file.path", "")],
        "/tmp/a\n/tmp/b",
    );
    op.facts.push(Fact::new("file.name", "secrets.txt"));
    op.chain[0].used = vec![Fact::new("file.name", "secrets.txt")];

    plain_parser().parse(&mut op);

    let seed = op
        .facts
        .iter()
        .find(|f| f.trait_name == "file.name")
        .unwrap();
    // Base score 1 plus one point per fact the link produced.
    assert_eq!(seed.score, 3);
}

#[test]
fn test_bad_parser_isolated_from_good_one() {
    let (mut op, _) = operation_with_result(
        vec![
            ParserConfig::new(ParserType::Regex, "bad", "[unclosed"),
            ParserConfig::new(ParserType::Line, "good", ""),
        ],
        "one\ntwo",
    );

    // The broken regex config is skipped; the line parser still runs.
    assert_eq!(plain_parser().parse(&mut op), 2);
}
