//! End-to-end scenarios driving a [`Grammar`] session through a toy
//! tokenizer, one per documented behavior rather than mechanical
//! encode/decode round-trips.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use unindent::unindent;

use grammar_session::tokenizer::ByteTokenizer;
use grammar_session::{Grammar, TokenizerOracle};

fn finite_ids(scores: &[f32]) -> Vec<u32> {
    let mut ids: Vec<u32> = scores
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s.is_finite())
        .map(|(id, _)| id as u32)
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn hello_world_then_newlines_then_eos() {
    let tokenizer = Arc::new(ByteTokenizer::new());
    let mut g = Grammar::new("root ::= \"Hello world\" [\\n]+\n", tokenizer.clone()).unwrap();

    let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
    g.mask_scores(&mut scores);
    assert_eq!(scores[tokenizer.eos_id() as usize], f32::NEG_INFINITY);

    for id in tokenizer.encode("Hello world") {
        g.advance(id).unwrap();
    }
    let newline = tokenizer.token_id_for("\n").unwrap();

    // Not nullable until at least one newline has been consumed.
    let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
    g.mask_scores(&mut scores);
    assert_eq!(scores[tokenizer.eos_id() as usize], f32::NEG_INFINITY);
    assert!(finite_ids(&scores).contains(&newline));

    g.advance(newline).unwrap();

    // Now nullable: EOS is on the table, and so is another newline.
    let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
    g.mask_scores(&mut scores);
    assert_eq!(scores[tokenizer.eos_id() as usize], 0.0);
    assert!(finite_ids(&scores).contains(&newline));

    g.advance(tokenizer.eos_id()).unwrap();
    assert!(g.is_finished());
}

#[test]
fn alice_command_forces_a_location() {
    let source = unindent(
        r#"
        root ::= "Alice: " action
        action ::= speech | command
        speech ::= '"' [^"\n]+ '"'
        command ::= "/go " location
        location ::= "hall" | "kitchen"
        "#,
    );
    let tokenizer = Arc::new(ByteTokenizer::new());
    let mut g = Grammar::new(&source, tokenizer.clone()).unwrap();

    for id in tokenizer.encode("Alice: /go ") {
        g.advance(id).unwrap();
    }

    // Only `hall` or `kitchen` can complete the sentence from here; a
    // speech-only byte like `"` must already be masked out.
    let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
    g.mask_scores(&mut scores);
    let quote = tokenizer.token_id_for("\"").unwrap();
    assert_eq!(scores[quote as usize], f32::NEG_INFINITY);
    let h = tokenizer.token_id_for("h").unwrap();
    assert!(scores[h as usize].is_finite());

    for id in tokenizer.encode("hall") {
        g.advance(id).unwrap();
    }
    assert!(g.is_finished());
}

#[test]
fn negative_class_tail_exception_lets_the_boundary_token_through() {
    let tokenizer = Arc::new(ByteTokenizer::with_extra_tokens(vec![".\"".to_string()]));
    let mut g = Grammar::new("root ::= '\"' [^\"]* '\"' 'H'\n", tokenizer.clone()).unwrap();

    g.advance(tokenizer.token_id_for("\"").unwrap()).unwrap();
    let boundary = tokenizer.token_id_for(".\"").unwrap();

    let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
    g.mask_scores(&mut scores);
    assert!(scores[boundary as usize].is_finite());

    g.advance(boundary).unwrap();
    g.advance(tokenizer.token_id_for("H").unwrap()).unwrap();
    assert!(g.is_finished());
}

#[test]
fn json_object_after_open_brace_only_close_or_key_or_space() {
    let source = unindent(
        r#"
        root ::= value
        value ::= object | string
        object ::= "{" ws (member ("," ws member)*)? ws "}"
        member ::= string ws ":" ws value
        string ::= '"' [^"]* '"'
        ws ::= [ \t\n]*
        "#,
    );
    let tokenizer = Arc::new(ByteTokenizer::new());
    let mut g = Grammar::new(&source, tokenizer.clone()).unwrap();

    g.advance(tokenizer.token_id_for("{").unwrap()).unwrap();

    let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
    g.mask_scores(&mut scores);
    let allowed = finite_ids(&scores);

    // Only whitespace, a quote (to start a key), or the closing brace can
    // follow `{`; digits (which could only start a bare `number`, not in
    // this grammar's `value`) must not appear.
    let mut expected: Vec<u32> = [" ", "\t", "\n", "\"", "}"]
        .iter()
        .map(|p| tokenizer.token_id_for(p).unwrap())
        .collect();
    expected.sort_unstable();
    assert_eq!(allowed, expected);
}

#[test]
fn any_token_sentinel_stays_eos_permitting_for_arbitrary_tokens() {
    let tokenizer = Arc::new(ByteTokenizer::new());
    let mut g = Grammar::new("root ::= .*\n", tokenizer.clone()).unwrap();

    for b in 1u8..=127 {
        let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
        g.mask_scores(&mut scores);
        assert_eq!(scores[tokenizer.eos_id() as usize], 0.0);
        g.advance(b as u32).unwrap();
    }
    let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
    g.mask_scores(&mut scores);
    assert_eq!(scores[tokenizer.eos_id() as usize], 0.0);
}

#[test]
fn repeated_alternation_accepts_any_greedy_trace() {
    let source = "\
root ::= many\n\
many ::= one one one+\n\
one ::= foo | bar\n\
foo ::= \"foo\"\n\
bar ::= \"b\" \"a\"+ \"r\"\n";
    let tokenizer = Arc::new(ByteTokenizer::with_extra_tokens(vec!["foo".to_string()]));
    let mut g = Grammar::new(source, tokenizer.clone()).unwrap();

    for id in tokenizer.encode("foofoofoo") {
        g.advance(id).unwrap();
    }
    // `one+` is satisfied after the third `one`; the trailing `Repeat(*, one)`
    // is now nullable, so EOS must be on the table even though the session
    // hasn't been told to stop.
    let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
    g.mask_scores(&mut scores);
    assert_eq!(scores[tokenizer.eos_id() as usize], 0.0);
    g.advance(tokenizer.eos_id()).unwrap();
    assert!(g.is_finished());
}

#[test]
fn enter_rule_restricts_generation_to_a_sub_rule() {
    let tokenizer = Arc::new(ByteTokenizer::new());
    let mut g = Grammar::new("root ::= \"unused\"\nalt ::= \"yes\" | \"no\"\n", tokenizer.clone()).unwrap();
    g.enter_rule("alt").unwrap();
    for id in tokenizer.encode("no") {
        g.advance(id).unwrap();
    }
    assert!(g.is_finished());
}
