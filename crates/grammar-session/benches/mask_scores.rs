use std::sync::Arc;

use criterion::*;
use grammar_session::tokenizer::ByteTokenizer;
use grammar_session::{Grammar, TokenizerOracle};

const JSON_GRAMMAR: &str = "\
root ::= value\n\
value ::= object | array | string | number | \"true\" | \"false\" | \"null\"\n\
object ::= \"{\" ws (member (\",\" ws member)*)? ws \"}\"\n\
member ::= string ws \":\" ws value\n\
array ::= \"[\" ws (value (\",\" ws value)*)? ws \"]\"\n\
string ::= '\"' [^\"]* '\"'\n\
number ::= \"-\"? [0-9]+ (\".\" [0-9]+)?\n\
ws ::= [ \\t\\n]*\n";

fn bench_parse_grammar(c: &mut Criterion) {
    c.bench_function("parse_json_grammar", move |b| {
        b.iter(|| {
            let grammar = grammar_parser::Grammar::parse(black_box(JSON_GRAMMAR)).unwrap();
            black_box(grammar);
        });
    });
}

fn bench_mask_scores_cold(c: &mut Criterion) {
    let tokenizer = Arc::new(ByteTokenizer::new());

    c.bench_function("mask_scores_first_step", move |b| {
        b.iter_batched(
            || Grammar::new(JSON_GRAMMAR, tokenizer.clone()).unwrap(),
            |session| {
                let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
                session.mask_scores(&mut scores);
                black_box(scores);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_mask_scores_warm(c: &mut Criterion) {
    let tokenizer = Arc::new(ByteTokenizer::new());
    let session = Grammar::new(JSON_GRAMMAR, tokenizer.clone()).unwrap();
    let mut scores = vec![0.0_f32; tokenizer.vocab_size()];
    session.mask_scores(&mut scores);

    c.bench_function("mask_scores_warm_cache", move |b| {
        b.iter(|| {
            session.mask_scores(&mut scores);
            black_box(&scores);
        });
    });
}

fn bench_advance_through_document(c: &mut Criterion) {
    let tokenizer = Arc::new(ByteTokenizer::new());
    let document = r#"{"name": "ada", "tags": ["math", "engines"], "count": 2}"#;
    let ids: Vec<u32> = tokenizer.encode(document);

    c.bench_function("advance_through_small_document", move |b| {
        b.iter_batched(
            || Grammar::new(JSON_GRAMMAR, tokenizer.clone()).unwrap(),
            |mut session| {
                for &id in &ids {
                    session.advance(id).unwrap();
                }
                black_box(session.is_finished());
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_parse_grammar,
    bench_mask_scores_cold,
    bench_mask_scores_warm,
    bench_advance_through_document,
);
criterion_main!(benches);
